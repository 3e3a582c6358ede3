//! Document writer capability and the bundled single-page PDF backend.

use crate::rendering::{ImageFormat, Orientation};
use crate::{Error, Result};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Length unit used for placement coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Mm,
    Pt,
    Px,
    In,
}

impl Unit {
    pub fn to_points(&self, v: f64) -> f64 {
        match self {
            Unit::Mm => v * 72.0 / 25.4,
            Unit::Pt => v,
            Unit::Px => v * 0.75,
            Unit::In => v * 72.0,
        }
    }
}

/// Physical paper size, in portrait millimetres
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageFormat {
    A4,
    A5,
    Letter,
    Legal,
    Custom { width: f64, height: f64 },
}

impl PageFormat {
    pub fn size_mm(&self) -> (f64, f64) {
        match *self {
            PageFormat::A4 => (210.0, 297.0),
            PageFormat::A5 => (148.0, 210.0),
            PageFormat::Letter => (215.9, 279.4),
            PageFormat::Legal => (215.9, 355.6),
            PageFormat::Custom { width, height } => (width, height),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WriterOptions {
    pub orientation: Orientation,
    pub unit: Unit,
    pub format: PageFormat,
}

/// Assembles one output document
pub trait DocumentWriter: Send {
    /// Place an encoded image with its top-left corner at (`x`, `y`),
    /// measured from the top-left of the page in the writer's unit.
    fn add_image(&mut self, data: &[u8], format: ImageFormat, x: f64, y: f64, w: f64, h: f64) -> Result<()>;

    /// Write the document under `filename`. Either the complete file is
    /// written or nothing is.
    fn save(self: Box<Self>, filename: &str) -> Result<PathBuf>;
}

pub trait WriterFactory: Send + Sync {
    fn create(&self, options: WriterOptions) -> Result<Box<dyn DocumentWriter>>;
}

/// Creates PDF writers that save into `output_dir`
#[derive(Debug, Clone)]
pub struct PdfWriterFactory {
    output_dir: PathBuf,
}

impl PdfWriterFactory {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

impl WriterFactory for PdfWriterFactory {
    fn create(&self, options: WriterOptions) -> Result<Box<dyn DocumentWriter>> {
        Ok(Box::new(PdfDocumentWriter::new(&self.output_dir, options)))
    }
}

struct PlacedImage {
    data: Vec<u8>,
    format: ImageFormat,
    // points, PDF user space (origin bottom-left)
    x: f64,
    y: f64,
    w: f64,
    h: f64,
}

pub struct PdfDocumentWriter {
    output_dir: PathBuf,
    unit: Unit,
    page_width: f64,
    page_height: f64,
    images: Vec<PlacedImage>,
}

impl PdfDocumentWriter {
    pub fn new(output_dir: &Path, options: WriterOptions) -> Self {
        let (w, h) = options.format.size_mm();
        let (short, long) = (w.min(h), w.max(h));
        let (w, h) = match options.orientation {
            Orientation::Portrait => (short, long),
            Orientation::Landscape => (long, short),
        };
        Self {
            output_dir: output_dir.to_path_buf(),
            unit: options.unit,
            page_width: Unit::Mm.to_points(w),
            page_height: Unit::Mm.to_points(h),
            images: Vec::new(),
        }
    }

    /// Page size in points
    pub fn page_size(&self) -> (f64, f64) {
        (self.page_width, self.page_height)
    }

    fn image_objects(doc: &mut Document, img: &PlacedImage) -> Result<Stream> {
        let decoded = image::load_from_memory(&img.data)?;
        let (width, height) = (decoded.width() as i64, decoded.height() as i64);
        match img.format {
            ImageFormat::Jpeg => Ok(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => width,
                    "Height" => height,
                    "ColorSpace" => "DeviceRGB",
                    "BitsPerComponent" => 8,
                    "Filter" => "DCTDecode",
                },
                img.data.clone(),
            )),
            ImageFormat::Png => {
                let rgba = decoded.to_rgba8();
                let mut rgb = Vec::with_capacity(rgba.len() / 4 * 3);
                let mut alpha = Vec::with_capacity(rgba.len() / 4);
                for px in rgba.pixels() {
                    rgb.extend_from_slice(&px.0[..3]);
                    alpha.push(px.0[3]);
                }
                let mut dict = dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => width,
                    "Height" => height,
                    "ColorSpace" => "DeviceRGB",
                    "BitsPerComponent" => 8,
                };
                if alpha.iter().any(|&a| a != 255) {
                    let smask = Stream::new(
                        dictionary! {
                            "Type" => "XObject",
                            "Subtype" => "Image",
                            "Width" => width,
                            "Height" => height,
                            "ColorSpace" => "DeviceGray",
                            "BitsPerComponent" => 8,
                        },
                        alpha,
                    );
                    let smask_id = doc.add_object(smask);
                    dict.set("SMask", smask_id);
                }
                Ok(Stream::new(dict, rgb))
            }
        }
    }

    /// Serialize the page into PDF bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();

        let mut xobjects = Dictionary::new();
        let mut operations = Vec::new();
        for (i, img) in self.images.iter().enumerate() {
            let name = format!("Im{}", i + 1);
            let stream = Self::image_objects(&mut doc, img)?;
            let image_id = doc.add_object(stream);
            xobjects.set(name.as_bytes().to_vec(), image_id);

            operations.push(Operation::new("q", vec![]));
            operations.push(Operation::new(
                "cm",
                vec![
                    (img.w as f32).into(),
                    0.into(),
                    0.into(),
                    (img.h as f32).into(),
                    (img.x as f32).into(),
                    (img.y as f32).into(),
                ],
            ));
            operations.push(Operation::new("Do", vec![Object::Name(name.into_bytes())]));
            operations.push(Operation::new("Q", vec![]));
        }

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let resources_id = doc.add_object(dictionary! {
            "XObject" => xobjects,
        });
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                0.into(),
                0.into(),
                (self.page_width as f32).into(),
                (self.page_height as f32).into(),
            ],
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf)?;
        Ok(buf)
    }
}

impl DocumentWriter for PdfDocumentWriter {
    fn add_image(&mut self, data: &[u8], format: ImageFormat, x: f64, y: f64, w: f64, h: f64) -> Result<()> {
        if !(w > 0.0 && h > 0.0) {
            return Err(Error::DocumentWrite(format!("image size {}x{} is not positive", w, h)));
        }
        let (x, y, w, h) = (
            self.unit.to_points(x),
            self.unit.to_points(y),
            self.unit.to_points(w),
            self.unit.to_points(h),
        );
        self.images.push(PlacedImage {
            data: data.to_vec(),
            format,
            x,
            y: self.page_height - y - h,
            w,
            h,
        });
        Ok(())
    }

    fn save(self: Box<Self>, filename: &str) -> Result<PathBuf> {
        let bytes = self.to_bytes()?;
        let target = self.output_dir.join(filename);
        let partial = self.output_dir.join(format!(".{}.part", filename));

        if let Err(e) = std::fs::write(&partial, &bytes) {
            let _ = std::fs::remove_file(&partial);
            return Err(Error::DocumentWrite(format!("writing {}: {}", partial.display(), e)));
        }
        if let Err(e) = std::fs::rename(&partial, &target) {
            let _ = std::fs::remove_file(&partial);
            return Err(Error::DocumentWrite(format!("saving {}: {}", target.display(), e)));
        }
        log::info!("Saved {} ({} bytes)", target.display(), bytes.len());
        Ok(target)
    }
}
