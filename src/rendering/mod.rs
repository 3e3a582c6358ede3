//! Capturing a page subtree and fitting it onto a fixed page.
//!
//! `RenderTarget::capture` lays out the element matched by a selector at
//! its natural size and hands it to a `Rasterizer`. `compute_transform`
//! converts the bitmap's pixel size into physical units and derives one
//! uniform scale factor that fits it inside the page margins.

pub mod layout;
pub mod paint;
pub mod raster;

use crate::page::Page;
use crate::{Error, Result};
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, RgbaImage};
use scraper::Selector;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use layout::LayoutTree;

/// Millimetres per CSS pixel (96 px per inch)
pub const MM_PER_PX: f64 = 25.4 / 96.0;

/// Encoded image formats understood by the document writer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
}

/// Rasterized pixels of a captured subtree
#[derive(Debug, Clone)]
pub struct Bitmap {
    pixels: RgbaImage,
}

impl Bitmap {
    pub fn new(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.pixels.get_pixel(x, y).0
    }

    pub fn as_raw(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    /// Encode the bitmap. `quality` (0..=1) only affects JPEG; JPEG drops
    /// the alpha channel.
    pub fn to_image_data(&self, format: ImageFormat, quality: f64) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        match format {
            ImageFormat::Png => {
                PngEncoder::new(&mut buf).write_image(
                    self.pixels.as_raw(),
                    self.width(),
                    self.height(),
                    ExtendedColorType::Rgba8,
                )?;
            }
            ImageFormat::Jpeg => {
                let rgb = DynamicImage::ImageRgba8(self.pixels.clone()).to_rgb8();
                let q = (quality.clamp(0.0, 1.0) * 100.0).round().max(1.0) as u8;
                JpegEncoder::new_with_quality(&mut buf, q).encode_image(&rgb)?;
            }
        }
        Ok(buf)
    }
}

/// Options passed through to the rasterizer
#[derive(Debug, Clone)]
pub struct RasterOptions {
    /// Supersampling factor
    pub scale: f64,
    pub use_cors: bool,
    pub allow_taint: bool,
    pub background_color: String,
    /// Natural content width in CSS px
    pub width: u32,
    /// Natural content height in CSS px
    pub height: u32,
}

/// Owned snapshot of the element being captured
#[derive(Debug, Clone)]
pub struct Subtree {
    pub selector: String,
    /// Outer HTML of the element
    pub html: String,
    pub layout: LayoutTree,
}

/// Turns a subtree into pixels
#[async_trait]
pub trait Rasterizer: Send + Sync {
    async fn capture(&self, subtree: &Subtree, opts: &RasterOptions) -> Result<Bitmap>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
}

impl Orientation {
    /// Landscape only when strictly wider than tall.
    pub fn from_pixels(width: u32, height: u32) -> Self {
        if width > height {
            Orientation::Landscape
        } else {
            Orientation::Portrait
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Portrait => "portrait",
            Orientation::Landscape => "landscape",
        }
    }
}

/// A captured bitmap and its pixel size
#[derive(Debug, Clone)]
pub struct CaptureResult {
    pub width: u32,
    pub height: u32,
    pub bitmap: Bitmap,
}

impl CaptureResult {
    pub fn new(bitmap: Bitmap) -> Self {
        Self {
            width: bitmap.width(),
            height: bitmap.height(),
            bitmap,
        }
    }

    pub fn orientation(&self) -> Orientation {
        Orientation::from_pixels(self.width, self.height)
    }
}

/// Output page geometry in millimetres, given in portrait form
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageConfig {
    pub width: f64,
    pub height: f64,
    pub margin: f64,
}

impl PageConfig {
    pub fn a4(margin: f64) -> Self {
        Self { width: 210.0, height: 297.0, margin }
    }

    /// Page width and height once turned to `orientation`.
    pub fn dimensions(&self, orientation: Orientation) -> (f64, f64) {
        let short = self.width.min(self.height);
        let long = self.width.max(self.height);
        match orientation {
            Orientation::Portrait => (short, long),
            Orientation::Landscape => (long, short),
        }
    }
}

/// Where and how large the bitmap is drawn, in millimetres
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementTransform {
    /// Uniform scale applied to both axes
    pub ratio: f64,
    pub width: f64,
    pub height: f64,
    pub x: f64,
    pub y: f64,
    pub orientation: Orientation,
    pub page_width: f64,
    pub page_height: f64,
}

/// Fit a `px_width` x `px_height` bitmap onto `page`.
///
/// Horizontally centered; vertically anchored at the top margin. Both
/// pixel dimensions must be non-zero.
pub fn fit(px_width: u32, px_height: u32, page: &PageConfig) -> PlacementTransform {
    debug_assert!(px_width > 0 && px_height > 0);
    let orientation = Orientation::from_pixels(px_width, px_height);
    let (page_width, page_height) = page.dimensions(orientation);

    let img_w = px_width as f64 * MM_PER_PX;
    let img_h = px_height as f64 * MM_PER_PX;
    let avail_w = page_width - 2.0 * page.margin;
    let avail_h = page_height - 2.0 * page.margin;

    let ratio = (avail_w / img_w).min(avail_h / img_h);
    let width = img_w * ratio;
    let height = img_h * ratio;

    PlacementTransform {
        ratio,
        width,
        height,
        x: (page_width - width) / 2.0,
        y: page.margin,
        orientation,
        page_width,
        page_height,
    }
}

pub fn compute_transform(capture: &CaptureResult, page: &PageConfig) -> PlacementTransform {
    fit(capture.width, capture.height, page)
}

/// Rasterizer settings chosen by the caller
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub scale: f64,
    pub use_cors: bool,
    pub allow_taint: bool,
    pub background_color: String,
}

/// Captures elements of a page through a rasterizer
#[derive(Clone)]
pub struct RenderTarget {
    rasterizer: Arc<dyn Rasterizer>,
    viewport_width: u32,
}

impl RenderTarget {
    pub fn new(rasterizer: Arc<dyn Rasterizer>, viewport_width: u32) -> Self {
        Self {
            rasterizer,
            viewport_width,
        }
    }

    /// Lay out the first element matching `selector`.
    pub fn snapshot(&self, page: &Page, selector: &str) -> Result<Subtree> {
        let sel = Selector::parse(selector)
            .map_err(|e| Error::Config(format!("invalid selector {:?}: {:?}", selector, e)))?;
        let doc = page.document();
        let el = doc.select(&sel).next().ok_or_else(|| Error::ElementNotFound {
            selector: selector.to_string(),
        })?;
        Ok(Subtree {
            selector: selector.to_string(),
            html: el.html(),
            layout: layout::layout_subtree(el, self.viewport_width),
        })
    }

    pub async fn capture(
        &self,
        page: &Page,
        selector: &str,
        settings: &CaptureSettings,
    ) -> Result<CaptureResult> {
        let subtree = self.snapshot(page, selector)?;
        let opts = RasterOptions {
            scale: settings.scale,
            use_cors: settings.use_cors,
            allow_taint: settings.allow_taint,
            background_color: settings.background_color.clone(),
            width: subtree.layout.width,
            height: subtree.layout.height,
        };
        let bitmap = self.rasterizer.capture(&subtree, &opts).await?;
        if bitmap.width() == 0 || bitmap.height() == 0 {
            return Err(Error::Render(format!("{} rasterized to an empty bitmap", selector)));
        }
        Ok(CaptureResult::new(bitmap))
    }

    pub fn compute_transform(&self, capture: &CaptureResult, page: &PageConfig) -> PlacementTransform {
        compute_transform(capture, page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn orientation_follows_aspect() {
        assert_eq!(Orientation::from_pixels(800, 600).as_str(), "landscape");
        assert_eq!(Orientation::from_pixels(600, 800).as_str(), "portrait");
        assert_eq!(Orientation::from_pixels(600, 600), Orientation::Portrait);
    }

    #[test]
    fn fit_preserves_aspect_ratio() {
        let page = PageConfig::a4(10.0);
        for (w, h) in [(1000, 500), (500, 1000), (333, 777), (4000, 30), (1, 1)] {
            let t = fit(w, h, &page);
            assert!((t.width / t.height - w as f64 / h as f64).abs() < 1e-9, "{}x{}", w, h);
            assert!(t.width <= t.page_width - 2.0 * page.margin + EPS);
            assert!(t.height <= t.page_height - 2.0 * page.margin + EPS);
        }
    }

    #[test]
    fn exact_fit_has_unit_ratio() {
        // 254 x 508 mm available == 960 x 1920 px
        let page = PageConfig { width: 274.0, height: 528.0, margin: 10.0 };
        let t = fit(960, 1920, &page);
        assert!((t.ratio - 1.0).abs() < 1e-9);
        assert!((t.width - 254.0).abs() < 1e-9);
        assert!((t.height - 508.0).abs() < 1e-9);
    }

    #[test]
    fn wide_capture_is_centered_and_top_anchored() {
        let t = fit(1000, 500, &PageConfig::a4(10.0));
        assert_eq!(t.orientation, Orientation::Landscape);
        assert_eq!((t.page_width, t.page_height), (297.0, 210.0));
        assert!((t.width - 277.0).abs() < 1e-9);
        assert!((t.x - (297.0 - t.width) / 2.0).abs() < EPS);
        assert_eq!(t.y, 10.0);
    }

    #[test]
    fn small_capture_grows_to_fill() {
        let t = fit(10, 20, &PageConfig::a4(0.0));
        assert!(t.ratio > 1.0);
        assert!((t.width - 210.0).abs() < 1e-9 || (t.height - 297.0).abs() < 1e-9);
    }

    #[test]
    fn jpeg_and_png_encode() {
        let bmp = Bitmap::new(RgbaImage::from_pixel(8, 4, image::Rgba([10, 20, 30, 255])));
        let png = bmp.to_image_data(ImageFormat::Png, 1.0).unwrap();
        assert_eq!(&png[..4], b"\x89PNG");
        let jpg = bmp.to_image_data(ImageFormat::Jpeg, 0.5).unwrap();
        assert_eq!(&jpg[..2], &[0xff, 0xd8]);
    }

    #[tokio::test]
    async fn capture_uses_natural_height() {
        let mut page = Page::new("t").with_mount("cv");
        page.set_inner_html("#cv", "<p>x</p>".repeat(100)).unwrap();
        let target = RenderTarget::new(Arc::new(raster::SoftwareRasterizer), 320);
        let settings = CaptureSettings {
            scale: 1.0,
            use_cors: true,
            allow_taint: false,
            background_color: "#fff".into(),
        };
        let cap = target.capture(&page, "#cv", &settings).await.unwrap();
        assert_eq!(cap.width, 320);
        assert!(cap.height > 2000);
        assert_eq!(cap.orientation(), Orientation::Portrait);
    }

    #[tokio::test]
    async fn capture_missing_element_fails() {
        let page = Page::new("t").with_mount("cv");
        let target = RenderTarget::new(Arc::new(raster::SoftwareRasterizer), 320);
        let settings = CaptureSettings {
            scale: 1.0,
            use_cors: true,
            allow_taint: false,
            background_color: "#fff".into(),
        };
        let err = target.capture(&page, "#page", &settings).await.unwrap_err();
        assert!(matches!(err, Error::ElementNotFound { ref selector } if selector == "#page"));
    }
}
