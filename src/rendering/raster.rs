/// Software rasterizer for captured subtrees

use crate::rendering::layout::LINE_HEIGHT;
use crate::rendering::paint::{build_display_list, parse_color, word_spans, PaintCommand, Rgba};
use crate::rendering::{Bitmap, RasterOptions, Rasterizer, Subtree};
use crate::{Error, Result};
use async_trait::async_trait;
use image::{Rgba as Pixel, RgbaImage};

/// Largest bitmap side we are willing to allocate
pub const MAX_DIMENSION: u32 = 16_384;

/// Paints the layout tree into an RGBA buffer.
///
/// Glyphs are greeked (drawn as bars). The bundled renderer never loads
/// remote images, so CORS and taint settings have nothing to act on and
/// image elements paint as placeholders.
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwareRasterizer;

#[async_trait]
impl Rasterizer for SoftwareRasterizer {
    async fn capture(&self, subtree: &Subtree, opts: &RasterOptions) -> Result<Bitmap> {
        rasterize(subtree, opts)
    }
}

fn fill(img: &mut RgbaImage, x: f32, y: f32, w: f32, h: f32, rgba: Rgba) {
    let x0 = x.max(0.0).floor() as u32;
    let y0 = y.max(0.0).floor() as u32;
    let x1 = ((x + w).ceil().max(0.0) as u32).min(img.width());
    let y1 = ((y + h).ceil().max(0.0) as u32).min(img.height());
    let px = Pixel([rgba.0, rgba.1, rgba.2, rgba.3]);
    for yy in y0..y1 {
        for xx in x0..x1 {
            img.put_pixel(xx, yy, px);
        }
    }
}

pub fn rasterize(subtree: &Subtree, opts: &RasterOptions) -> Result<Bitmap> {
    if opts.scale <= 0.0 || !opts.scale.is_finite() {
        return Err(Error::Render(format!("invalid scale {}", opts.scale)));
    }
    let background = parse_color(&opts.background_color).ok_or_else(|| {
        Error::Render(format!("unrecognized background color {:?}", opts.background_color))
    })?;

    let s = opts.scale as f32;
    let width = ((opts.width as f32) * s).ceil().max(1.0) as u32;
    let height = ((opts.height as f32) * s).ceil().max(1.0) as u32;
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(Error::Render(format!(
            "bitmap {}x{} exceeds {}px limit",
            width, height, MAX_DIMENSION
        )));
    }

    let mut img = RgbaImage::from_pixel(
        width,
        height,
        Pixel([background.0, background.1, background.2, background.3]),
    );

    for cmd in build_display_list(&subtree.layout) {
        match cmd {
            PaintCommand::SolidRect { x, y, width, height, rgba } => fill(
                &mut img,
                x as f32 * s,
                y as f32 * s,
                width as f32 * s,
                height as f32 * s,
                rgba,
            ),
            PaintCommand::Text { x, y, text, scale, rgba } => {
                let line_h = LINE_HEIGHT as f32 * scale;
                let bar_h = line_h * 0.55;
                let bar_y = y as f32 + (line_h - bar_h) / 2.0;
                for (dx, w) in word_spans(&text, scale) {
                    fill(
                        &mut img,
                        (x as f32 + dx as f32) * s,
                        bar_y * s,
                        w as f32 * s,
                        bar_h * s,
                        rgba,
                    );
                }
            }
        }
    }

    log::debug!("Rasterized {} at {}x{}", subtree.selector, width, height);
    Ok(Bitmap::new(img))
}
