// src/services/compositor.rs
use crate::errors::PipelineError;
use crate::models::AspectRatio;
use crate::services::typography::BitmapFont;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, GenericImageView, Rgb, RgbImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

const MAX_SOURCE_DIMENSION: u32 = 4096;
const TEXT_MARGIN: u32 = 20;
/// Opacity of the black band behind the campaign message, out of 255.
const BAND_ALPHA: u16 = 180;
const JPEG_QUALITY: u8 = 95;

/// Turns a source product image into finished creatives: fitted to the
/// target canvas, darkened band at the bottom, message and product name
/// drawn on top.
pub struct CreativeCompositor {
    text_color: Rgb<u8>,
}

impl CreativeCompositor {
    pub fn new() -> Self {
        Self {
            text_color: Rgb([255, 255, 255]),
        }
    }

    pub fn validate_image(&self, data: &[u8]) -> Result<(u32, u32), PipelineError> {
        let img = image::load_from_memory(data)
            .map_err(|e| PipelineError::Validation(format!("Invalid image format: {}", e)))?;

        let (width, height) = img.dimensions();

        if width > MAX_SOURCE_DIMENSION || height > MAX_SOURCE_DIMENSION {
            return Err(PipelineError::Validation(format!(
                "Image dimensions exceed {0}x{0}",
                MAX_SOURCE_DIMENSION
            )));
        }

        Ok((width, height))
    }

    pub fn compose(
        &self,
        source: &DynamicImage,
        ratio: &AspectRatio,
        campaign_message: &str,
        product_name: &str,
    ) -> Result<RgbImage, PipelineError> {
        let mut canvas = self.fit_to_canvas(source, ratio.width, ratio.height)?;
        let (width, height) = canvas.dimensions();

        let band_top = height - height / 4;
        darken_rows(&mut canvas, band_top);

        let font = BitmapFont::with_pixel_size(width / 25);
        let small_font = BitmapFont::with_pixel_size(width / 50);
        let text_width = width.saturating_sub(2 * TEXT_MARGIN);

        font.draw_wrapped(
            &mut canvas,
            TEXT_MARGIN,
            band_top + TEXT_MARGIN,
            text_width,
            campaign_message,
            self.text_color,
        );
        small_font.draw_wrapped(
            &mut canvas,
            TEXT_MARGIN,
            TEXT_MARGIN,
            text_width,
            &product_name.to_uppercase(),
            self.text_color,
        );

        Ok(canvas)
    }

    /// Crops the largest centered region of `source` that has the target's
    /// aspect ratio, then scales that region to exactly `width`x`height`.
    /// The intermediate buffer is never larger than the source or the canvas.
    pub fn fit_to_canvas(
        &self,
        source: &DynamicImage,
        width: u32,
        height: u32,
    ) -> Result<RgbImage, PipelineError> {
        let (src_width, src_height) = source.dimensions();
        let (x, y, crop_width, crop_height) = cover_crop(src_width, src_height, width, height)
            .ok_or_else(|| {
                PipelineError::Composition(format!(
                    "Cannot fit a {}x{} image",
                    src_width, src_height
                ))
            })?;

        let visible = source.crop_imm(x, y, crop_width, crop_height);
        Ok(visible
            .resize_exact(width, height, FilterType::Lanczos3)
            .to_rgb8())
    }

    pub fn save_jpeg(&self, image: &RgbImage, path: &Path) -> Result<(), PipelineError> {
        let mut writer = BufWriter::new(File::create(path)?);
        let mut encoder = JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY);
        encoder.encode(image.as_raw(), image.width(), image.height(), ColorType::Rgb8)?;
        Ok(())
    }
}

impl Default for CreativeCompositor {
    fn default() -> Self {
        Self::new()
    }
}

pub fn creative_filename(product_key: &str, ratio: &AspectRatio) -> String {
    format!("{}_{}.jpg", product_key, ratio.file_label())
}

/// Centered region of a `src_width`x`src_height` source, in source pixels,
/// that covers a `target_width`x`target_height` canvas once scaled. `None`
/// for degenerate sizes.
pub fn cover_crop(
    src_width: u32,
    src_height: u32,
    target_width: u32,
    target_height: u32,
) -> Option<(u32, u32, u32, u32)> {
    if src_width == 0 || src_height == 0 || target_width == 0 || target_height == 0 {
        return None;
    }

    let scale = f64::max(
        target_width as f64 / src_width as f64,
        target_height as f64 / src_height as f64,
    );
    let crop_width = ((target_width as f64 / scale).round() as u32).clamp(1, src_width);
    let crop_height = ((target_height as f64 / scale).round() as u32).clamp(1, src_height);

    Some((
        (src_width - crop_width) / 2,
        (src_height - crop_height) / 2,
        crop_width,
        crop_height,
    ))
}

fn darken_rows(canvas: &mut RgbImage, from_row: u32) {
    let keep = 255 - BAND_ALPHA;
    for (_, y, pixel) in canvas.enumerate_pixels_mut() {
        if y < from_row {
            continue;
        }
        for channel in pixel.0.iter_mut() {
            *channel = (*channel as u16 * keep / 255) as u8;
        }
    }
}
