// src/services/typography.rs
use font8x8::{BASIC_FONTS, LATIN_FONTS, UnicodeFonts};
use image::{Rgb, RgbImage};

const GLYPH_SIZE: u32 = 8;

/// Scaled 8x8 bitmap font. Every character advances by the same width, so
/// text can be measured without a rasterizer.
#[derive(Debug, Clone, Copy)]
pub struct BitmapFont {
    scale: u32,
}

impl BitmapFont {
    pub fn with_pixel_size(pixel_size: u32) -> Self {
        Self {
            scale: (pixel_size / GLYPH_SIZE).max(1),
        }
    }

    pub fn glyph_size(&self) -> u32 {
        GLYPH_SIZE * self.scale
    }

    pub fn line_height(&self) -> u32 {
        self.glyph_size() + self.glyph_size() / 4
    }

    pub fn text_width(&self, text: &str) -> u32 {
        text.chars().count() as u32 * self.glyph_size()
    }

    /// Draws a single line. Pixels outside the canvas are clipped.
    pub fn draw_text(&self, canvas: &mut RgbImage, x: u32, y: u32, text: &str, color: Rgb<u8>) {
        let (width, height) = canvas.dimensions();

        for (index, ch) in text.chars().enumerate() {
            let Some(rows) = glyph(ch) else {
                continue;
            };
            let origin_x = x + index as u32 * self.glyph_size();
            if origin_x >= width {
                break;
            }

            for (row, bits) in rows.iter().enumerate() {
                for col in 0..GLYPH_SIZE {
                    if *bits & (1u8 << col) == 0 {
                        continue;
                    }
                    let px = origin_x + col * self.scale;
                    let py = y + row as u32 * self.scale;
                    for dy in 0..self.scale {
                        for dx in 0..self.scale {
                            let (cx, cy) = (px + dx, py + dy);
                            if cx < width && cy < height {
                                canvas.put_pixel(cx, cy, color);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Wraps `text` to `max_width` and draws it line by line starting at
    /// (`x`, `y`). Returns the number of lines drawn.
    pub fn draw_wrapped(
        &self,
        canvas: &mut RgbImage,
        x: u32,
        y: u32,
        max_width: u32,
        text: &str,
        color: Rgb<u8>,
    ) -> usize {
        let lines = wrap_text(text, max_width, |line| self.text_width(line));
        for (i, line) in lines.iter().enumerate() {
            self.draw_text(canvas, x, y + i as u32 * self.line_height(), line, color);
        }
        lines.len()
    }
}

fn glyph(ch: char) -> Option<[u8; 8]> {
    BASIC_FONTS.get(ch).or_else(|| LATIN_FONTS.get(ch))
}

/// Greedy word wrap. Words are packed onto a line until the next one would
/// exceed `max_width`; a word that is wider than `max_width` on its own gets
/// a line to itself and is never split.
pub fn wrap_text<F>(text: &str, max_width: u32, measure: F) -> Vec<String>
where
    F: Fn(&str) -> u32,
{
    let mut lines = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for word in text.split_whitespace() {
        let mut candidate = current.join(" ");
        if !candidate.is_empty() {
            candidate.push(' ');
        }
        candidate.push_str(word);

        if measure(&candidate) <= max_width {
            current.push(word);
        } else if current.is_empty() {
            lines.push(word.to_string());
        } else {
            lines.push(current.join(" "));
            current = vec![word];
        }
    }

    if !current.is_empty() {
        lines.push(current.join(" "));
    }

    lines
}
