//! 1-bit raster packing for ePOS `<image>` payloads.
//!
//! Pixels are ink when their luminance (0.299 R + 0.587 G + 0.114 B) is below
//! 128. Packing is row-major, 8 pixels per byte, most significant bit first;
//! each row is padded to a whole byte.

use base64::Engine as _;
use image::{GrayImage, Luma, Rgb, RgbImage};

const INK_THRESHOLD: u32 = 128;

/// Luminance scaled by 1000 so the threshold test stays in integers.
fn luminance_milli(px: &Rgb<u8>) -> u32 {
    let [r, g, b] = px.0;
    299 * r as u32 + 587 * g as u32 + 114 * b as u32
}

pub fn luminance(px: &Rgb<u8>) -> f64 {
    luminance_milli(px) as f64 / 1000.0
}

pub fn is_ink(px: &Rgb<u8>) -> bool {
    luminance_milli(px) < INK_THRESHOLD * 1000
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonoBitmap {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl MonoBitmap {
    /// Threshold and pack an RGB canvas.
    pub fn from_rgb(img: &RgbImage) -> Self {
        let (width, height) = img.dimensions();
        let row_bytes = width.div_ceil(8);
        let mut data = Vec::with_capacity((row_bytes * height) as usize);
        for y in 0..height {
            for xb in 0..row_bytes {
                let mut byte = 0u8;
                for bit in 0..8u32 {
                    let x = xb * 8 + bit;
                    if x >= width {
                        continue;
                    }
                    if is_ink(img.get_pixel(x, y)) {
                        byte |= 0x80 >> bit;
                    }
                }
                data.push(byte);
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn row_bytes(&self) -> u32 {
        self.width.div_ceil(8)
    }

    /// Ink state of a single dot. Out-of-range coordinates read as paper.
    pub fn get(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        let idx = (y * self.row_bytes() + x / 8) as usize;
        self.data
            .get(idx)
            .map(|byte| byte & (0x80 >> (x % 8)) != 0)
            .unwrap_or(false)
    }

    /// Expand back to one bool per pixel, row-major.
    pub fn unpack(&self) -> Vec<bool> {
        let mut out = Vec::with_capacity((self.width * self.height) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                out.push(self.get(x, y));
            }
        }
        out
    }

    /// Black-on-white preview of the packed bits.
    pub fn to_gray_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            if self.get(x, y) {
                Luma([0])
            } else {
                Luma([255])
            }
        })
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }

    pub fn ink_count(&self) -> usize {
        self.data.iter().map(|b| b.count_ones() as usize).sum()
    }
}
