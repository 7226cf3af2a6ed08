// SPDX-License-Identifier: GPL-3.0-only
//! Pixel format to luminance conversion
//!
//! Barcode localization only needs a single luminance channel, so every
//! supported raw layout is reduced to an 8-bit grayscale image here. Row
//! padding is skipped using the image stride.

use super::types::{PixelFormat, RawImage};
use crate::engine::status;
use crate::errors::{ReaderError, ReaderResult};
use image::GrayImage;
use image::imageops::{self, FilterType};

/// BT.601 luma with integer weights (77 + 150 + 29 = 256)
#[inline]
fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((77 * r as u32 + 150 * g as u32 + 29 * b as u32) >> 8) as u8
}

/// Expand a 5-bit channel to 8 bits
#[inline]
fn expand5(v: u16) -> u8 {
    let v = (v & 0x1f) as u8;
    (v << 3) | (v >> 2)
}

/// Expand a 6-bit channel to 8 bits
#[inline]
fn expand6(v: u16) -> u8 {
    let v = (v & 0x3f) as u8;
    (v << 2) | (v >> 4)
}

/// Convert a raw image to 8-bit grayscale
///
/// The image is validated first. 16-bit-per-channel layouts are rejected
/// with `BPP_NOT_SUPPORTED`.
pub fn to_luma(raw: &RawImage) -> ReaderResult<GrayImage> {
    raw.validate()?;

    let width = raw.width as usize;
    let height = raw.height as usize;
    let stride = raw.stride as usize;
    let data: &[u8] = &raw.data;

    let mut out = Vec::with_capacity(width * height);

    for y in 0..height {
        let row = &data[y * stride..y * stride + raw.format.min_row_bytes(raw.width)];
        match raw.format {
            PixelFormat::Binary | PixelFormat::BinaryInverted => {
                let set_value = if raw.format == PixelFormat::Binary { 0 } else { 255 };
                for x in 0..width {
                    let bit = row[x / 8] & (0x80 >> (x % 8));
                    out.push(if bit != 0 { set_value } else { 255 - set_value });
                }
            }
            // NV21 luma plane comes first; chroma is ignored
            PixelFormat::Grayscale | PixelFormat::Nv21 => out.extend_from_slice(row),
            PixelFormat::Rgb565 => {
                for px in row.chunks_exact(2) {
                    let v = u16::from_le_bytes([px[0], px[1]]);
                    out.push(luma(expand5(v >> 11), expand6(v >> 5), expand5(v)));
                }
            }
            PixelFormat::Rgb555 => {
                for px in row.chunks_exact(2) {
                    let v = u16::from_le_bytes([px[0], px[1]]);
                    out.push(luma(expand5(v >> 10), expand5(v >> 5), expand5(v)));
                }
            }
            PixelFormat::Rgb888 => {
                for px in row.chunks_exact(3) {
                    out.push(luma(px[0], px[1], px[2]));
                }
            }
            PixelFormat::Bgr888 => {
                for px in row.chunks_exact(3) {
                    out.push(luma(px[2], px[1], px[0]));
                }
            }
            PixelFormat::Argb8888 => {
                for px in row.chunks_exact(4) {
                    out.push(luma(px[1], px[2], px[3]));
                }
            }
            PixelFormat::Abgr8888 => {
                for px in row.chunks_exact(4) {
                    out.push(luma(px[3], px[2], px[1]));
                }
            }
            PixelFormat::Rgb161616 | PixelFormat::Argb16161616 | PixelFormat::Abgr16161616 => {
                return Err(ReaderError::decode(
                    status::BPP_NOT_SUPPORTED,
                    format!("{} frames are not supported", raw.format),
                ));
            }
        }
    }

    GrayImage::from_raw(raw.width, raw.height, out)
        .ok_or_else(|| ReaderError::invalid_buffer("converted image does not match its shape"))
}

/// Shrink an image whose shorter edge exceeds `threshold`
///
/// Returns the (possibly unchanged) image and the `(x, y)` factors that map
/// its coordinates back to the input. Rounding the new edges can leave the
/// two factors slightly apart.
pub fn downscale(gray: GrayImage, threshold: u32) -> (GrayImage, (f32, f32)) {
    let (width, height) = gray.dimensions();
    let shorter = width.min(height);
    if threshold == 0 || shorter <= threshold {
        return (gray, (1.0, 1.0));
    }

    let scale = shorter as f32 / threshold as f32;
    let new_width = ((width as f32 / scale).round() as u32).max(1);
    let new_height = ((height as f32 / scale).round() as u32).max(1);
    let resized = imageops::resize(&gray, new_width, new_height, FilterType::Triangle);
    let factors = (
        width as f32 / new_width as f32,
        height as f32 / new_height as f32,
    );
    (resized, factors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gray_skips_stride_padding() {
        // 2x2 gray with 2 bytes of padding per row
        let data = vec![10, 20, 0xEE, 0xEE, 30, 40, 0xEE, 0xEE];
        let raw = RawImage::new(data, 2, 2, 4, PixelFormat::Grayscale);
        let gray = to_luma(&raw).unwrap();
        assert_eq!(gray.into_raw(), vec![10, 20, 30, 40]);
    }

    #[test]
    fn test_rgb_and_bgr_agree() {
        let rgb = RawImage::new(vec![255, 0, 0, 0, 0, 255], 2, 1, 6, PixelFormat::Rgb888);
        let bgr = RawImage::new(vec![0, 0, 255, 255, 0, 0], 2, 1, 6, PixelFormat::Bgr888);
        assert_eq!(to_luma(&rgb).unwrap(), to_luma(&bgr).unwrap());
    }

    #[test]
    fn test_white_is_white_in_every_8bit_layout() {
        let cases = [
            (PixelFormat::Rgb888, vec![255u8; 3]),
            (PixelFormat::Argb8888, vec![255u8; 4]),
            (PixelFormat::Abgr8888, vec![255u8; 4]),
            (PixelFormat::Rgb565, vec![0xff, 0xff]),
            (PixelFormat::Rgb555, vec![0xff, 0x7f]),
        ];
        for (format, data) in cases {
            let stride = data.len() as u32;
            let raw = RawImage::new(data, 1, 1, stride, format);
            let gray = to_luma(&raw).unwrap();
            assert!(gray.get_pixel(0, 0)[0] >= 254, "{format} white too dark");
        }
    }

    #[test]
    fn test_binary_bits_msb_first() {
        let raw = RawImage::new(vec![0b1010_0000], 4, 1, 1, PixelFormat::Binary);
        assert_eq!(to_luma(&raw).unwrap().into_raw(), vec![0, 255, 0, 255]);

        let inverted = RawImage::new(vec![0b1010_0000], 4, 1, 1, PixelFormat::BinaryInverted);
        assert_eq!(to_luma(&inverted).unwrap().into_raw(), vec![255, 0, 255, 0]);
    }

    #[test]
    fn test_nv21_uses_luma_plane() {
        // 2x2 luma followed by one VU row
        let raw = RawImage::new(vec![1, 2, 3, 4, 128, 128], 2, 2, 2, PixelFormat::Nv21);
        assert_eq!(to_luma(&raw).unwrap().into_raw(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_sixteen_bit_channels_rejected() {
        let raw = RawImage::new(vec![0u8; 6], 1, 1, 6, PixelFormat::Rgb161616);
        assert_eq!(to_luma(&raw).unwrap_err().code(), status::BPP_NOT_SUPPORTED);
    }

    #[test]
    fn test_downscale_respects_threshold() {
        let gray = GrayImage::new(400, 200);
        let (small, (scale_x, scale_y)) = downscale(gray, 100);
        assert_eq!(small.dimensions(), (200, 100));
        assert!((scale_x - 2.0).abs() < f32::EPSILON);
        assert!((scale_y - 2.0).abs() < f32::EPSILON);

        let gray = GrayImage::new(90, 60);
        let (same, scale) = downscale(gray, 100);
        assert_eq!(same.dimensions(), (90, 60));
        assert_eq!(scale, (1.0, 1.0));
    }

    #[test]
    fn test_downscale_factors_per_axis() {
        // 250 / 1.5 rounds up to 167 while 150 / 1.5 is exact
        let gray = GrayImage::new(250, 150);
        let (small, (scale_x, scale_y)) = downscale(gray, 100);
        assert_eq!(small.dimensions(), (167, 100));
        assert_eq!(scale_x, 250.0 / 167.0);
        assert_eq!(scale_y, 1.5);

        // The far corner maps back onto the input edge on both axes
        assert_eq!((167.0 * scale_x).round() as u32, 250);
        assert_eq!((100.0 * scale_y).round() as u32, 150);
    }
}
