// SPDX-License-Identifier: GPL-3.0-only

//! Image types handed to decode engines

use crate::errors::{ReaderError, ReaderResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::Arc;

/// Pixel layout of a raw image buffer
///
/// Numeric codes follow the engine's image pixel format enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 1 bit per pixel, MSB first, set bit is black
    Binary,
    /// 1 bit per pixel, MSB first, set bit is white
    BinaryInverted,
    /// 8-bit grayscale
    Grayscale,
    /// NV21 - Y plane followed by interleaved VU plane (4:2:0)
    Nv21,
    /// 16-bit RGB, 5-6-5 bits, little endian
    Rgb565,
    /// 16-bit RGB, 5-5-5 bits, little endian
    Rgb555,
    /// 24-bit RGB (R G B byte order)
    #[default]
    Rgb888,
    /// 32-bit with alpha (A R G B byte order)
    Argb8888,
    /// 48-bit RGB, 16 bits per channel
    Rgb161616,
    /// 64-bit with alpha, 16 bits per channel
    Argb16161616,
    /// 32-bit with alpha (A B G R byte order)
    Abgr8888,
    /// 64-bit with alpha, 16 bits per channel (A B G R order)
    Abgr16161616,
    /// 24-bit BGR (B G R byte order)
    Bgr888,
}

impl PixelFormat {
    /// All formats in engine code order
    pub const ALL: [PixelFormat; 13] = [
        PixelFormat::Binary,
        PixelFormat::BinaryInverted,
        PixelFormat::Grayscale,
        PixelFormat::Nv21,
        PixelFormat::Rgb565,
        PixelFormat::Rgb555,
        PixelFormat::Rgb888,
        PixelFormat::Argb8888,
        PixelFormat::Rgb161616,
        PixelFormat::Argb16161616,
        PixelFormat::Abgr8888,
        PixelFormat::Abgr16161616,
        PixelFormat::Bgr888,
    ];

    /// Map an engine format code to a pixel format
    ///
    /// Unknown codes fall back to `Rgb888`.
    pub fn from_code(code: i32) -> Self {
        usize::try_from(code)
            .ok()
            .and_then(|index| Self::ALL.get(index).copied())
            .unwrap_or(PixelFormat::Rgb888)
    }

    /// Engine format code
    pub fn code(&self) -> i32 {
        Self::ALL
            .iter()
            .position(|format| format == self)
            .map(|index| index as i32)
            .unwrap_or(6)
    }

    /// Bits per pixel of the (first) plane
    pub fn bits_per_pixel(&self) -> u32 {
        match self {
            Self::Binary | Self::BinaryInverted => 1,
            Self::Grayscale | Self::Nv21 => 8,
            Self::Rgb565 | Self::Rgb555 => 16,
            Self::Rgb888 | Self::Bgr888 => 24,
            Self::Argb8888 | Self::Abgr8888 => 32,
            Self::Rgb161616 => 48,
            Self::Argb16161616 | Self::Abgr16161616 => 64,
        }
    }

    /// Minimum number of bytes a row of `width` pixels occupies
    pub fn min_row_bytes(&self, width: u32) -> usize {
        (width as usize * self.bits_per_pixel() as usize).div_ceil(8)
    }

    /// Number of stride-sized rows a `height` pixel tall image spans
    ///
    /// NV21 carries a half-height chroma plane after the luma rows.
    pub fn rows(&self, height: u32) -> usize {
        match self {
            Self::Nv21 => height as usize + (height as usize).div_ceil(2),
            _ => height as usize,
        }
    }

    /// Short name used on the command line and in logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::BinaryInverted => "binary-inverted",
            Self::Grayscale => "gray",
            Self::Nv21 => "nv21",
            Self::Rgb565 => "rgb565",
            Self::Rgb555 => "rgb555",
            Self::Rgb888 => "rgb888",
            Self::Argb8888 => "argb8888",
            Self::Rgb161616 => "rgb161616",
            Self::Argb16161616 => "argb16161616",
            Self::Abgr8888 => "abgr8888",
            Self::Abgr16161616 => "abgr16161616",
            Self::Bgr888 => "bgr888",
        }
    }

    /// Parse a short name as produced by [`PixelFormat::name`]
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        Self::ALL.iter().copied().find(|format| format.name() == name)
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shared immutable pixel or file bytes
///
/// Cloning is cheap; frames move between the producer, the queue and the
/// decoding thread without copying the payload again.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageData(Arc<[u8]>);

impl ImageData {
    /// Number of bytes held
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for ImageData {
    fn from(data: Vec<u8>) -> Self {
        ImageData(Arc::from(data))
    }
}

impl From<&[u8]> for ImageData {
    fn from(data: &[u8]) -> Self {
        ImageData(Arc::from(data))
    }
}

impl Deref for ImageData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for ImageData {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for ImageData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ImageData({} bytes)", self.0.len())
    }
}

/// An uncompressed pixel buffer with its shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    pub data: ImageData,
    pub width: u32,
    pub height: u32,
    /// Bytes per row, may include padding
    pub stride: u32,
    pub format: PixelFormat,
}

impl RawImage {
    /// Create a raw image without validating it
    pub fn new(
        data: impl Into<ImageData>,
        width: u32,
        height: u32,
        stride: u32,
        format: PixelFormat,
    ) -> Self {
        Self {
            data: data.into(),
            width,
            height,
            stride,
            format,
        }
    }

    /// Bytes the buffer must hold for its declared shape
    pub fn required_len(&self) -> usize {
        required_len(self.height, self.stride, self.format)
    }

    /// Check the declared shape against the buffer
    pub fn validate(&self) -> ReaderResult<()> {
        validate_shape(self.width, self.height, self.stride, self.format)?;
        let required = self.required_len();
        if self.data.len() < required {
            return Err(ReaderError::invalid_buffer(format!(
                "buffer holds {} bytes, {}x{} {} with stride {} needs {}",
                self.data.len(),
                self.width,
                self.height,
                self.format,
                self.stride,
                required
            )));
        }
        Ok(())
    }
}

/// Bytes an image of the given height, stride and format spans
pub fn required_len(height: u32, stride: u32, format: PixelFormat) -> usize {
    stride as usize * format.rows(height)
}

/// Check a width, height and stride combination without a buffer
pub fn validate_shape(
    width: u32,
    height: u32,
    stride: u32,
    format: PixelFormat,
) -> ReaderResult<()> {
    if width == 0 || height == 0 {
        return Err(ReaderError::invalid_buffer(format!(
            "image dimensions must be positive, got {}x{}",
            width, height
        )));
    }
    let min_stride = format.min_row_bytes(width);
    if (stride as usize) < min_stride {
        return Err(ReaderError::invalid_buffer(format!(
            "stride {} is smaller than {} bytes for {} pixels of {}",
            stride, min_stride, width, format
        )));
    }
    Ok(())
}

/// Input handed to a decode engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Image file on disk
    File(PathBuf),
    /// Encoded image file contents (PNG, JPEG, ...)
    Encoded(ImageData),
    /// Uncompressed pixels
    Raw(RawImage),
    /// Base64 encoded image file, optionally with a data URL prefix
    Base64(String),
}

impl ImageSource {
    /// Short label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            ImageSource::File(_) => "file",
            ImageSource::Encoded(_) => "buffer",
            ImageSource::Raw(_) => "raw",
            ImageSource::Base64(_) => "base64",
        }
    }

    /// One-line description for logs
    pub fn describe(&self) -> String {
        match self {
            ImageSource::File(path) => format!("file {}", path.display()),
            ImageSource::Encoded(data) => format!("buffer of {} bytes", data.len()),
            ImageSource::Raw(raw) => format!(
                "{}x{} {} (stride {})",
                raw.width, raw.height, raw.format, raw.stride
            ),
            ImageSource::Base64(text) => format!("base64 text of {} chars", text.len()),
        }
    }
}

impl From<RawImage> for ImageSource {
    fn from(raw: RawImage) -> Self {
        ImageSource::Raw(raw)
    }
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        ImageSource::File(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_codes_map_to_rgb888() {
        assert_eq!(PixelFormat::from_code(2), PixelFormat::Grayscale);
        assert_eq!(PixelFormat::from_code(12), PixelFormat::Bgr888);
        assert_eq!(PixelFormat::from_code(13), PixelFormat::Rgb888);
        assert_eq!(PixelFormat::from_code(-1), PixelFormat::Rgb888);
    }

    #[test]
    fn test_codes_match_order() {
        for (index, format) in PixelFormat::ALL.iter().enumerate() {
            assert_eq!(format.code(), index as i32);
        }
    }

    #[test]
    fn test_row_bytes() {
        assert_eq!(PixelFormat::Binary.min_row_bytes(9), 2);
        assert_eq!(PixelFormat::Grayscale.min_row_bytes(9), 9);
        assert_eq!(PixelFormat::Rgb565.min_row_bytes(9), 18);
        assert_eq!(PixelFormat::Bgr888.min_row_bytes(9), 27);
        assert_eq!(PixelFormat::Abgr16161616.min_row_bytes(9), 72);
    }

    #[test]
    fn test_nv21_spans_chroma_rows() {
        assert_eq!(PixelFormat::Nv21.rows(4), 6);
        assert_eq!(PixelFormat::Nv21.rows(5), 8);
        assert_eq!(PixelFormat::Grayscale.rows(5), 5);
    }

    #[test]
    fn test_padded_stride_is_accepted() {
        let raw = RawImage::new(vec![0u8; 16 * 4], 10, 4, 16, PixelFormat::Grayscale);
        assert!(raw.validate().is_ok());
    }

    #[test]
    fn test_short_buffer_is_rejected() {
        let raw = RawImage::new(vec![0u8; 39], 10, 4, 10, PixelFormat::Grayscale);
        let err = raw.validate().unwrap_err();
        assert_eq!(err.code(), crate::engine::status::BUFFER_INVALID);
    }

    #[test]
    fn test_narrow_stride_is_rejected() {
        let raw = RawImage::new(vec![0u8; 100], 10, 2, 20, PixelFormat::Rgb888);
        assert!(raw.validate().is_err());
    }

    #[test]
    fn test_zero_dimensions_are_rejected() {
        let raw = RawImage::new(Vec::new(), 0, 4, 0, PixelFormat::Grayscale);
        assert!(raw.validate().is_err());
    }

    #[test]
    fn test_names_round_trip() {
        for format in PixelFormat::ALL {
            assert_eq!(PixelFormat::from_name(format.name()), Some(format));
        }
        assert_eq!(PixelFormat::from_name("GRAY"), Some(PixelFormat::Grayscale));
        assert_eq!(PixelFormat::from_name("yuv"), None);
    }
}
