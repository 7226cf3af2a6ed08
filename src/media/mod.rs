// SPDX-License-Identifier: GPL-3.0-only

//! Image inputs and pixel conversion
//!
//! - [`types`]: pixel formats, shared buffers and the [`ImageSource`] handed
//!   to decode engines
//! - [`conversions`]: reduction of raw layouts to 8-bit luminance

pub mod conversions;
pub mod types;

// Re-export commonly used types
pub use types::{ImageData, ImageSource, PixelFormat, RawImage};
