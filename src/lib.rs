// SPDX-License-Identifier: GPL-3.0-only

//! Barcode Bridge - barcode reader orchestration around a decode engine
//!
//! This library drives an opaque barcode decode engine: it owns the engine
//! handle, the runtime settings, the worker threads and the release of
//! every result array the engine hands back.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`engine`]: the [`DecodeEngine`] trait, status codes, a QR engine and a
//!   scripted engine
//! - [`config`]: runtime settings and the settings store
//! - [`results`]: caller-owned results and scoped release of engine arrays
//! - [`media`]: image sources, pixel formats and luminance conversion
//! - [`decoder`]: the single-shot decode used by every path
//! - [`pipelines`]: async single decode and continuous frame decoding
//! - [`reader`]: the [`BarcodeReader`] facade
//!
//! # Example
//!
//! ```no_run
//! use barcode_bridge::BarcodeReader;
//!
//! let reader = BarcodeReader::default();
//! for result in reader.decode_file("label.png")? {
//!     println!("{}: {}", result.format, result.text);
//! }
//! # Ok::<(), barcode_bridge::ReaderError>(())
//! ```

pub mod config;
pub mod constants;
pub mod decoder;
pub mod engine;
pub mod errors;
pub mod media;
pub mod pipelines;
pub mod reader;
pub mod results;

// Re-export commonly used types
pub use config::{BarcodeFormat, ConflictPolicy, RuntimeSettings, SettingsStore};
pub use decoder::Decoded;
pub use engine::DecodeEngine;
pub use errors::{ReaderError, ReaderResult};
pub use media::{ImageData, ImageSource, PixelFormat, RawImage};
pub use pipelines::frame_decoding::{
    FrameAdmission, FrameCallbacks, FrameDecodingParameters, FrameDecodingState, FrameEvent,
    FrameId, FrameListener, FrameResult, FrameStatistics,
};
pub use reader::BarcodeReader;
pub use results::{Point, Quadrilateral, SymbolResult, TextEncoding};
