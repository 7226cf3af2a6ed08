// SPDX-License-Identifier: GPL-3.0-only

//! Decode engine abstraction
//!
//! The reader never interprets pixels itself. It hands an [`ImageSource`]
//! and a settings snapshot to a [`DecodeEngine`] and receives a status code
//! plus an optional engine-owned result array, which must be handed back
//! to [`DecodeEngine::free_results`] once converted.
//!
//! - [`qr::QrEngine`]: QR code engine backed by `rqrr`
//! - [`scripted::ScriptedEngine`]: deterministic engine for tests and demos

pub mod qr;
pub mod scripted;
pub mod status;

use crate::config::RuntimeSettings;
use crate::media::ImageSource;
use crate::results::native::NativeResultArray;

/// Outcome of one engine decode call
#[derive(Debug, PartialEq, Eq)]
pub struct EngineOutput {
    /// Engine status code, [`status::SUCCESS`] on success
    pub status: i32,
    /// Results allocated by the engine, possibly alongside an error status
    pub results: Option<NativeResultArray>,
}

impl EngineOutput {
    pub fn success(results: NativeResultArray) -> Self {
        Self {
            status: status::SUCCESS,
            results: Some(results),
        }
    }

    pub fn failure(status: i32) -> Self {
        Self {
            status,
            results: None,
        }
    }

    /// Error status that still carries partial results
    pub fn partial(status: i32, results: NativeResultArray) -> Self {
        Self {
            status,
            results: Some(results),
        }
    }
}

/// A barcode decoding engine
///
/// Implementations must tolerate concurrent `decode` calls from the
/// calling thread, the async worker and the frame decoding thread.
pub trait DecodeEngine: Send + Sync {
    /// Engine name for logs
    fn name(&self) -> &str;

    /// Decode one image with the given settings
    fn decode(&self, source: &ImageSource, settings: &RuntimeSettings) -> EngineOutput;

    /// Release a result array previously returned by `decode`
    fn free_results(&self, results: NativeResultArray);

    /// Message for a status code
    fn error_string(&self, code: i32) -> String {
        status::error_string(code).to_string()
    }
}
