// SPDX-License-Identifier: GPL-3.0-only

//! Single-shot decoding
//!
//! Every decode path (direct calls, the async worker and the frame decoding
//! thread) goes through [`decode_once`], which validates the input, calls
//! the engine, converts its result array and releases it. The time spent
//! is handed back with the results.

use crate::config::RuntimeSettings;
use crate::engine::{DecodeEngine, status};
use crate::errors::{ReaderError, ReaderResult};
use crate::media::ImageSource;
use crate::results::SymbolResult;
use crate::results::native::ResultArrayGuard;
use std::time::{Duration, Instant};
use tracing::debug;

/// Results of one decode and the time it took
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub results: Vec<SymbolResult>,
    /// From input validation to release of the result array
    pub elapsed: Duration,
}

/// Decode one image with a settings snapshot on the calling thread
///
/// Zero results is a success. A non-zero engine status becomes
/// [`ReaderError::Decode`] (or [`ReaderError::Resource`] for
/// `NO_MEMORY`); any results returned alongside it are released unread.
pub fn decode_once(
    engine: &dyn DecodeEngine,
    source: &ImageSource,
    settings: &RuntimeSettings,
) -> ReaderResult<Decoded> {
    let start = Instant::now();

    if let ImageSource::Raw(raw) = source {
        raw.validate()?;
    }

    let output = engine.decode(source, settings);
    let guard = output
        .results
        .map(|array| ResultArrayGuard::new(engine, array));

    if output.status != status::SUCCESS {
        let partial = guard.as_ref().map(ResultArrayGuard::len).unwrap_or(0);
        drop(guard);

        let message = engine.error_string(output.status);
        debug!(
            engine = engine.name(),
            source = %source.describe(),
            code = output.status,
            partial,
            elapsed_ms = start.elapsed().as_millis(),
            "Decode failed"
        );
        return Err(if output.status == status::NO_MEMORY {
            ReaderError::Resource(message)
        } else {
            ReaderError::decode(output.status, message)
        });
    }

    let results = match guard {
        Some(guard) => guard.convert(settings.text_encoding)?,
        None => Vec::new(),
    };

    let elapsed = start.elapsed();
    debug!(
        engine = engine.name(),
        source = %source.describe(),
        count = results.len(),
        elapsed_ms = elapsed.as_millis(),
        "Decode finished"
    );

    Ok(Decoded { results, elapsed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::scripted::{ScriptOutcome, ScriptStep, ScriptedEngine, sample_result};
    use crate::media::{PixelFormat, RawImage};

    fn gray(len: usize) -> ImageSource {
        ImageSource::Raw(RawImage::new(vec![0u8; len], 4, 4, 4, PixelFormat::Grayscale))
    }

    #[test]
    fn test_success_releases_array() {
        let engine = ScriptedEngine::new();
        engine.push_results(vec![sample_result("QR_CODE", b"abc")]);

        let decoded = decode_once(&engine, &gray(16), &RuntimeSettings::default()).unwrap();
        assert_eq!(decoded.results[0].text, "abc");
        assert_eq!(engine.allocations(), 1);
        assert_eq!(engine.outstanding(), 0);
    }

    #[test]
    fn test_partial_results_released_on_error() {
        let engine = ScriptedEngine::new();
        engine.push(ScriptStep::new(ScriptOutcome::FailureWithResults(
            status::RECOGNITION_TIMEOUT,
            vec![sample_result("QR_CODE", b"late")],
        )));

        let err = decode_once(&engine, &gray(16), &RuntimeSettings::default()).unwrap_err();
        assert_eq!(err.code(), status::RECOGNITION_TIMEOUT);
        assert_eq!(engine.frees(), 1);
        assert_eq!(engine.outstanding(), 0);
    }

    #[test]
    fn test_invalid_buffer_never_reaches_engine() {
        let engine = ScriptedEngine::new();
        let err = decode_once(&engine, &gray(15), &RuntimeSettings::default()).unwrap_err();
        assert_eq!(err.code(), status::BUFFER_INVALID);
        assert_eq!(engine.call_count(), 0);
    }

    #[test]
    fn test_no_memory_is_resource_error() {
        let engine = ScriptedEngine::new();
        engine.push_failure(status::NO_MEMORY);
        let err = decode_once(&engine, &gray(16), &RuntimeSettings::default()).unwrap_err();
        assert!(matches!(err, ReaderError::Resource(_)));
    }

    #[test]
    fn test_elapsed_covers_engine_time() {
        let engine = ScriptedEngine::new();
        engine.push(
            ScriptStep::new(ScriptOutcome::Results(Vec::new()))
                .with_delay(Duration::from_millis(30)),
        );

        let decoded = decode_once(&engine, &gray(16), &RuntimeSettings::default()).unwrap();
        assert!(decoded.results.is_empty());
        assert!(decoded.elapsed >= Duration::from_millis(30));
    }
}
