// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the barcode reader

use crate::engine::status;
use crate::results::TextEncoding;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using ReaderError
pub type ReaderResult<T> = Result<T, ReaderError>;

/// Main reader error type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReaderError {
    /// Malformed settings text or out-of-range value; the settings are unchanged
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The decode engine reported a failure for one decode call
    #[error("Decode error {code}: {message}")]
    Decode { code: i32, message: String },

    /// Continuous decoding was started twice without a stop in between
    #[error("Frame decoding is already running")]
    AlreadyRunning,

    /// The frame decoding thread did not exit within its grace period
    #[error("Frame decoding thread did not stop within {grace:?}")]
    StopFailed { grace: Duration },

    /// An asynchronous decode is still outstanding
    #[error("An asynchronous decode is already in progress")]
    Busy,

    /// Engine or OS resource allocation failed
    #[error("Resource error: {0}")]
    Resource(String),

    /// A frame was appended while continuous decoding is not running
    #[error("Frame decoding is not running")]
    NotRunning,

    /// Decoded bytes could not be interpreted under the configured encoding
    #[error("Result {index} is not valid {encoding} text")]
    TextEncoding { index: usize, encoding: TextEncoding },
}

impl ReaderError {
    /// Build a decode error from an engine status code and message
    pub fn decode(code: i32, message: impl Into<String>) -> Self {
        ReaderError::Decode {
            code,
            message: message.into(),
        }
    }

    /// Build the error used for image buffers that do not match their shape
    pub fn invalid_buffer(message: impl Into<String>) -> Self {
        Self::decode(status::BUFFER_INVALID, message)
    }

    /// Engine status code equivalent of this error
    pub fn code(&self) -> i32 {
        match self {
            ReaderError::Configuration(_) => status::PARAMETER_VALUE_INVALID,
            ReaderError::Decode { code, .. } => *code,
            ReaderError::AlreadyRunning => status::FRAME_DECODING_THREAD_EXISTS,
            ReaderError::StopFailed { .. } => status::STOP_DECODING_THREAD_FAILED,
            ReaderError::Busy => status::UNKNOWN,
            ReaderError::Resource(_) => status::NO_MEMORY,
            ReaderError::NotRunning => status::UNKNOWN,
            ReaderError::TextEncoding { .. } => status::UNKNOWN,
        }
    }

    /// Whether the reader instance must not be reused after this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, ReaderError::StopFailed { .. })
    }
}

impl From<serde_json::Error> for ReaderError {
    fn from(err: serde_json::Error) -> Self {
        ReaderError::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_follow_engine_numbering() {
        assert_eq!(ReaderError::AlreadyRunning.code(), -10049);
        assert_eq!(
            ReaderError::StopFailed {
                grace: Duration::from_secs(1)
            }
            .code(),
            -10050
        );
        assert_eq!(ReaderError::invalid_buffer("short").code(), -10018);
        assert_eq!(ReaderError::decode(-10026, "timeout").code(), -10026);
    }

    #[test]
    fn test_only_stop_failure_is_fatal() {
        assert!(
            ReaderError::StopFailed {
                grace: Duration::from_millis(10)
            }
            .is_fatal()
        );
        assert!(!ReaderError::Busy.is_fatal());
        assert!(!ReaderError::decode(-10005, "missing").is_fatal());
    }

    #[test]
    fn test_json_errors_become_configuration_errors() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(ReaderError::from(err), ReaderError::Configuration(_)));
    }
}
