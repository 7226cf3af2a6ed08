// SPDX-License-Identifier: GPL-3.0-only

//! Decode engine status codes
//!
//! Engines report the outcome of every call as an integer status. Zero is
//! success; negative values follow the numbering of the barcode reader SDK
//! so diagnostics stay comparable across engines.

/// Successful call
pub const SUCCESS: i32 = 0;
/// Unknown error
pub const UNKNOWN: i32 = -10000;
/// Not enough memory to perform the operation
pub const NO_MEMORY: i32 = -10001;
/// A null handle or pointer was passed to the engine
pub const NULL_POINTER: i32 = -10002;
/// The file was not found
pub const FILE_NOT_FOUND: i32 = -10005;
/// The file type is not supported
pub const FILETYPE_NOT_SUPPORTED: i32 = -10006;
/// The pixel format (bits per pixel) is not supported
pub const BPP_NOT_SUPPORTED: i32 = -10007;
/// Failed to read the image
pub const IMAGE_READ_FAILED: i32 = -10012;
/// The image buffer does not match its declared shape
pub const BUFFER_INVALID: i32 = -10018;
/// Recognition did not finish within the configured timeout
pub const RECOGNITION_TIMEOUT: i32 = -10026;
/// Failed to parse a JSON settings string
pub const JSON_PARSE_FAILED: i32 = -10030;
/// Unknown key in a JSON settings string
pub const JSON_KEY_INVALID: i32 = -10032;
/// Invalid value in a JSON settings string
pub const JSON_VALUE_INVALID: i32 = -10033;
/// A parameter value is out of range
pub const PARAMETER_VALUE_INVALID: i32 = -10038;
/// A frame decoding thread already exists
pub const FRAME_DECODING_THREAD_EXISTS: i32 = -10049;
/// Failed to stop the frame decoding thread
pub const STOP_DECODING_THREAD_FAILED: i32 = -10050;

/// Human readable message for a status code
pub fn error_string(code: i32) -> &'static str {
    match code {
        SUCCESS => "Successful.",
        NO_MEMORY => "Not enough memory to perform the operation.",
        NULL_POINTER => "Null pointer.",
        FILE_NOT_FOUND => "File not found.",
        FILETYPE_NOT_SUPPORTED => "The file type is not supported.",
        BPP_NOT_SUPPORTED => "The BPP (Bits Per Pixel) is not supported.",
        IMAGE_READ_FAILED => "Failed to read the image.",
        BUFFER_INVALID => "The image buffer is invalid.",
        RECOGNITION_TIMEOUT => "Recognition timeout.",
        JSON_PARSE_FAILED => "Failed to parse JSON string.",
        JSON_KEY_INVALID => "The key is invalid in JSON string.",
        JSON_VALUE_INVALID => "The value is invalid in JSON string.",
        PARAMETER_VALUE_INVALID => "The parameter value is invalid or out of range.",
        FRAME_DECODING_THREAD_EXISTS => "The frame decoding thread already exists.",
        STOP_DECODING_THREAD_FAILED => "Failed to stop the frame decoding thread.",
        _ => "Unknown error.",
    }
}
