// SPDX-License-Identifier: GPL-3.0-only

//! Library-wide constants

/// Continuous frame decoding constants
pub mod frame_decoding {
    use std::time::Duration;

    /// Default capacity of the pending frame queue
    pub const DEFAULT_MAX_QUEUE_LENGTH: usize = 3;

    /// Default number of recent frame results kept for inspection
    pub const DEFAULT_MAX_RESULT_QUEUE_LENGTH: usize = 10;

    /// Time the decoding thread gets to observe a stop request
    pub const DEFAULT_STOP_GRACE_PERIOD: Duration = Duration::from_secs(5);

    /// Name of the frame decoding thread
    pub const THREAD_NAME: &str = "frame-decoding";
}

/// Asynchronous single-image decode constants
pub mod async_decode {
    /// Name of the one-shot decode worker thread
    pub const THREAD_NAME: &str = "async-decode";
}

/// Runtime settings defaults
pub mod settings {
    /// Default recognition timeout in milliseconds
    pub const DEFAULT_TIMEOUT_MS: i32 = 10_000;

    /// Default (and maximum) number of algorithm threads
    pub const DEFAULT_MAX_ALGORITHM_THREAD_COUNT: i32 = 4;

    /// Images whose shorter edge exceeds this are shrunk before localization
    pub const DEFAULT_SCALE_DOWN_THRESHOLD: i32 = 2300;

    /// Smallest accepted scale-down threshold
    pub const MIN_SCALE_DOWN_THRESHOLD: i32 = 8;

    /// Default raster resolution for PDF pages
    pub const DEFAULT_PDF_RASTER_DPI: i32 = 300;

    /// Accepted PDF raster resolutions
    pub const PDF_RASTER_DPI_RANGE: (i32, i32) = (100, 600);

    /// Default deblur effort
    pub const DEFAULT_DEBLUR_LEVEL: i32 = 9;

    /// Maximum number of entries in a mode list
    pub const MAX_MODE_ENTRIES: usize = 8;
}

/// File format constants
pub mod file_formats {
    /// Supported image file extensions (lowercase)
    pub const IMAGE_EXTENSIONS: &[&str] = &[
        "png", "jpg", "jpeg", "gif", "bmp", "webp", "tif", "tiff", "pgm", "pbm", "ppm",
    ];

    /// Check if a file extension is a supported image format
    pub fn is_image_extension(ext: &str) -> bool {
        IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str())
    }
}

/// Application info
pub mod app_info {
    /// Package version reported by `--version`
    pub fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }
}
