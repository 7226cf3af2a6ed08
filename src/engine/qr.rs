// SPDX-License-Identifier: GPL-3.0-only

//! QR code decode engine
//!
//! This engine decodes QR codes using the rqrr crate. Every input is
//! reduced to 8-bit luminance, optionally downscaled according to the
//! `scaleDownThreshold` setting, then searched for QR grids. Corner points
//! are mapped back to input coordinates.

use super::{DecodeEngine, EngineOutput, status};
use crate::config::{BarcodeFormat, RuntimeSettings};
use crate::media::ImageSource;
use crate::media::conversions::{downscale, to_luma};
use crate::results::Point;
use crate::results::native::{NativeResultArray, RawTextResult};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::{GrayImage, ImageError};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, trace, warn};

/// QR code engine
pub struct QrEngine {
    next_id: AtomicU64,
    live: AtomicUsize,
}

impl Default for QrEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl QrEngine {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            live: AtomicUsize::new(0),
        }
    }

    /// Result arrays handed out and not yet released
    pub fn outstanding(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    fn allocate(&self, results: Vec<RawTextResult>) -> NativeResultArray {
        self.live.fetch_add(1, Ordering::SeqCst);
        NativeResultArray::new(self.next_id.fetch_add(1, Ordering::SeqCst), results)
    }
}

fn image_error_status(err: &ImageError) -> i32 {
    match err {
        ImageError::Unsupported(_) => status::FILETYPE_NOT_SUPPORTED,
        ImageError::Limits(_) => status::NO_MEMORY,
        _ => status::IMAGE_READ_FAILED,
    }
}

/// Strip an optional `data:<mime>;base64,` prefix
fn base64_payload(text: &str) -> &str {
    let text = text.trim();
    if text.starts_with("data:") {
        if let Some((_, payload)) = text.split_once(',') {
            return payload;
        }
    }
    text
}

/// Load any supported source as a grayscale image
fn load_luma(source: &ImageSource) -> Result<GrayImage, i32> {
    match source {
        ImageSource::File(path) => {
            if !path.exists() {
                return Err(status::FILE_NOT_FOUND);
            }
            image::open(path)
                .map(|img| img.to_luma8())
                .map_err(|e| {
                    debug!(path = %path.display(), error = %e, "Failed to read image file");
                    image_error_status(&e)
                })
        }
        ImageSource::Encoded(data) => image::load_from_memory(data)
            .map(|img| img.to_luma8())
            .map_err(|e| {
                debug!(error = %e, "Failed to read image buffer");
                image_error_status(&e)
            }),
        ImageSource::Base64(text) => {
            let bytes = STANDARD.decode(base64_payload(text)).map_err(|e| {
                debug!(error = %e, "Invalid base64 image");
                status::IMAGE_READ_FAILED
            })?;
            image::load_from_memory(&bytes)
                .map(|img| img.to_luma8())
                .map_err(|e| image_error_status(&e))
        }
        ImageSource::Raw(raw) => to_luma(raw).map_err(|e| e.code()),
    }
}

impl DecodeEngine for QrEngine {
    fn name(&self) -> &str {
        "rqrr"
    }

    fn decode(&self, source: &ImageSource, settings: &RuntimeSettings) -> EngineOutput {
        if !settings.accepts(BarcodeFormat::QrCode) {
            trace!("QR_CODE not enabled, skipping");
            return EngineOutput::success(self.allocate(Vec::new()));
        }

        let start = Instant::now();
        let deadline = settings.timeout_duration().map(|limit| start + limit);

        let gray = match load_luma(source) {
            Ok(gray) => gray,
            Err(code) => return EngineOutput::failure(code),
        };

        let threshold = settings.scale_down_threshold.max(1) as u32;
        let (gray, (scale_x, scale_y)) = downscale(gray, threshold);
        let (width, height) = gray.dimensions();
        trace!(
            width,
            height,
            scale_x,
            scale_y,
            prepare_ms = start.elapsed().as_millis(),
            "Prepared luminance image"
        );

        let mut prepared =
            rqrr::PreparedImage::prepare_from_greyscale(width as usize, height as usize, |x, y| {
                gray.get_pixel(x as u32, y as u32)[0]
            });
        let grids = prepared.detect_grids();
        trace!(count = grids.len(), "QR grids located");

        let expected = settings.expected_barcodes_count.max(0) as usize;
        let min_len = settings.min_barcode_text_length.max(0) as usize;
        let mut results = Vec::with_capacity(grids.len());
        let mut timed_out = false;

        for grid in grids {
            if deadline.is_some_and(|deadline| Instant::now() > deadline) {
                timed_out = true;
                break;
            }

            let mut bytes = Vec::new();
            if let Err(e) = grid.decode_to(&mut bytes) {
                debug!(error = %e, "Failed to decode QR grid");
                continue;
            }
            if bytes.len() < min_len {
                trace!(len = bytes.len(), min_len, "QR payload below minimum length");
                continue;
            }

            let corners = grid.bounds.map(|p| {
                Point::new(
                    (p.x as f32 * scale_x).round() as i32,
                    (p.y as f32 * scale_y).round() as i32,
                )
            });
            results.push(RawTextResult {
                format: BarcodeFormat::QrCode.as_str().to_string(),
                bytes,
                corners,
                confidence: None,
            });

            if expected > 0 && results.len() >= expected {
                break;
            }
        }

        debug!(
            count = results.len(),
            total_ms = start.elapsed().as_millis(),
            timed_out,
            "QR decode complete"
        );

        let array = self.allocate(results);
        if timed_out {
            EngineOutput::partial(status::RECOGNITION_TIMEOUT, array)
        } else {
            EngineOutput::success(array)
        }
    }

    fn free_results(&self, results: NativeResultArray) {
        let previous = self
            .live
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if previous.is_err() {
            warn!(id = results.id, "Released a result array that was not outstanding");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_url_prefix_is_stripped() {
        assert_eq!(base64_payload("data:image/png;base64,AAAA"), "AAAA");
        assert_eq!(base64_payload("  AAAA\n"), "AAAA");
    }

    #[test]
    fn test_blank_image_has_no_results() {
        let engine = QrEngine::new();
        let gray = GrayImage::from_pixel(64, 64, image::Luma([255]));
        let mut png = Vec::new();
        image::DynamicImage::ImageLuma8(gray)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let output = engine.decode(
            &ImageSource::Encoded(png.into()),
            &RuntimeSettings::default(),
        );
        assert_eq!(output.status, status::SUCCESS);
        let array = output.results.unwrap();
        assert!(array.is_empty());
        engine.free_results(array);
        assert_eq!(engine.outstanding(), 0);
    }

    #[test]
    fn test_garbage_buffer_fails_to_read() {
        let engine = QrEngine::new();
        let output = engine.decode(
            &ImageSource::Encoded(vec![1u8, 2, 3, 4].into()),
            &RuntimeSettings::default(),
        );
        assert_ne!(output.status, status::SUCCESS);
        assert!(output.results.is_none());
    }
}
