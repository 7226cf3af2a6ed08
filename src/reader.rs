// SPDX-License-Identifier: GPL-3.0-only

//! Reader instance
//!
//! [`BarcodeReader`] ties one decode engine to its settings store, its
//! async dispatcher and its continuous decoding pipeline. Teardown is
//! ordered: continuous decoding is stopped, the async worker is joined and
//! only then is the engine handle released.

use crate::config::{ConflictPolicy, RuntimeSettings, SettingsStore};
use crate::decoder::{Decoded, decode_once};
use crate::engine::DecodeEngine;
use crate::engine::qr::QrEngine;
use crate::errors::{ReaderError, ReaderResult};
use crate::media::{ImageData, ImageSource, PixelFormat, RawImage};
use crate::pipelines::async_decode::AsyncDispatcher;
use crate::pipelines::frame_decoding::{
    FrameAdmission, FrameDecoder, FrameDecodingParameters, FrameDecodingState, FrameListener,
    FrameResult, FrameStatistics,
};
use crate::results::SymbolResult;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// A barcode reader bound to one decode engine
pub struct BarcodeReader {
    // Field order is drop order: pipelines before the engine
    frame_decoder: FrameDecoder,
    dispatcher: AsyncDispatcher,
    settings: SettingsStore,
    engine: Arc<dyn DecodeEngine>,
}

impl Default for BarcodeReader {
    fn default() -> Self {
        Self::new(Arc::new(QrEngine::new()))
    }
}

impl BarcodeReader {
    /// Reader with default settings around `engine`
    pub fn new(engine: Arc<dyn DecodeEngine>) -> Self {
        debug!(engine = engine.name(), "Creating barcode reader");
        Self {
            frame_decoder: FrameDecoder::new(Arc::clone(&engine)),
            dispatcher: AsyncDispatcher::new(),
            settings: SettingsStore::new(),
            engine,
        }
    }

    pub fn engine(&self) -> &Arc<dyn DecodeEngine> {
        &self.engine
    }

    // Settings

    /// Snapshot of the active settings
    pub fn runtime_settings(&self) -> Arc<RuntimeSettings> {
        self.settings.get()
    }

    /// Merge a partial JSON settings object
    pub fn update_runtime_settings(&self, text: &str, policy: ConflictPolicy) -> ReaderResult<()> {
        self.settings.update(text, policy)
    }

    /// Apply a typed change to the active settings
    pub fn modify_runtime_settings<F>(&self, change: F) -> ReaderResult<()>
    where
        F: FnOnce(&mut RuntimeSettings),
    {
        self.settings.modify(change)
    }

    /// Replace the settings with defaults plus the given JSON object
    pub fn set_parameters(&self, text: &str) -> ReaderResult<()> {
        self.settings.replace(text)
    }

    /// Full effective settings as pretty JSON
    pub fn get_parameters(&self) -> ReaderResult<String> {
        self.settings.to_json()
    }

    pub fn reset_runtime_settings(&self) {
        self.settings.reset();
    }

    // Single-shot decoding

    /// Decode one image on the calling thread
    pub fn decode(&self, source: &ImageSource) -> ReaderResult<Vec<SymbolResult>> {
        self.decode_timed(source).map(|decoded| decoded.results)
    }

    /// Decode one image and report how long it took
    pub fn decode_timed(&self, source: &ImageSource) -> ReaderResult<Decoded> {
        let settings = self.settings.get();
        decode_once(self.engine.as_ref(), source, &settings)
    }

    /// Decode an image file
    pub fn decode_file(&self, path: impl AsRef<Path>) -> ReaderResult<Vec<SymbolResult>> {
        self.decode(&ImageSource::File(path.as_ref().to_path_buf()))
    }

    /// Decode an encoded image held in memory (PNG, JPEG, ...)
    pub fn decode_buffer(&self, data: impl Into<ImageData>) -> ReaderResult<Vec<SymbolResult>> {
        self.decode(&ImageSource::Encoded(data.into()))
    }

    /// Decode raw pixels
    pub fn decode_bytes(
        &self,
        pixels: impl Into<ImageData>,
        width: u32,
        height: u32,
        stride: u32,
        format: PixelFormat,
    ) -> ReaderResult<Vec<SymbolResult>> {
        self.decode(&ImageSource::Raw(RawImage::new(
            pixels, width, height, stride, format,
        )))
    }

    /// Decode a base64 encoded image file
    pub fn decode_base64(&self, text: impl Into<String>) -> ReaderResult<Vec<SymbolResult>> {
        self.decode(&ImageSource::Base64(text.into()))
    }

    /// Decode on tokio's blocking pool
    ///
    /// The settings snapshot is taken when this is called.
    pub fn decode_in_background(
        &self,
        source: ImageSource,
    ) -> impl Future<Output = ReaderResult<Vec<SymbolResult>>> + Send + 'static {
        let engine = Arc::clone(&self.engine);
        let settings = self.settings.get();
        async move {
            let task = move || decode_once(engine.as_ref(), &source, &settings);
            let decoded = tokio::task::spawn_blocking(task)
                .await
                .map_err(|e| ReaderError::Resource(format!("decode task failed: {}", e)))??;
            Ok(decoded.results)
        }
    }

    // Async single decode

    /// Decode on a worker thread and report through `on_complete`
    ///
    /// The callback receives the results with the decode time and runs on
    /// the worker thread. Blocks until any previous async decode of this
    /// reader has finished, including its callback.
    pub fn decode_async<F>(&self, source: ImageSource, on_complete: F) -> ReaderResult<()>
    where
        F: FnOnce(ReaderResult<Decoded>) + Send + 'static,
    {
        self.dispatcher.dispatch(
            Arc::clone(&self.engine),
            source,
            self.settings.get(),
            on_complete,
        )
    }

    /// Like [`BarcodeReader::decode_async`], but fails with
    /// [`ReaderError::Busy`] instead of waiting
    pub fn try_decode_async<F>(&self, source: ImageSource, on_complete: F) -> ReaderResult<()>
    where
        F: FnOnce(ReaderResult<Decoded>) + Send + 'static,
    {
        self.dispatcher.try_dispatch(
            Arc::clone(&self.engine),
            source,
            self.settings.get(),
            on_complete,
        )
    }

    /// Wait for the outstanding async decode, if any
    pub fn wait_async(&self) -> ReaderResult<()> {
        self.dispatcher.wait()
    }

    pub fn is_async_busy(&self) -> bool {
        self.dispatcher.is_busy()
    }

    // Continuous decoding

    /// Start decoding appended frames with the current settings
    pub fn start_frame_decoding<L>(
        &self,
        params: FrameDecodingParameters,
        listener: L,
    ) -> ReaderResult<()>
    where
        L: FrameListener,
    {
        self.frame_decoder
            .start(params, self.settings.get(), listener)
    }

    /// Queue a frame; see [`FrameAdmission`] for the full-queue policy
    pub fn append_frame(&self, pixels: &[u8]) -> ReaderResult<FrameAdmission> {
        self.frame_decoder.append(pixels)
    }

    pub fn stop_frame_decoding(&self) -> ReaderResult<()> {
        self.frame_decoder.stop()
    }

    pub fn frame_queue_length(&self) -> usize {
        self.frame_decoder.queue_length()
    }

    pub fn recent_results(&self) -> Vec<FrameResult> {
        self.frame_decoder.recent_results()
    }

    pub fn frame_decoding_state(&self) -> FrameDecodingState {
        self.frame_decoder.state()
    }

    pub fn frame_statistics(&self) -> FrameStatistics {
        self.frame_decoder.statistics()
    }
}

impl Drop for BarcodeReader {
    fn drop(&mut self) {
        if self.frame_decoder.state() == FrameDecodingState::Decoding {
            if let Err(e) = self.frame_decoder.stop() {
                warn!(error = %e, "Frame decoding did not stop cleanly");
            }
        }
        if let Err(e) = self.dispatcher.wait() {
            warn!(error = %e, "Async decode still running at teardown");
        }
        debug!(engine = self.engine.name(), "Barcode reader dropped");
    }
}
