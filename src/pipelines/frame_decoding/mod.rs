// SPDX-License-Identifier: GPL-3.0-only

//! Continuous frame decoding
//!
//! Producers append raw frames from any thread; one decoding thread takes
//! them in FIFO order, decodes each with the settings captured at start and
//! hands the outcome to a [`FrameListener`].
//!
//! ```text
//! append_frame ──▶ ┌────────────┐ ──▶ decoding thread ──▶ FrameListener
//!  (any thread)    │ FrameQueue │      decode_once        on_result / on_error
//!                  │ (bounded)  │          │
//!                  └────────────┘          └──▶ result history (bounded)
//! ```
//!
//! When the queue is full the frame being appended is dropped and reported
//! as [`FrameAdmission::Dropped`]; frames already queued are never evicted.

pub mod queue;

use crate::config::RuntimeSettings;
use crate::constants::frame_decoding::{
    DEFAULT_MAX_QUEUE_LENGTH, DEFAULT_MAX_RESULT_QUEUE_LENGTH, DEFAULT_STOP_GRACE_PERIOD,
    THREAD_NAME,
};
use crate::decoder::decode_once;
use crate::engine::DecodeEngine;
use crate::errors::{ReaderError, ReaderResult};
use crate::media::types::{required_len, validate_shape};
use crate::media::{ImageSource, PixelFormat};
use crate::pipelines::decode_loop::{DecodeLoopController, LoopAction};
use crate::results::SymbolResult;
use futures::channel::mpsc;
use queue::FrameQueue;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Identifier of an appended frame, starting at 1 for every run
pub type FrameId = u64;

/// Shape of the frames and limits of one continuous decoding run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameDecodingParameters {
    /// Pending frames kept before new ones are dropped (at least 1)
    pub max_queue_length: usize,
    /// Decoded frame results kept for [`FrameDecoder::recent_results`]
    pub max_result_queue_length: usize,
    pub width: u32,
    pub height: u32,
    /// Bytes per row, may include padding
    pub stride: u32,
    pub pixel_format: PixelFormat,
    /// Time the decoding thread gets to finish its frame on stop
    pub stop_grace_period: Duration,
}

impl FrameDecodingParameters {
    /// Parameters with default limits for frames of the given shape
    pub fn new(width: u32, height: u32, stride: u32, pixel_format: PixelFormat) -> Self {
        Self {
            max_queue_length: DEFAULT_MAX_QUEUE_LENGTH,
            max_result_queue_length: DEFAULT_MAX_RESULT_QUEUE_LENGTH,
            width,
            height,
            stride,
            pixel_format,
            stop_grace_period: DEFAULT_STOP_GRACE_PERIOD,
        }
    }

    /// Bytes of one frame
    pub fn frame_len(&self) -> usize {
        required_len(self.height, self.stride, self.pixel_format)
    }

    pub fn validate(&self) -> ReaderResult<()> {
        if self.max_queue_length == 0 {
            return Err(ReaderError::Configuration(
                "max_queue_length must be at least 1".to_string(),
            ));
        }
        if self.stop_grace_period.is_zero() {
            return Err(ReaderError::Configuration(
                "stop_grace_period must be positive".to_string(),
            ));
        }
        validate_shape(self.width, self.height, self.stride, self.pixel_format)
            .map_err(|e| ReaderError::Configuration(format!("invalid frame shape: {}", e)))
    }
}

/// Lifecycle state of continuous decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameDecodingState {
    #[default]
    Idle,
    Decoding,
    /// The decoding thread failed to stop; the pipeline cannot be reused
    Faulted,
}

/// Outcome of appending a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameAdmission {
    Queued { frame_id: FrameId },
    /// The queue was full and this frame was discarded
    Dropped { frame_id: FrameId },
}

impl FrameAdmission {
    pub fn frame_id(&self) -> FrameId {
        match self {
            FrameAdmission::Queued { frame_id } | FrameAdmission::Dropped { frame_id } => {
                *frame_id
            }
        }
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, FrameAdmission::Queued { .. })
    }
}

/// Results of one decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameResult {
    pub frame_id: FrameId,
    pub results: Vec<SymbolResult>,
    /// Time spent decoding this frame
    pub elapsed: Duration,
}

/// Counters for the current (or last) run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStatistics {
    /// Frames accepted by `append_frame`, queued or dropped
    pub appended: u64,
    /// Frames dropped because the queue was full
    pub dropped: u64,
    /// Frames decoded successfully
    pub decoded: u64,
    /// Frames whose decode failed
    pub failed: u64,
    /// Pending frames thrown away by stop
    pub discarded: u64,
}

/// A frame outcome delivered through a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    Results(FrameResult),
    Error {
        frame_id: FrameId,
        error: ReaderError,
    },
}

impl FrameEvent {
    pub fn frame_id(&self) -> FrameId {
        match self {
            FrameEvent::Results(result) => result.frame_id,
            FrameEvent::Error { frame_id, .. } => *frame_id,
        }
    }
}

/// Receives frame outcomes on the decoding thread
///
/// Calls arrive in frame order. Calling back into the pipeline's `stop`
/// from here cannot succeed: the decoding thread would wait for itself.
pub trait FrameListener: Send + 'static {
    fn on_result(&mut self, result: FrameResult);

    fn on_error(&mut self, frame_id: FrameId, error: ReaderError) {
        warn!(frame_id, error = %error, "Frame decode failed");
    }
}

type ResultCallback = Box<dyn FnMut(FrameResult) + Send>;
type ErrorCallback = Box<dyn FnMut(FrameId, ReaderError) + Send>;

/// [`FrameListener`] built from closures
pub struct FrameCallbacks {
    on_result: ResultCallback,
    on_error: Option<ErrorCallback>,
}

impl FrameCallbacks {
    pub fn new<R>(on_result: R) -> Self
    where
        R: FnMut(FrameResult) + Send + 'static,
    {
        Self {
            on_result: Box::new(on_result),
            on_error: None,
        }
    }

    /// Handle per-frame errors instead of logging them
    pub fn with_error_handler<E>(mut self, on_error: E) -> Self
    where
        E: FnMut(FrameId, ReaderError) + Send + 'static,
    {
        self.on_error = Some(Box::new(on_error));
        self
    }
}

impl FrameListener for FrameCallbacks {
    fn on_result(&mut self, result: FrameResult) {
        (self.on_result)(result);
    }

    fn on_error(&mut self, frame_id: FrameId, error: ReaderError) {
        match self.on_error.as_mut() {
            Some(callback) => callback(frame_id, error),
            None => warn!(frame_id, error = %error, "Frame decode failed"),
        }
    }
}

/// Forwards outcomes to a bounded channel; events are dropped when it is full
impl FrameListener for mpsc::Sender<FrameEvent> {
    fn on_result(&mut self, result: FrameResult) {
        forward(self.try_send(FrameEvent::Results(result)));
    }

    fn on_error(&mut self, frame_id: FrameId, error: ReaderError) {
        forward(self.try_send(FrameEvent::Error { frame_id, error }));
    }
}

impl FrameListener for mpsc::UnboundedSender<FrameEvent> {
    fn on_result(&mut self, result: FrameResult) {
        forward(self.unbounded_send(FrameEvent::Results(result)));
    }

    fn on_error(&mut self, frame_id: FrameId, error: ReaderError) {
        forward(self.unbounded_send(FrameEvent::Error { frame_id, error }));
    }
}

fn forward(sent: Result<(), mpsc::TrySendError<FrameEvent>>) {
    if let Err(e) = sent {
        let frame_id = e.into_inner().frame_id();
        debug!(frame_id, "Frame event not delivered, receiver full or gone");
    }
}

/// Continuous decoding pipeline of one reader
pub struct FrameDecoder {
    engine: Arc<dyn DecodeEngine>,
    queue: Arc<FrameQueue>,
    /// Serializes start and stop; holds the running thread
    controller: Mutex<Option<DecodeLoopController>>,
    state: Mutex<FrameDecodingState>,
    grace: Mutex<Duration>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FrameDecoder {
    pub fn new(engine: Arc<dyn DecodeEngine>) -> Self {
        Self {
            engine,
            queue: Arc::new(FrameQueue::new()),
            controller: Mutex::new(None),
            state: Mutex::new(FrameDecodingState::Idle),
            grace: Mutex::new(DEFAULT_STOP_GRACE_PERIOD),
        }
    }

    /// Start the decoding thread
    ///
    /// `settings` is used for every frame of this run.
    pub fn start<L>(
        &self,
        params: FrameDecodingParameters,
        settings: Arc<RuntimeSettings>,
        mut listener: L,
    ) -> ReaderResult<()>
    where
        L: FrameListener,
    {
        let mut controller = lock(&self.controller);
        match self.state() {
            FrameDecodingState::Decoding => return Err(ReaderError::AlreadyRunning),
            FrameDecodingState::Faulted => {
                return Err(ReaderError::StopFailed {
                    grace: *lock(&self.grace),
                });
            }
            FrameDecodingState::Idle => {}
        }
        params.validate()?;

        self.queue.open(&params);

        let queue = Arc::clone(&self.queue);
        let engine = Arc::clone(&self.engine);
        let started = DecodeLoopController::start(THREAD_NAME, params.stop_grace_period, move || {
            let Some(frame) = queue.pop_blocking() else {
                return LoopAction::Stop;
            };
            let source = ImageSource::Raw(frame.image);
            match decode_once(engine.as_ref(), &source, &settings) {
                Ok(decoded) => {
                    let result = FrameResult {
                        frame_id: frame.id,
                        results: decoded.results,
                        elapsed: decoded.elapsed,
                    };
                    queue.record(&result);
                    listener.on_result(result);
                }
                Err(error) => {
                    queue.record_failure(frame.id);
                    listener.on_error(frame.id, error);
                }
            }
            LoopAction::Continue
        });

        match started {
            Ok(started) => {
                info!(
                    width = params.width,
                    height = params.height,
                    stride = params.stride,
                    format = %params.pixel_format,
                    max_queue_length = params.max_queue_length,
                    "Frame decoding started"
                );
                *controller = Some(started);
                *lock(&self.grace) = params.stop_grace_period;
                *lock(&self.state) = FrameDecodingState::Decoding;
                Ok(())
            }
            Err(e) => {
                self.queue.close();
                Err(e)
            }
        }
    }

    /// Queue a copy of `pixels` for decoding
    ///
    /// Never waits on the decoding thread.
    pub fn append(&self, pixels: &[u8]) -> ReaderResult<FrameAdmission> {
        self.queue.push(pixels)
    }

    /// Stop the decoding thread, discarding pending frames
    ///
    /// The frame being decoded may finish within the grace period. If the
    /// thread does not exit in time it is detached, the pipeline becomes
    /// [`FrameDecodingState::Faulted`] and [`ReaderError::StopFailed`] is
    /// returned. Stopping while idle does nothing.
    pub fn stop(&self) -> ReaderResult<()> {
        let mut controller = lock(&self.controller);
        let grace = *lock(&self.grace);
        match self.state() {
            FrameDecodingState::Idle => return Ok(()),
            FrameDecodingState::Faulted => return Err(ReaderError::StopFailed { grace }),
            FrameDecodingState::Decoding => {}
        }

        let discarded = self.queue.close();
        let joined = match controller.as_mut() {
            Some(running) => {
                running.request_stop();
                running.join_within(grace)
            }
            None => true,
        };
        // A detached thread is left to finish on its own
        *controller = None;

        if joined {
            *lock(&self.state) = FrameDecodingState::Idle;
            info!(discarded, "Frame decoding stopped");
            Ok(())
        } else {
            *lock(&self.state) = FrameDecodingState::Faulted;
            warn!(?grace, "Frame decoding thread failed to stop");
            Err(ReaderError::StopFailed { grace })
        }
    }

    pub fn state(&self) -> FrameDecodingState {
        *lock(&self.state)
    }

    /// Frames buffered and not yet decoded
    pub fn queue_length(&self) -> usize {
        self.queue.len()
    }

    /// Recent frame results, oldest first
    pub fn recent_results(&self) -> Vec<FrameResult> {
        self.queue.history()
    }

    pub fn statistics(&self) -> FrameStatistics {
        self.queue.statistics()
    }
}

impl Drop for FrameDecoder {
    fn drop(&mut self) {
        if self.state() == FrameDecodingState::Decoding {
            debug!("FrameDecoder dropped while decoding, stopping");
            if let Err(e) = self.stop() {
                warn!(error = %e, "Failed to stop frame decoding on drop");
            }
        }
    }
}
