// SPDX-License-Identifier: GPL-3.0-only

//! Bounded frame queue shared by producers and the decoding thread
//!
//! One mutex guards the pending frames, the result history and the run
//! counters; one condition variable wakes the decoding thread when a frame
//! arrives or the queue closes. Producers never wait on decoding.

use super::{
    FrameAdmission, FrameDecodingParameters, FrameId, FrameResult, FrameStatistics,
};
use crate::errors::{ReaderError, ReaderResult};
use crate::media::{ImageData, PixelFormat, RawImage};
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use tracing::trace;

/// A frame waiting to be decoded
#[derive(Debug, Clone)]
pub struct QueuedFrame {
    pub id: FrameId,
    pub image: RawImage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameShape {
    width: u32,
    height: u32,
    stride: u32,
    format: PixelFormat,
    len: usize,
}

#[derive(Debug)]
struct QueueState {
    open: bool,
    /// Incremented on every open so producers can detect a restart
    generation: u64,
    shape: Option<FrameShape>,
    capacity: usize,
    pending: VecDeque<QueuedFrame>,
    history_capacity: usize,
    history: VecDeque<FrameResult>,
    next_frame_id: FrameId,
    stats: FrameStatistics,
}

/// Frame FIFO with a bounded history of decoded results
#[derive(Debug)]
pub struct FrameQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameQueue {
    /// A closed, empty queue
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                open: false,
                generation: 0,
                shape: None,
                capacity: 0,
                pending: VecDeque::new(),
                history_capacity: 0,
                history: VecDeque::new(),
                next_frame_id: 1,
                stats: FrameStatistics::default(),
            }),
            available: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a new run: reset ids, history and counters, accept frames
    pub fn open(&self, params: &FrameDecodingParameters) {
        let mut state = self.lock();
        state.open = true;
        state.generation += 1;
        state.shape = Some(FrameShape {
            width: params.width,
            height: params.height,
            stride: params.stride,
            format: params.pixel_format,
            len: params.frame_len(),
        });
        state.capacity = params.max_queue_length;
        state.pending.clear();
        state.history_capacity = params.max_result_queue_length;
        state.history.clear();
        state.next_frame_id = 1;
        state.stats = FrameStatistics::default();
    }

    /// Stop accepting frames and wake the decoding thread
    ///
    /// Returns the number of pending frames discarded. History and
    /// counters are kept until the next [`FrameQueue::open`].
    pub fn close(&self) -> usize {
        let discarded = {
            let mut state = self.lock();
            state.open = false;
            let discarded = state.pending.len();
            state.pending.clear();
            state.stats.discarded += discarded as u64;
            discarded
        };
        self.available.notify_all();
        discarded
    }

    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    /// Copy a frame into the queue
    ///
    /// The copy happens outside the lock. Fails with
    /// [`ReaderError::NotRunning`] when closed and with a `BUFFER_INVALID`
    /// decode error when `pixels` is shorter than the configured frame.
    pub fn push(&self, pixels: &[u8]) -> ReaderResult<FrameAdmission> {
        let (generation, shape) = {
            let state = self.lock();
            match (state.open, state.shape) {
                (true, Some(shape)) => (state.generation, shape),
                _ => return Err(ReaderError::NotRunning),
            }
        };

        if pixels.len() < shape.len {
            return Err(ReaderError::invalid_buffer(format!(
                "frame holds {} bytes, {} required",
                pixels.len(),
                shape.len
            )));
        }
        let image = RawImage::new(
            ImageData::from(&pixels[..shape.len]),
            shape.width,
            shape.height,
            shape.stride,
            shape.format,
        );

        let admission = {
            let mut state = self.lock();
            if !state.open || state.generation != generation {
                return Err(ReaderError::NotRunning);
            }

            let frame_id = state.next_frame_id;
            state.next_frame_id += 1;
            state.stats.appended += 1;

            if state.pending.len() >= state.capacity {
                state.stats.dropped += 1;
                trace!(frame_id, "Frame queue full, dropping newest frame");
                return Ok(FrameAdmission::Dropped { frame_id });
            }

            state.pending.push_back(QueuedFrame {
                id: frame_id,
                image,
            });
            FrameAdmission::Queued { frame_id }
        };

        self.available.notify_one();
        Ok(admission)
    }

    /// Take the oldest pending frame, waiting while the queue is empty
    ///
    /// Returns `None` once the queue is closed.
    pub fn pop_blocking(&self) -> Option<QueuedFrame> {
        let mut state = self.lock();
        loop {
            if !state.open {
                return None;
            }
            if let Some(frame) = state.pending.pop_front() {
                return Some(frame);
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Record a successfully decoded frame in the history
    pub fn record(&self, result: &FrameResult) {
        let mut state = self.lock();
        state.stats.decoded += 1;
        if state.history_capacity == 0 {
            return;
        }
        while state.history.len() >= state.history_capacity {
            state.history.pop_front();
        }
        state.history.push_back(result.clone());
    }

    /// Count a frame whose decode failed
    pub fn record_failure(&self, _frame_id: FrameId) {
        self.lock().stats.failed += 1;
    }

    /// Frames buffered and not yet taken by the decoding thread
    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Recent results, oldest first
    pub fn history(&self) -> Vec<FrameResult> {
        self.lock().history.iter().cloned().collect()
    }

    pub fn statistics(&self) -> FrameStatistics {
        self.lock().stats
    }
}
