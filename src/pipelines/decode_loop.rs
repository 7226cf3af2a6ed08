// SPDX-License-Identifier: GPL-3.0-only

//! Thread lifecycle management for decode loops
//!
//! A [`DecodeLoopController`] owns one named thread that runs a closure
//! until it returns [`LoopAction::Stop`] or a stop is requested. Unlike a
//! plain join, shutdown is bounded: [`DecodeLoopController::join_within`]
//! waits at most a grace period for the thread to exit and detaches it
//! otherwise.

use crate::errors::{ReaderError, ReaderResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Action returned by the loop callback to control loop behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Continue running the loop
    Continue,
    /// Stop the loop gracefully
    Stop,
}

/// Set once the loop thread has left its closure, even by panicking
#[derive(Default)]
struct ExitLatch {
    exited: Mutex<bool>,
    signal: Condvar,
}

impl ExitLatch {
    fn release(&self) {
        *self.exited.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.signal.notify_all();
    }

    /// Wait until released or `timeout` elapses; true if released
    fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut exited = self.exited.lock().unwrap_or_else(PoisonError::into_inner);
        while !*exited {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            exited = self
                .signal
                .wait_timeout(exited, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

struct ExitGuard(Arc<ExitLatch>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// Controller for a decode loop running in a separate thread
///
/// # Example
///
/// ```ignore
/// let mut controller = DecodeLoopController::start("frame-decoding", grace, move || {
///     match queue.pop_blocking() {
///         Some(frame) => {
///             decode(frame);
///             LoopAction::Continue
///         }
///         None => LoopAction::Stop,
///     }
/// })?;
///
/// // Later, stop the loop
/// controller.request_stop();
/// if !controller.join_within(grace) {
///     // thread detached
/// }
/// ```
pub struct DecodeLoopController {
    /// Thread handle for joining
    thread_handle: Option<JoinHandle<()>>,
    /// Signal to stop the loop
    stop_signal: Arc<AtomicBool>,
    exit: Arc<ExitLatch>,
    /// Grace period used when dropped while running
    grace: Duration,
    /// Name for logging
    name: String,
}

impl DecodeLoopController {
    /// Start a new decode loop in a separate named thread
    ///
    /// The closure is called repeatedly until it returns `LoopAction::Stop`
    /// or a stop is requested. Fails with [`ReaderError::Resource`] if the
    /// thread cannot be spawned.
    pub fn start<F>(name: &str, grace: Duration, mut loop_fn: F) -> ReaderResult<Self>
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop_signal_clone = Arc::clone(&stop_signal);
        let exit = Arc::new(ExitLatch::default());
        let exit_guard = ExitGuard(Arc::clone(&exit));
        let name_clone = name.to_string();

        info!(name = %name, "Starting decode loop");

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _exit_guard = exit_guard;
                debug!(name = %name_clone, "Decode loop thread started");

                loop {
                    // Check stop signal first
                    if stop_signal_clone.load(Ordering::SeqCst) {
                        debug!(name = %name_clone, "Stop signal received");
                        break;
                    }

                    match loop_fn() {
                        LoopAction::Continue => {}
                        LoopAction::Stop => {
                            debug!(name = %name_clone, "Loop requested stop");
                            break;
                        }
                    }
                }

                info!(name = %name_clone, "Decode loop thread exiting");
            })
            .map_err(|e| {
                ReaderError::Resource(format!("failed to spawn {} thread: {}", name, e))
            })?;

        Ok(Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            exit,
            grace,
            name: name.to_string(),
        })
    }

    /// Check if the loop is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Signal the loop to stop (non-blocking)
    ///
    /// The loop observes the signal between iterations; an iteration that
    /// is blocked must be woken separately.
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting decode loop stop");
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Wait up to `grace` for the thread to exit, then join it
    ///
    /// Returns false if the thread is still running after `grace`, or if
    /// called from the loop thread itself. The thread is detached in that
    /// case and keeps running until its closure returns.
    pub fn join_within(&mut self, grace: Duration) -> bool {
        let Some(handle) = self.thread_handle.take() else {
            return true;
        };

        if handle.thread().id() == thread::current().id() {
            warn!(name = %self.name, "Decode loop cannot join itself, detaching");
            return false;
        }

        debug!(name = %self.name, ?grace, "Waiting for decode loop thread to finish");
        if !self.exit.wait(grace) {
            warn!(name = %self.name, ?grace, "Decode loop thread did not exit in time, detaching");
            return false;
        }

        if let Err(e) = handle.join() {
            warn!(name = %self.name, "Decode loop thread panicked: {:?}", e);
        } else {
            debug!(name = %self.name, "Decode loop thread finished");
        }
        true
    }
}

impl Drop for DecodeLoopController {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "DecodeLoopController dropped, stopping loop");
            self.request_stop();
            let grace = self.grace;
            self.join_within(grace);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    const GRACE: Duration = Duration::from_secs(5);

    #[test]
    fn test_basic_loop() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut controller = DecodeLoopController::start("test-loop", GRACE, move || {
            let count = counter_clone.fetch_add(1, Ordering::SeqCst);
            if count >= 10 {
                LoopAction::Stop
            } else {
                LoopAction::Continue
            }
        })
        .unwrap();

        // Wait for loop to finish itself
        assert!(controller.join_within(GRACE));
        assert_eq!(counter.load(Ordering::SeqCst), 11); // 0-10 inclusive
    }

    #[test]
    fn test_stop_signal() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut controller = DecodeLoopController::start("test-loop", GRACE, move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(10));
            LoopAction::Continue
        })
        .unwrap();

        thread::sleep(Duration::from_millis(50));

        controller.request_stop();
        assert!(controller.join_within(GRACE));
        assert!(counter.load(Ordering::SeqCst) > 0);
        assert!(!controller.is_running());
    }

    #[test]
    fn test_thread_is_named() {
        let name = Arc::new(Mutex::new(None));
        let name_clone = Arc::clone(&name);

        let mut controller = DecodeLoopController::start("named-loop", GRACE, move || {
            *name_clone.lock().unwrap() = thread::current().name().map(str::to_string);
            LoopAction::Stop
        })
        .unwrap();

        assert!(controller.join_within(GRACE));
        assert_eq!(name.lock().unwrap().as_deref(), Some("named-loop"));
    }

    #[test]
    fn test_slow_iteration_exceeds_grace() {
        let mut controller = DecodeLoopController::start("slow-loop", GRACE, || {
            thread::sleep(Duration::from_millis(300));
            LoopAction::Continue
        })
        .unwrap();

        thread::sleep(Duration::from_millis(20));
        controller.request_stop();
        assert!(!controller.join_within(Duration::from_millis(20)));
    }

    #[test]
    fn test_panicking_loop_still_joins() {
        let mut controller = DecodeLoopController::start("panic-loop", GRACE, || -> LoopAction {
            panic!("boom")
        })
        .unwrap();

        assert!(controller.join_within(GRACE));
    }

    #[test]
    fn test_is_running() {
        let controller = DecodeLoopController::start("test-running", GRACE, || {
            thread::sleep(Duration::from_millis(100));
            LoopAction::Continue
        })
        .unwrap();

        assert!(controller.is_running());

        // Drop will stop it
        drop(controller);
    }
}
