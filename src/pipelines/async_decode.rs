// SPDX-License-Identifier: GPL-3.0-only

//! One-shot asynchronous decoding
//!
//! [`AsyncDispatcher`] runs a single decode on a dedicated worker thread and
//! reports the outcome through a completion callback on that thread. At
//! most one worker is outstanding per dispatcher: [`AsyncDispatcher::dispatch`]
//! joins the previous worker before spawning, [`AsyncDispatcher::try_dispatch`]
//! refuses with [`ReaderError::Busy`] instead.

use crate::config::RuntimeSettings;
use crate::constants::async_decode::THREAD_NAME;
use crate::decoder::{Decoded, decode_once};
use crate::engine::DecodeEngine;
use crate::errors::{ReaderError, ReaderResult};
use crate::media::ImageSource;
use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

static NEXT_DISPATCHER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Dispatcher whose worker is the current thread, if any
    static OWNING_DISPATCHER: Cell<u64> = const { Cell::new(0) };
}

/// Owns the outstanding async decode worker, if any
pub struct AsyncDispatcher {
    id: u64,
    /// Serializes dispatch and wait calls
    dispatch_lock: Mutex<()>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Default for AsyncDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl AsyncDispatcher {
    pub fn new() -> Self {
        Self {
            id: NEXT_DISPATCHER_ID.fetch_add(1, Ordering::Relaxed),
            dispatch_lock: Mutex::new(()),
            worker: Mutex::new(None),
        }
    }

    /// Spawn a worker, first waiting for any outstanding one
    ///
    /// Fails with [`ReaderError::Busy`] when called from the worker's own
    /// completion callback, which cannot wait for itself.
    pub fn dispatch<F>(
        &self,
        engine: Arc<dyn DecodeEngine>,
        source: ImageSource,
        settings: Arc<RuntimeSettings>,
        on_complete: F,
    ) -> ReaderResult<()>
    where
        F: FnOnce(ReaderResult<Decoded>) + Send + 'static,
    {
        self.refuse_from_worker()?;
        let _dispatch = lock(&self.dispatch_lock);

        let previous = lock(&self.worker).take();
        if let Some(handle) = previous {
            debug!("Waiting for previous async decode");
            join_worker(handle);
        }

        self.spawn(engine, source, settings, on_complete)
    }

    /// Spawn a worker unless one is still running
    pub fn try_dispatch<F>(
        &self,
        engine: Arc<dyn DecodeEngine>,
        source: ImageSource,
        settings: Arc<RuntimeSettings>,
        on_complete: F,
    ) -> ReaderResult<()>
    where
        F: FnOnce(ReaderResult<Decoded>) + Send + 'static,
    {
        self.refuse_from_worker()?;
        let _dispatch = self
            .dispatch_lock
            .try_lock()
            .map_err(|_| ReaderError::Busy)?;

        let finished = {
            let mut worker = lock(&self.worker);
            match worker.as_ref() {
                Some(handle) if !handle.is_finished() => return Err(ReaderError::Busy),
                _ => worker.take(),
            }
        };
        if let Some(handle) = finished {
            join_worker(handle);
        }

        self.spawn(engine, source, settings, on_complete)
    }

    /// Whether a worker is still decoding or running its callback
    pub fn is_busy(&self) -> bool {
        lock(&self.worker)
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Join the outstanding worker, if any
    pub fn wait(&self) -> ReaderResult<()> {
        self.refuse_from_worker()?;
        let _dispatch = lock(&self.dispatch_lock);
        let previous = lock(&self.worker).take();
        if let Some(handle) = previous {
            join_worker(handle);
        }
        Ok(())
    }

    fn refuse_from_worker(&self) -> ReaderResult<()> {
        if OWNING_DISPATCHER.with(Cell::get) == self.id {
            warn!("Async decode requested from its own completion callback");
            return Err(ReaderError::Busy);
        }
        Ok(())
    }

    fn spawn<F>(
        &self,
        engine: Arc<dyn DecodeEngine>,
        source: ImageSource,
        settings: Arc<RuntimeSettings>,
        on_complete: F,
    ) -> ReaderResult<()>
    where
        F: FnOnce(ReaderResult<Decoded>) + Send + 'static,
    {
        debug!(source = %source.describe(), "Dispatching async decode");

        let id = self.id;
        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                OWNING_DISPATCHER.with(|owner| owner.set(id));
                let outcome = decode_once(engine.as_ref(), &source, &settings);
                on_complete(outcome);
            })
            .map_err(|e| ReaderError::Resource(format!("failed to spawn async decode: {}", e)))?;

        *lock(&self.worker) = Some(handle);
        Ok(())
    }
}

impl Drop for AsyncDispatcher {
    fn drop(&mut self) {
        let worker = self
            .worker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = worker {
            if handle.thread().id() == thread::current().id() {
                // Dropped from its own callback; the thread ends on its own
                return;
            }
            debug!("AsyncDispatcher dropped, waiting for worker");
            join_worker(handle);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn join_worker(handle: JoinHandle<()>) {
    if let Err(e) = handle.join() {
        warn!("Async decode worker panicked: {:?}", e);
    }
}
