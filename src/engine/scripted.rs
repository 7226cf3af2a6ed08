// SPDX-License-Identifier: GPL-3.0-only

//! Deterministic decode engine
//!
//! [`ScriptedEngine`] replays a queue of scripted outcomes, one per decode
//! call, and keeps allocation bookkeeping so callers can verify that every
//! result array is released exactly once.

use super::{DecodeEngine, EngineOutput, status};
use crate::config::RuntimeSettings;
use crate::media::ImageSource;
use crate::results::Point;
use crate::results::native::{NativeResultArray, RawTextResult};
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// What a scripted decode call returns
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptOutcome {
    /// Success with the given results (possibly none)
    Results(Vec<RawTextResult>),
    /// Error status without results
    Failure(i32),
    /// Error status with partial results that still need releasing
    FailureWithResults(i32, Vec<RawTextResult>),
    /// One result whose text is the first byte of a raw image, in decimal
    Echo,
}

/// One scripted decode call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptStep {
    pub outcome: ScriptOutcome,
    /// Time spent "decoding" before returning
    pub delay: Duration,
}

impl ScriptStep {
    pub fn new(outcome: ScriptOutcome) -> Self {
        Self {
            outcome,
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// A decode call as observed by the engine
#[derive(Debug, Clone)]
pub struct DecodeCall {
    pub source: ImageSource,
    pub settings: RuntimeSettings,
    /// Name of the thread the call ran on
    pub thread: Option<String>,
}

#[derive(Default)]
struct ScriptState {
    steps: VecDeque<ScriptStep>,
    calls: Vec<DecodeCall>,
    live: HashSet<u64>,
    frees: u64,
    double_frees: u64,
}

/// Engine that replays scripted outcomes
pub struct ScriptedEngine {
    state: Mutex<ScriptState>,
    fallback: ScriptStep,
    next_id: AtomicU64,
    allocations: AtomicU64,
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedEngine {
    /// Engine that returns zero results once the script runs out
    pub fn new() -> Self {
        Self::with_fallback(ScriptStep::new(ScriptOutcome::Results(Vec::new())))
    }

    /// Engine that returns `fallback` once the script runs out
    pub fn with_fallback(fallback: ScriptStep) -> Self {
        Self {
            state: Mutex::new(ScriptState::default()),
            fallback,
            next_id: AtomicU64::new(1),
            allocations: AtomicU64::new(0),
        }
    }

    /// Append a step to the script
    pub fn push(&self, step: ScriptStep) {
        self.lock().steps.push_back(step);
    }

    /// Append a successful step returning `results`
    pub fn push_results(&self, results: Vec<RawTextResult>) {
        self.push(ScriptStep::new(ScriptOutcome::Results(results)));
    }

    /// Append a failing step returning `code`
    pub fn push_failure(&self, code: i32) {
        self.push(ScriptStep::new(ScriptOutcome::Failure(code)));
    }

    /// Allocate a tracked result array
    pub fn allocate(&self, results: Vec<RawTextResult>) -> NativeResultArray {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.allocations.fetch_add(1, Ordering::SeqCst);
        self.lock().live.insert(id);
        NativeResultArray::new(id, results)
    }

    /// Number of result arrays allocated so far
    pub fn allocations(&self) -> u64 {
        self.allocations.load(Ordering::SeqCst)
    }

    /// Number of successful releases
    pub fn frees(&self) -> u64 {
        self.lock().frees
    }

    /// Arrays allocated but not yet released
    pub fn outstanding(&self) -> usize {
        self.lock().live.len()
    }

    /// Releases of arrays that were not live
    pub fn double_frees(&self) -> u64 {
        self.lock().double_frees
    }

    /// Every decode call so far, in call order
    pub fn calls(&self) -> Vec<DecodeCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        // Bookkeeping stays usable after a panicking test thread
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A result covering a 10x10 square at the origin
pub fn sample_result(format: &str, bytes: &[u8]) -> RawTextResult {
    RawTextResult {
        format: format.to_string(),
        bytes: bytes.to_vec(),
        corners: [
            Point::new(0, 0),
            Point::new(10, 0),
            Point::new(10, 10),
            Point::new(0, 10),
        ],
        confidence: Some(100),
    }
}

fn echo(source: &ImageSource) -> RawTextResult {
    let text = match source {
        ImageSource::Raw(raw) => raw
            .data
            .first()
            .map(|b| b.to_string())
            .unwrap_or_default(),
        other => other.kind().to_string(),
    };
    sample_result("QR_CODE", text.as_bytes())
}

impl DecodeEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    fn decode(&self, source: &ImageSource, settings: &RuntimeSettings) -> EngineOutput {
        let step = {
            let mut state = self.lock();
            state.calls.push(DecodeCall {
                source: source.clone(),
                settings: settings.clone(),
                thread: thread::current().name().map(str::to_string),
            });
            state.steps.pop_front()
        }
        .unwrap_or_else(|| self.fallback.clone());

        if !step.delay.is_zero() {
            thread::sleep(step.delay);
        }

        debug!(source = %source.describe(), outcome = ?step.outcome, "Scripted decode");

        match step.outcome {
            ScriptOutcome::Results(results) => EngineOutput::success(self.allocate(results)),
            ScriptOutcome::Failure(code) => EngineOutput::failure(code),
            ScriptOutcome::FailureWithResults(code, results) => {
                EngineOutput::partial(code, self.allocate(results))
            }
            ScriptOutcome::Echo => EngineOutput::success(self.allocate(vec![echo(source)])),
        }
    }

    fn free_results(&self, results: NativeResultArray) {
        let mut state = self.lock();
        if state.live.remove(&results.id) {
            state.frees += 1;
        } else {
            warn!(id = results.id, "Result array released twice");
            state.double_frees += 1;
        }
    }

    fn error_string(&self, code: i32) -> String {
        format!("[scripted] {}", status::error_string(code))
    }
}
