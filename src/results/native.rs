// SPDX-License-Identifier: GPL-3.0-only

//! Engine-owned result arrays and their release
//!
//! An engine hands back a [`NativeResultArray`] that must be returned to
//! [`DecodeEngine::free_results`] exactly once. [`ResultArrayGuard`] ties
//! the array to the engine that allocated it and releases it on drop, so
//! every exit path (success, error status, conversion failure, panic
//! unwinding) frees the array.

use super::{Point, Quadrilateral, SymbolResult, TextEncoding};
use crate::engine::DecodeEngine;
use crate::errors::{ReaderError, ReaderResult};
use tracing::trace;

/// One result as reported by an engine, before text conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTextResult {
    pub format: String,
    pub bytes: Vec<u8>,
    /// Corners in the engine's own order
    pub corners: [Point; 4],
    pub confidence: Option<u32>,
}

/// Result array allocated by an engine
///
/// Not `Clone`: each array is released once through the engine that
/// produced it.
#[derive(Debug, PartialEq, Eq)]
pub struct NativeResultArray {
    /// Engine-assigned allocation id
    pub id: u64,
    pub results: Vec<RawTextResult>,
}

impl NativeResultArray {
    pub fn new(id: u64, results: Vec<RawTextResult>) -> Self {
        Self { id, results }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Owns a native result array until it is converted or dropped
pub struct ResultArrayGuard<'e> {
    engine: &'e dyn DecodeEngine,
    array: Option<NativeResultArray>,
}

impl<'e> ResultArrayGuard<'e> {
    pub fn new(engine: &'e dyn DecodeEngine, array: NativeResultArray) -> Self {
        Self {
            engine,
            array: Some(array),
        }
    }

    /// Number of results held
    pub fn len(&self) -> usize {
        self.array.as_ref().map(NativeResultArray::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convert every result, then release the array
    ///
    /// The array is released whether or not conversion succeeds.
    pub fn convert(self, encoding: TextEncoding) -> ReaderResult<Vec<SymbolResult>> {
        let Some(array) = self.array.as_ref() else {
            return Ok(Vec::new());
        };

        array
            .results
            .iter()
            .enumerate()
            .map(|(index, raw)| {
                let text = encoding
                    .decode(&raw.bytes)
                    .ok_or(ReaderError::TextEncoding { index, encoding })?;
                Ok(SymbolResult {
                    format: raw.format.clone(),
                    bytes: raw.bytes.clone(),
                    text,
                    location: Quadrilateral::new(raw.corners).normalized(),
                    confidence: raw.confidence,
                })
            })
            .collect()
        // `self` drops here and frees the array
    }
}

impl Drop for ResultArrayGuard<'_> {
    fn drop(&mut self) {
        if let Some(array) = self.array.take() {
            trace!(
                engine = self.engine.name(),
                id = array.id,
                count = array.len(),
                "Releasing result array"
            );
            self.engine.free_results(array);
        }
    }
}
