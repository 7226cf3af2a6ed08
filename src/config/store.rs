// SPDX-License-Identifier: GPL-3.0-only

//! Settings store with atomic snapshot swaps
//!
//! The store remembers which keys were set explicitly. Effective settings
//! are rebuilt from the defaults plus those keys on every change and only
//! swapped in once they parse and validate, so a failed update leaves the
//! store untouched. Readers receive an `Arc` snapshot that later updates
//! never mutate.

use super::RuntimeSettings;
use crate::errors::{ReaderError, ReaderResult};
use serde_json::{Map, Value};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// How an update treats keys that were already set explicitly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Keep the existing explicit value
    Ignore,
    /// The new value wins
    #[default]
    Overwrite,
}

struct StoreState {
    explicit: Map<String, Value>,
    current: Arc<RuntimeSettings>,
}

/// Holds the active decode configuration of one reader
pub struct SettingsStore {
    state: RwLock<StoreState>,
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_object(text: &str) -> ReaderResult<Map<String, Value>> {
    match serde_json::from_str::<Value>(text)? {
        Value::Object(map) => Ok(map),
        other => Err(ReaderError::Configuration(format!(
            "settings must be a JSON object, got {}",
            match other {
                Value::Null => "null",
                Value::Bool(_) => "a boolean",
                Value::Number(_) => "a number",
                Value::String(_) => "a string",
                Value::Array(_) => "an array",
                Value::Object(_) => "an object",
            }
        ))),
    }
}

fn to_object(settings: &RuntimeSettings) -> ReaderResult<Map<String, Value>> {
    match serde_json::to_value(settings)? {
        Value::Object(map) => Ok(map),
        _ => Err(ReaderError::Configuration(
            "settings did not serialize to an object".to_string(),
        )),
    }
}

/// Defaults overlaid with the explicit keys, parsed and validated
fn build(explicit: &Map<String, Value>) -> ReaderResult<RuntimeSettings> {
    let mut merged = to_object(&RuntimeSettings::default())?;
    for (key, value) in explicit {
        merged.insert(key.clone(), value.clone());
    }
    let settings: RuntimeSettings = serde_json::from_value(Value::Object(merged))?;
    settings.validate()?;
    Ok(settings)
}

impl SettingsStore {
    /// Store holding the default settings
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState {
                explicit: Map::new(),
                current: Arc::new(RuntimeSettings::default()),
            }),
        }
    }

    /// Snapshot of the active settings
    pub fn get(&self) -> Arc<RuntimeSettings> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&state.current)
    }

    /// Merge a partial JSON object into the active settings
    pub fn update(&self, text: &str, policy: ConflictPolicy) -> ReaderResult<()> {
        let partial = parse_object(text)?;
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        // Every incoming key must be valid, even the ones Ignore will skip
        if policy == ConflictPolicy::Ignore {
            let mut incoming = state.explicit.clone();
            incoming.extend(partial.clone());
            build(&incoming)?;
        }

        let mut explicit = state.explicit.clone();
        let mut kept = 0usize;
        for (key, value) in partial {
            if policy == ConflictPolicy::Ignore && explicit.contains_key(&key) {
                kept += 1;
                continue;
            }
            explicit.insert(key, value);
        }

        let settings = build(&explicit)?;
        debug!(?policy, kept, explicit = explicit.len(), "Settings updated");
        state.explicit = explicit;
        state.current = Arc::new(settings);
        Ok(())
    }

    /// Reset to defaults and apply a JSON object wholesale
    pub fn replace(&self, text: &str) -> ReaderResult<()> {
        let explicit = parse_object(text)?;
        let settings = build(&explicit)?;

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        debug!(explicit = explicit.len(), "Settings replaced");
        state.explicit = explicit;
        state.current = Arc::new(settings);
        Ok(())
    }

    /// Apply a change to a copy of the active settings
    ///
    /// Fields whose value changed become explicitly set.
    pub fn modify<F>(&self, change: F) -> ReaderResult<()>
    where
        F: FnOnce(&mut RuntimeSettings),
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        let mut settings = (*state.current).clone();
        change(&mut settings);
        settings.validate()?;

        let before = to_object(&state.current)?;
        let after = to_object(&settings)?;
        for (key, value) in after {
            if before.get(&key) != Some(&value) {
                state.explicit.insert(key, value);
            }
        }
        state.current = Arc::new(settings);
        Ok(())
    }

    /// Drop every explicit key
    pub fn reset(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.explicit.clear();
        state.current = Arc::new(RuntimeSettings::default());
    }

    /// Pretty JSON of the full effective settings
    pub fn to_json(&self) -> ReaderResult<String> {
        self.get().to_json()
    }

    /// Keys set explicitly, sorted
    pub fn explicit_keys(&self) -> Vec<String> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<String> = state.explicit.keys().cloned().collect();
        keys.sort();
        keys
    }
}
