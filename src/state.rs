//! Watermark Store
//!
//! `(stream, player) → last fully synced date`, shared by every worker of a
//! run. Seeded from the prior run's state and snapshotted into every STATE
//! message.

use crate::error::TapError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Watermarks grouped by stream, then player
pub type StateValue = BTreeMap<String, BTreeMap<String, String>>;

/// Persisted checkpoint (`{"value": {...}}`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub value: StateValue,
}

#[derive(Deserialize)]
struct WrappedState {
    value: StateValue,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StateFile {
    Wrapped(WrappedState),
    Bare(StateValue),
}

impl State {
    /// Parse a state document: either `{"value": {...}}` (a STATE message
    /// line also matches) or the bare stream map.
    pub fn from_json(contents: &str) -> Result<Self, TapError> {
        match serde_json::from_str::<StateFile>(contents) {
            Ok(StateFile::Wrapped(WrappedState { value })) => Ok(State { value }),
            Ok(StateFile::Bare(value)) => Ok(State { value }),
            Err(e) => Err(TapError::State(e.to_string())),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, TapError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| TapError::State(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&contents)
    }
}

/// Mutex-guarded watermark map
#[derive(Debug, Default)]
pub struct WatermarkStore {
    inner: Mutex<StateValue>,
}

impl WatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: State) -> Self {
        WatermarkStore {
            inner: Mutex::new(state.value),
        }
    }

    pub fn get(&self, stream: &str, player: &str) -> Option<String> {
        self.inner
            .lock()
            .get(stream)
            .and_then(|players| players.get(player))
            .cloned()
    }

    pub fn set(&self, stream: &str, player: &str, date: &str) {
        self.inner
            .lock()
            .entry(stream.to_string())
            .or_default()
            .insert(player.to_string(), date.to_string());
    }

    /// Copy of the whole map
    pub fn snapshot(&self) -> StateValue {
        self.inner.lock().clone()
    }

    /// Set then snapshot under one lock acquisition
    pub fn set_and_snapshot(&self, stream: &str, player: &str, date: &str) -> StateValue {
        let mut inner = self.inner.lock();
        inner
            .entry(stream.to_string())
            .or_default()
            .insert(player.to_string(), date.to_string());
        inner.clone()
    }
}
