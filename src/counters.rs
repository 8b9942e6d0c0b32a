//! Persisted event counters.
//!
//! Values are restored from a [`CounterStore`] once at boot and written back
//! only after something changed, so the backing medium sees one write per
//! actual change rather than one per cycle.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use heapless::Vec;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub const MAX_COUNTERS: usize = 8;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("counter storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("counter storage is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    pub name: String,
    pub value: u32,
}

pub trait CounterStore: Send {
    /// All persisted counters. An empty medium yields an empty list.
    fn load(&mut self) -> Result<std::vec::Vec<Counter>, StoreError>;

    fn commit(&mut self, counters: &[Counter]) -> Result<(), StoreError>;
}

/// Volatile store; keeps the last committed image in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    image: std::vec::Vec<Counter>,
    commits: u32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values(values: &[(&str, u32)]) -> Self {
        Self {
            image: values
                .iter()
                .map(|&(name, value)| Counter {
                    name: name.to_string(),
                    value,
                })
                .collect(),
            commits: 0,
        }
    }

    pub fn image(&self) -> &[Counter] {
        &self.image
    }

    pub fn commits(&self) -> u32 {
        self.commits
    }
}

impl CounterStore for MemoryStore {
    fn load(&mut self) -> Result<std::vec::Vec<Counter>, StoreError> {
        Ok(self.image.clone())
    }

    fn commit(&mut self, counters: &[Counter]) -> Result<(), StoreError> {
        self.image = counters.to_vec();
        self.commits += 1;
        Ok(())
    }
}

/// JSON file store used by the simulator. A missing file is an empty store.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CounterStore for JsonFileStore {
    fn load(&mut self) -> Result<std::vec::Vec<Counter>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(std::vec::Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn commit(&mut self, counters: &[Counter]) -> Result<(), StoreError> {
        let text = serde_json::to_string_pretty(counters)?;
        let staging = self.path.with_extension("tmp");
        fs::write(&staging, text)?;
        fs::rename(&staging, &self.path)?;
        Ok(())
    }
}

pub struct Counters {
    store: Box<dyn CounterStore>,
    entries: Vec<Counter, MAX_COUNTERS>,
    dirty: bool,
    /// Set once a load succeeded. Until then `entries` only holds counts
    /// taken since boot, which must never reach the store on their own.
    restored: bool,
}

impl Counters {
    pub fn new(store: Box<dyn CounterStore>) -> Self {
        Self {
            store,
            entries: Vec::new(),
            dirty: false,
            restored: false,
        }
    }

    /// Counters without a backing medium.
    pub fn volatile() -> Self {
        Self::new(Box::new(MemoryStore::new()))
    }

    /// Loads persisted values. Must run before the first control cycle.
    /// On a storage error the load is retried before the next commit, and
    /// the counts taken meanwhile are added on top of what it returns.
    pub fn restore(&mut self) -> Result<(), StoreError> {
        self.entries.clear();
        self.dirty = false;
        self.restored = false;
        self.absorb_persisted()
    }

    /// Whether the persisted values have been loaded.
    pub fn is_restored(&self) -> bool {
        self.restored
    }

    pub fn get(&self, name: &str) -> u32 {
        self.entries
            .iter()
            .find(|c| c.name == name)
            .map_or(0, |c| c.value)
    }

    /// Bumps `name`, creating it on first use. Returns the new value, or
    /// `None` when the table is full and `name` is new.
    pub fn increment(&mut self, name: &str) -> Option<u32> {
        let value = if let Some(counter) = self.entries.iter_mut().find(|c| c.name == name) {
            counter.value = counter.value.wrapping_add(1);
            counter.value
        } else {
            let counter = Counter {
                name: name.to_string(),
                value: 1,
            };
            if self.entries.push(counter).is_err() {
                warn!(counter = name, "no room for another counter");
                return None;
            }
            1
        };
        self.dirty = true;
        Some(value)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Writes through to the store only if a value changed since the last
    /// successful commit. Returns whether a commit happened.
    pub fn commit_if_dirty(&mut self) -> Result<bool, StoreError> {
        if !self.dirty {
            return Ok(false);
        }
        if !self.restored {
            self.absorb_persisted()?;
        }
        self.store.commit(&self.entries)?;
        self.dirty = false;
        debug!(count = self.entries.len(), "counters committed");
        Ok(true)
    }

    pub fn entries(&self) -> &[Counter] {
        &self.entries
    }

    /// Adds the persisted values to the in-memory ones.
    fn absorb_persisted(&mut self) -> Result<(), StoreError> {
        let loaded = self.store.load()?;
        for counter in loaded {
            if let Some(entry) = self.entries.iter_mut().find(|c| c.name == counter.name) {
                entry.value = entry.value.wrapping_add(counter.value);
            } else if self.entries.push(counter).is_err() {
                warn!(limit = MAX_COUNTERS, "persisted counters truncated");
                break;
            }
        }
        self.restored = true;
        debug!(count = self.entries.len(), "counters restored");
        Ok(())
    }
}

impl core::fmt::Debug for Counters {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Counters")
            .field("entries", &self.entries)
            .field("dirty", &self.dirty)
            .field("restored", &self.restored)
            .finish_non_exhaustive()
    }
}
