//! Recently connected readers.

use crate::models::DeviceEntry;
use serde::{Deserialize, Serialize};

/// How many devices the history keeps.
pub const MAX_HISTORY: usize = 10;

/// Most recent first, at most one entry per address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceHistory {
    entries: Vec<DeviceEntry>,
}

impl DeviceHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put `entry` at the front, replacing any older entry for the same address.
    pub fn record(&mut self, entry: DeviceEntry) {
        self.entries.retain(|e| e.address != entry.address);
        self.entries.insert(0, entry);
        self.entries.truncate(MAX_HISTORY);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[DeviceEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
