//! Entry table: the authoritative id → entry mapping.

use crate::traits::MemoryEntry;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct EntryTable {
    entries: BTreeMap<u64, MemoryEntry>,
}

impl EntryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from loaded entries. A repeated id keeps the first record.
    pub fn from_entries(entries: impl IntoIterator<Item = MemoryEntry>) -> Self {
        let mut table = Self::new();
        for entry in entries {
            if table.entries.contains_key(&entry.id) {
                tracing::warn!(id = entry.id, "Duplicate entry id in snapshot, keeping first");
                continue;
            }
            table.entries.insert(entry.id, entry);
        }
        table
    }

    pub fn insert(&mut self, entry: MemoryEntry) {
        self.entries.insert(entry.id, entry);
    }

    pub fn get(&self, id: u64) -> Option<&MemoryEntry> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_id(&self) -> Option<u64> {
        self.entries.keys().next_back().copied()
    }

    /// Entries in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &MemoryEntry> {
        self.entries.values()
    }
}
