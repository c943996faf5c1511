//! Named bit-usage accounting for compression diagnostics

use std::collections::BTreeMap;

/// Attributes bits written between checkpoints to caller-supplied labels
#[derive(Debug, Clone, Default)]
pub struct BitUsage {
    checkpoint: u64,
    table: BTreeMap<String, u64>,
}

impl BitUsage {
    pub fn new(position: u64) -> Self {
        Self {
            checkpoint: position,
            table: BTreeMap::new(),
        }
    }

    /// Charge everything since the last checkpoint to `label`
    pub fn account(&mut self, label: &str, position: u64) {
        let bits = position.saturating_sub(self.checkpoint);
        self.checkpoint = position;
        if bits == 0 {
            return;
        }
        match self.table.get_mut(label) {
            Some(total) => *total += bits,
            None => {
                self.table.insert(label.to_string(), bits);
            }
        }
    }

    pub fn get(&self, label: &str) -> u64 {
        self.table.get(label).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.table.values().sum()
    }

    pub fn table(&self) -> &BTreeMap<String, u64> {
        &self.table
    }

    pub fn into_table(self) -> BTreeMap<String, u64> {
        self.table
    }
}
