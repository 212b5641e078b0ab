//! Deadline tracking for in-flight payloads.

use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

/// Tracks one armed deadline per sequence number.
///
/// Entries are ordered by `(deadline, sequence)` so expiry walks only the
/// elapsed prefix.
#[derive(Debug, Default)]
pub struct TimeoutManager {
    by_deadline: BTreeSet<(Instant, u64)>,
    armed: HashMap<u64, Instant>,
}

impl TimeoutManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) the deadline for `sequence`.
    pub fn arm(&mut self, sequence: u64, deadline: Instant) {
        if let Some(old) = self.armed.insert(sequence, deadline) {
            self.by_deadline.remove(&(old, sequence));
        }
        self.by_deadline.insert((deadline, sequence));
    }

    /// Disarm `sequence`. Returns whether it was armed.
    pub fn disarm(&mut self, sequence: u64) -> bool {
        match self.armed.remove(&sequence) {
            Some(deadline) => {
                self.by_deadline.remove(&(deadline, sequence));
                true
            }
            None => false,
        }
    }

    /// Remove and return every sequence whose deadline is at or before `now`,
    /// in ascending sequence order.
    pub fn expire(&mut self, now: Instant) -> Vec<u64> {
        let mut expired = Vec::new();
        while let Some(&(deadline, sequence)) = self.by_deadline.first() {
            if deadline > now {
                break;
            }
            self.by_deadline.pop_first();
            self.armed.remove(&sequence);
            expired.push(sequence);
        }
        expired.sort_unstable();
        expired
    }

    /// Earliest armed deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.by_deadline.first().map(|&(deadline, _)| deadline)
    }

    /// Number of armed deadlines.
    pub fn len(&self) -> usize {
        self.armed.len()
    }

    /// Whether nothing is armed.
    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }
}
