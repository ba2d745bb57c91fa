//! Store statistics.

use std::sync::atomic::{AtomicU64, Ordering};

use super::ChangeSet;

/// Counters updated on every applied snapshot.
#[derive(Debug, Default)]
pub struct StoreStats {
    applies: AtomicU64,
    noop_applies: AtomicU64,
    added: AtomicU64,
    updated: AtomicU64,
    removed: AtomicU64,
    failed_rows: AtomicU64,
}

impl StoreStats {
    pub(crate) fn record(&self, changes: &ChangeSet, failed_rows: usize) {
        self.applies.fetch_add(1, Ordering::Relaxed);
        if changes.is_empty() {
            self.noop_applies.fetch_add(1, Ordering::Relaxed);
        }
        self.added
            .fetch_add(changes.added.len() as u64, Ordering::Relaxed);
        self.updated
            .fetch_add(changes.updated.len() as u64, Ordering::Relaxed);
        self.removed
            .fetch_add(changes.removed.len() as u64, Ordering::Relaxed);
        self.failed_rows
            .fetch_add(failed_rows as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_eviction(&self, removed: usize) {
        self.removed.fetch_add(removed as u64, Ordering::Relaxed);
    }

    /// Snapshots applied.
    pub fn applies(&self) -> u64 {
        self.applies.load(Ordering::Relaxed)
    }

    /// Snapshots that changed nothing.
    pub fn noop_applies(&self) -> u64 {
        self.noop_applies.load(Ordering::Relaxed)
    }

    /// Ids reported as added.
    pub fn added(&self) -> u64 {
        self.added.load(Ordering::Relaxed)
    }

    /// Ids reported as updated.
    pub fn updated(&self) -> u64 {
        self.updated.load(Ordering::Relaxed)
    }

    /// Ids removed, by snapshot replacement or eviction.
    pub fn removed(&self) -> u64 {
        self.removed.load(Ordering::Relaxed)
    }

    /// Null rows seen across all snapshots.
    pub fn failed_rows(&self) -> u64 {
        self.failed_rows.load(Ordering::Relaxed)
    }
}
