// SPDX-License-Identifier: PMPL-1.0-or-later
//! Read snapshots.
//!
//! A snapshot pins the committed state as of one transaction. Handles are
//! not `Clone`: releasing consumes the handle, so a released
//! snapshot cannot be used again by safe code that owns it.
//!
//! Besides its basis, every open snapshot records its horizon: the last
//! transaction committed when it was opened. Evictions committed after the
//! horizon stay invisible to it, and stores keep evicted history until no
//! open snapshot has a horizon below the evicting transaction.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::error::StoreError;

/// An open, immutable view of the store.
#[derive(Debug, PartialEq, Eq)]
pub struct Snapshot {
    id: u64,
    basis: u64,
    as_of: DateTime<Utc>,
}

impl Snapshot {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Number of the last transaction visible through this snapshot
    /// (0 when nothing had committed yet).
    pub fn basis(&self) -> u64 {
        self.basis
    }

    /// Instant the snapshot was requested for.
    pub fn as_of(&self) -> DateTime<Utc> {
        self.as_of
    }
}

/// Transactions an open snapshot is pinned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pin {
    /// Last transaction whose writes are visible.
    pub basis: u64,
    /// Last transaction committed when the snapshot was opened.
    pub horizon: u64,
}

/// Bookkeeping of open snapshots, shared by store implementations.
#[derive(Debug, Default)]
pub struct SnapshotRegistry {
    next_id: AtomicU64,
    open: Mutex<HashMap<u64, Pin>>,
}

impl SnapshotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new snapshot. `basis` never exceeds `horizon`.
    pub fn open(&self, basis: u64, horizon: u64, as_of: DateTime<Utc>) -> Result<Snapshot, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let pin = Pin { basis: basis.min(horizon), horizon };
        self.open
            .lock()
            .map_err(|_| StoreError::Unavailable("snapshot registry lock poisoned".into()))?
            .insert(id, pin);
        Ok(Snapshot { id, basis: pin.basis, as_of })
    }

    /// Check that a handle is still open and return its pin.
    pub fn pin_of(&self, snapshot: &Snapshot) -> Result<Pin, StoreError> {
        self.open
            .lock()
            .map_err(|_| StoreError::Unavailable("snapshot registry lock poisoned".into()))?
            .get(&snapshot.id)
            .copied()
            .ok_or(StoreError::SnapshotClosed(snapshot.id))
    }

    /// Lowest horizon among open snapshots, `None` when none are open.
    pub fn oldest_horizon(&self) -> Result<Option<u64>, StoreError> {
        Ok(self
            .open
            .lock()
            .map_err(|_| StoreError::Unavailable("snapshot registry lock poisoned".into()))?
            .values()
            .map(|pin| pin.horizon)
            .min())
    }

    pub fn release(&self, snapshot: Snapshot) -> Result<(), StoreError> {
        self.open
            .lock()
            .map_err(|_| StoreError::Unavailable("snapshot registry lock poisoned".into()))?
            .remove(&snapshot.id)
            .map(|_| ())
            .ok_or(StoreError::SnapshotClosed(snapshot.id))
    }

    pub fn open_count(&self) -> usize {
        self.open.lock().map(|m| m.len()).unwrap_or(0)
    }

    /// Build a handle that was never registered. Used by tests of release
    /// error paths.
    #[cfg(test)]
    pub(crate) fn forged(id: u64) -> Snapshot {
        Snapshot { id, basis: 0, as_of: Utc::now() }
    }
}
