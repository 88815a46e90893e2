// SPDX-License-Identifier: PMPL-1.0-or-later
//! Error correlation cache.
//!
//! Transaction functions cannot return structured errors through the store:
//! a rejected invocation records its [`RepositoryError`] here under the
//! transaction id and returns an empty write set. The submitting caller
//! takes the entry after the commit and re-raises it.
//!
//! Entries nobody collects (the caller timed out, or crashed) age out after
//! the TTL; the cache also never holds more than `max_entries`, dropping the
//! oldest first.
//!
//! Defaults:
//! - max_entries: 10000
//! - ttl_ms: 60000

use eavmeta_model::RepositoryError;
use eavmeta_store::TxId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorCacheConfig {
    /// Upper bound on uncollected entries.
    pub max_entries: usize,
    /// Age after which an uncollected entry is discarded, in milliseconds.
    pub ttl_ms: u64,
}

impl ErrorCacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

impl Default for ErrorCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            ttl_ms: 60_000,
        }
    }
}

/// Counters since creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCacheStats {
    pub recorded: u64,
    pub taken: u64,
    pub expired: u64,
    pub overflowed: u64,
}

struct Entry {
    error: RepositoryError,
    recorded_at: Instant,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<TxId, Entry>,
    /// Insertion order, oldest first.
    order: VecDeque<TxId>,
}

pub struct ErrorCorrelationCache {
    config: ErrorCacheConfig,
    inner: Mutex<Inner>,
    recorded: AtomicU64,
    taken: AtomicU64,
    expired: AtomicU64,
    overflowed: AtomicU64,
}

impl ErrorCorrelationCache {
    pub fn new(config: ErrorCacheConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner::default()),
            recorded: AtomicU64::new(0),
            taken: AtomicU64::new(0),
            expired: AtomicU64::new(0),
            overflowed: AtomicU64::new(0),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ErrorCacheConfig::default())
    }

    // A panic while holding the lock leaves the maps consistent; recover.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store the error raised by the function running as `tx`.
    pub fn record(&self, tx: TxId, error: RepositoryError) {
        let mut inner = self.lock();
        self.expire(&mut inner);

        debug!(tx = %tx, kind = error.kind().as_str(), "error recorded for transaction");
        let previous = inner.entries.insert(
            tx,
            Entry {
                error,
                recorded_at: Instant::now(),
            },
        );
        if previous.is_none() {
            inner.order.push_back(tx);
        }
        self.recorded.fetch_add(1, Ordering::Relaxed);

        while inner.entries.len() > self.config.max_entries {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            if inner.entries.remove(&oldest).is_some() {
                warn!(tx = %oldest, "error cache full, dropping uncollected error");
                self.overflowed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Remove and return the error recorded for `tx`, if any.
    pub fn take(&self, tx: TxId) -> Option<RepositoryError> {
        let mut inner = self.lock();
        self.expire(&mut inner);
        let entry = inner.entries.remove(&tx)?;
        inner.order.retain(|t| *t != tx);
        self.taken.fetch_add(1, Ordering::Relaxed);
        Some(entry.error)
    }

    fn expire(&self, inner: &mut Inner) {
        let ttl = self.config.ttl();
        while let Some(oldest) = inner.order.front().copied() {
            match inner.entries.get(&oldest) {
                Some(entry) if entry.recorded_at.elapsed() < ttl => break,
                Some(_) => {
                    inner.entries.remove(&oldest);
                    self.expired.fetch_add(1, Ordering::Relaxed);
                }
                None => {}
            }
            inner.order.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> ErrorCacheStats {
        ErrorCacheStats {
            recorded: self.recorded.load(Ordering::Relaxed),
            taken: self.taken.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            overflowed: self.overflowed.load(Ordering::Relaxed),
        }
    }
}

impl Default for ErrorCorrelationCache {
    fn default() -> Self {
        Self::with_defaults()
    }
}
