// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Metrics-collecting wrapper for EAV stores.
//
// Wraps any `EavStore` and transparently counts queries, transactions and
// snapshot handles, and sums query latency. A non-zero
// `snapshots_opened - snapshots_released` after a workload means a handle
// leaked.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::backend::EavStore;
use crate::error::StoreError;
use crate::query::{ConstraintQuery, QueryResult};
use crate::snapshot::Snapshot;
use crate::tx::{TransactionFunction, TxId, TxOp, TxOutcome};
use crate::value::{DocId, Document};

/// Accumulated statistics for a store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreStats {
    /// Number of `query` operations performed.
    pub query_count: u64,
    /// Number of queries that returned an error (including timeouts).
    pub query_errors: u64,
    /// Cumulative wall-clock latency of all `query` calls, in milliseconds.
    pub query_latency_sum_ms: f64,
    /// Number of `get` operations performed.
    pub get_count: u64,
    /// Number of transactions submitted.
    pub tx_submitted: u64,
    /// Number of awaited transactions that committed.
    pub tx_committed: u64,
    /// Number of awaited transactions that aborted.
    pub tx_aborted: u64,
    pub snapshots_opened: u64,
    pub snapshots_released: u64,
}

impl StoreStats {
    /// Snapshots opened but not yet released.
    pub fn snapshots_outstanding(&self) -> u64 {
        self.snapshots_opened.saturating_sub(self.snapshots_released)
    }
}

/// A store wrapper that collects operation metrics.
pub struct MetricsStore<S: EavStore> {
    inner: S,
    stats: Arc<RwLock<StoreStats>>,
}

impl<S: EavStore> MetricsStore<S> {
    /// Wrap `inner` with metrics collection.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            stats: Arc::new(RwLock::new(StoreStats::default())),
        }
    }

    /// Return a snapshot of the current statistics.
    pub async fn stats(&self) -> StoreStats {
        self.stats.read().await.clone()
    }

    /// Reset all statistics to zero.
    pub async fn reset_stats(&self) {
        *self.stats.write().await = StoreStats::default();
    }

    /// Return a reference to the inner store.
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: EavStore> EavStore for MetricsStore<S> {
    async fn open_snapshot(&self, as_of: Option<DateTime<Utc>>) -> Result<Snapshot, StoreError> {
        let result = self.inner.open_snapshot(as_of).await;
        if result.is_ok() {
            self.stats.write().await.snapshots_opened += 1;
        }
        result
    }

    async fn release_snapshot(&self, snapshot: Snapshot) -> Result<(), StoreError> {
        let result = self.inner.release_snapshot(snapshot).await;
        if result.is_ok() {
            self.stats.write().await.snapshots_released += 1;
        }
        result
    }

    async fn get(&self, snapshot: &Snapshot, id: &DocId) -> Result<Option<Document>, StoreError> {
        self.stats.write().await.get_count += 1;
        self.inner.get(snapshot, id).await
    }

    async fn query(&self, snapshot: &Snapshot, query: &ConstraintQuery) -> Result<QueryResult, StoreError> {
        let start = Instant::now();
        let result = self.inner.query(snapshot, query).await;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        let mut s = self.stats.write().await;
        s.query_count += 1;
        s.query_latency_sum_ms += elapsed_ms;
        if result.is_err() {
            s.query_errors += 1;
        }
        result
    }

    async fn submit_tx(&self, ops: Vec<TxOp>) -> Result<TxId, StoreError> {
        let result = self.inner.submit_tx(ops).await;
        if result.is_ok() {
            self.stats.write().await.tx_submitted += 1;
        }
        result
    }

    async fn await_commit(&self, tx: TxId, timeout: Duration) -> Result<TxOutcome, StoreError> {
        let result = self.inner.await_commit(tx, timeout).await;
        if let Ok(outcome) = &result {
            let mut s = self.stats.write().await;
            if outcome.committed {
                s.tx_committed += 1;
            } else {
                s.tx_aborted += 1;
            }
        }
        result
    }

    async fn register_function(&self, function: Arc<dyn TransactionFunction>) -> Result<(), StoreError> {
        self.inner.register_function(function).await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryEavStore;
    use crate::query::{Clause, Var};
    use crate::value::EavValue;

    #[tokio::test]
    async fn test_counts_operations() {
        let store = MetricsStore::new(InMemoryEavStore::new());
        let tx = store
            .submit_tx(vec![TxOp::Put(Document::new(DocId::new("e:1")).with("a", EavValue::Int(1)))])
            .await
            .unwrap();
        store.await_commit(tx, Duration::from_secs(1)).await.unwrap();

        let snap = store.open_snapshot(None).await.unwrap();
        let e = Var::new("e");
        let q = ConstraintQuery::find(e.clone()).with_clause(Clause::attr_eq(&e, "a", EavValue::Int(1)));
        assert_eq!(store.query(&snap, &q).await.unwrap().len(), 1);
        store.get(&snap, &DocId::new("e:1")).await.unwrap();
        store.release_snapshot(snap).await.unwrap();

        let stats = store.stats().await;
        assert_eq!(stats.tx_submitted, 1);
        assert_eq!(stats.tx_committed, 1);
        assert_eq!(stats.query_count, 1);
        assert_eq!(stats.get_count, 1);
        assert_eq!(stats.snapshots_outstanding(), 0);
        assert_eq!(store.name(), "in-memory");

        store.reset_stats().await;
        assert_eq!(store.stats().await, StoreStats::default());
    }
}
