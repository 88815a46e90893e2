// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core EAV store trait.
//
// Defines the `EavStore` trait every store implementation must satisfy:
// snapshot-isolated reads and constraint queries, and a serialized
// transaction log whose only writes are full document versions and
// permanent evictions, either direct or produced by named transaction
// functions. Stores are expected to be thread-safe and fully asynchronous.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::error::StoreError;
use crate::query::{ConstraintQuery, QueryResult};
use crate::snapshot::Snapshot;
use crate::tx::{TransactionFunction, TxId, TxOp, TxOutcome};
use crate::value::{DocId, Document};

/// A versioned entity-attribute-value document store.
///
/// Implementations must be safe to share across threads and tokio tasks.
#[async_trait]
pub trait EavStore: Send + Sync {
    /// Open an immutable view of the committed state.
    ///
    /// `None` means "now". A past instant pins the view to the last
    /// transaction committed at or before it.
    async fn open_snapshot(&self, as_of: Option<DateTime<Utc>>) -> Result<Snapshot, StoreError>;

    /// Release a snapshot handle. Releasing an unknown handle is an error.
    async fn release_snapshot(&self, snapshot: Snapshot) -> Result<(), StoreError>;

    /// Fetch one document as seen by `snapshot`.
    ///
    /// Returns `Ok(None)` if the document does not exist in that view.
    async fn get(&self, snapshot: &Snapshot, id: &DocId) -> Result<Option<Document>, StoreError>;

    /// Evaluate a constraint query against `snapshot`.
    async fn query(&self, snapshot: &Snapshot, query: &ConstraintQuery) -> Result<QueryResult, StoreError>;

    /// Submit a transaction to the log and return its id without waiting.
    async fn submit_tx(&self, ops: Vec<TxOp>) -> Result<TxId, StoreError>;

    /// Wait until `tx` has been processed and report its outcome.
    ///
    /// An outcome is reported once. Stores may forget outcomes that are
    /// never claimed, reporting `UnknownTransaction` for them.
    async fn await_commit(&self, tx: TxId, timeout: Duration) -> Result<TxOutcome, StoreError>;

    /// Install a named transaction function.
    async fn register_function(&self, function: Arc<dyn TransactionFunction>) -> Result<(), StoreError>;

    /// A human-readable name for this store, used in logging and metrics.
    fn name(&self) -> &str;
}

#[async_trait]
impl<S: EavStore + ?Sized> EavStore for Arc<S> {
    async fn open_snapshot(&self, as_of: Option<DateTime<Utc>>) -> Result<Snapshot, StoreError> {
        (**self).open_snapshot(as_of).await
    }

    async fn release_snapshot(&self, snapshot: Snapshot) -> Result<(), StoreError> {
        (**self).release_snapshot(snapshot).await
    }

    async fn get(&self, snapshot: &Snapshot, id: &DocId) -> Result<Option<Document>, StoreError> {
        (**self).get(snapshot, id).await
    }

    async fn query(&self, snapshot: &Snapshot, query: &ConstraintQuery) -> Result<QueryResult, StoreError> {
        (**self).query(snapshot, query).await
    }

    async fn submit_tx(&self, ops: Vec<TxOp>) -> Result<TxId, StoreError> {
        (**self).submit_tx(ops).await
    }

    async fn await_commit(&self, tx: TxId, timeout: Duration) -> Result<TxOutcome, StoreError> {
        (**self).await_commit(tx, timeout).await
    }

    async fn register_function(&self, function: Arc<dyn TransactionFunction>) -> Result<(), StoreError> {
        (**self).register_function(function).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
