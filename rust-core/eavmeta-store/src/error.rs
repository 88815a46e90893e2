// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Store error types for the EAV document store.
//
// One enum covers every failure an `EavStore` may report: malformed constraint
// programs, query timeouts, snapshot misuse, unknown transactions and
// transaction functions, and backend unavailability.

use thiserror::Error;

use crate::tx::TxId;

/// Errors that can occur when interacting with an EAV store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The constraint program is malformed (unbound predicate variable,
    /// invalid regex, ...).
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Query evaluation exceeded its deadline.
    #[error("query timed out after {elapsed_ms} ms (limit: {limit_ms} ms)")]
    Timeout {
        /// Time spent before giving up, in milliseconds.
        elapsed_ms: u64,
        /// Configured limit, in milliseconds.
        limit_ms: u64,
    },

    /// The snapshot handle is unknown or was already released.
    #[error("snapshot {0} is not open")]
    SnapshotClosed(u64),

    /// The transaction id was never issued by this store.
    #[error("unknown transaction: {0}")]
    UnknownTransaction(TxId),

    /// Waiting for a transaction outcome exceeded the caller's limit.
    #[error("timed out waiting for commit of {0}")]
    CommitTimeout(TxId),

    /// A transaction function with the same name is already registered.
    #[error("transaction function already registered: {0}")]
    DuplicateFunction(String),

    /// The store is not available (e.g., shut down, lock poisoned).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
