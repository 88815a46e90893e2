// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Transaction operations and named transaction functions.
//
// A transaction is an ordered list of `TxOp`s. `Put` and `Evict` are staged
// directly; `Call` runs a registered `TransactionFunction` against the latest
// committed state plus everything staged earlier in the same transaction, and
// stages the write set it returns. The whole list commits or none of it does.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::engine::{evaluate, DocumentSource};
use crate::error::StoreError;
use crate::query::{ConstraintQuery, QueryResult};
use crate::value::{DocId, Document};

/// Identifier of a submitted transaction, issued in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxId(pub u64);

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx-{}", self.0)
    }
}

/// A primitive write: the only two ways a document ever changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOp {
    /// Store a complete new version of the document.
    Put(Document),
    /// Remove the document and its whole history.
    Evict(DocId),
}

impl WriteOp {
    pub fn doc_id(&self) -> &DocId {
        match self {
            WriteOp::Put(doc) => &doc.id,
            WriteOp::Evict(id) => id,
        }
    }
}

/// One element of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxOp {
    Put(Document),
    Evict(DocId),
    /// Invoke a registered transaction function by name.
    Call {
        function: String,
        args: serde_json::Value,
    },
}

impl From<WriteOp> for TxOp {
    fn from(op: WriteOp) -> Self {
        match op {
            WriteOp::Put(doc) => TxOp::Put(doc),
            WriteOp::Evict(id) => TxOp::Evict(id),
        }
    }
}

/// Final state of a transaction as reported by `await_commit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxOutcome {
    pub tx_id: TxId,
    /// `true` when the write set was applied (possibly empty).
    pub committed: bool,
    /// Transaction time assigned by the store.
    pub tx_time: DateTime<Utc>,
    /// Opaque description of why the transaction aborted.
    pub fault: Option<String>,
    /// Number of primitive writes applied.
    pub writes: usize,
}

/// A failure raised by a transaction function. Aborts the transaction.
///
/// The store only sees the message; structured errors must travel through a
/// side channel keyed by [`TxId`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct FunctionFault(pub String);

impl FunctionFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<StoreError> for FunctionFault {
    fn from(err: StoreError) -> Self {
        Self(err.to_string())
    }
}

/// The view a transaction function runs against.
pub struct TxContext<'a> {
    tx_id: TxId,
    tx_time: DateTime<Utc>,
    source: &'a dyn DocumentSource,
}

impl<'a> TxContext<'a> {
    pub fn new(tx_id: TxId, tx_time: DateTime<Utc>, source: &'a dyn DocumentSource) -> Self {
        Self { tx_id, tx_time, source }
    }

    pub fn tx_id(&self) -> TxId {
        self.tx_id
    }

    /// Time the transaction will commit at.
    pub fn tx_time(&self) -> DateTime<Utc> {
        self.tx_time
    }

    /// Latest version of a document, including writes staged earlier in
    /// this transaction.
    pub fn get(&self, id: &DocId) -> Option<&Document> {
        self.source.document(id)
    }

    /// Run a constraint query over the same view as [`TxContext::get`].
    pub fn query(&self, query: &ConstraintQuery) -> Result<QueryResult, StoreError> {
        evaluate(self.source, query)
    }
}

/// A named function executed inside the store's serialized transaction log.
///
/// Implementations must be deterministic with respect to the context they
/// are given and must not block.
pub trait TransactionFunction: Send + Sync {
    /// Name the function is registered and invoked under.
    fn name(&self) -> &str;

    /// Compute the write set for one invocation.
    fn invoke(&self, ctx: &TxContext<'_>, args: &serde_json::Value) -> Result<Vec<WriteOp>, FunctionFault>;
}
