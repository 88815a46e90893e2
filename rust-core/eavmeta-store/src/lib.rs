// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// EavMeta Store
//
// The contract of the versioned entity-attribute-value document store the
// metadata layer is built on, plus an in-memory implementation of it.
//
// # Modules
//
// - [`backend`] -- The `EavStore` trait: snapshots, queries, transactions.
// - [`value`] -- `DocId`, `EavValue` and `Document`.
// - [`query`] -- The constraint-query AST.
// - [`engine`] -- Binding-set evaluator for constraint queries.
// - [`tx`] -- Transaction ops, outcomes and the `TransactionFunction` trait.
// - [`snapshot`] -- Snapshot handles and their registry.
// - [`memory`] -- `InMemoryEavStore`, a versioned in-process store.
// - [`metrics`] -- A transparent wrapper that collects operation statistics.
// - [`error`] -- The `StoreError` enum.
//
// # Example
//
// ```rust
// use eavmeta_store::{Clause, ConstraintQuery, DocId, Document, EavStore, EavValue, InMemoryEavStore, TxOp, Var};
// use std::time::Duration;
//
// # tokio::runtime::Runtime::new().unwrap().block_on(async {
// let store = InMemoryEavStore::new();
// let doc = Document::new(DocId::new("e:1")).with("status", EavValue::str("ACTIVE"));
// let tx = store.submit_tx(vec![TxOp::Put(doc)]).await.unwrap();
// assert!(store.await_commit(tx, Duration::from_secs(1)).await.unwrap().committed);
//
// let e = Var::new("e");
// let query = ConstraintQuery::find(e.clone()).with_clause(Clause::attr_eq(&e, "status", EavValue::str("ACTIVE")));
// let snap = store.open_snapshot(None).await.unwrap();
// assert_eq!(store.query(&snap, &query).await.unwrap().len(), 1);
// store.release_snapshot(snap).await.unwrap();
// # });
// ```

pub mod backend;
pub mod engine;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod query;
pub mod snapshot;
pub mod tx;
pub mod value;

pub use backend::EavStore;
pub use engine::{evaluate, DocumentSet, DocumentSource};
pub use error::StoreError;
pub use memory::InMemoryEavStore;
pub use metrics::{MetricsStore, StoreStats};
pub use query::{Clause, CompareOp, ConstraintQuery, Direction, OrderKey, Predicate, QueryResult, Term, Var};
pub use snapshot::Snapshot;
pub use tx::{FunctionFault, TransactionFunction, TxContext, TxId, TxOp, TxOutcome, WriteOp};
pub use value::{DocId, Document, EavValue};
