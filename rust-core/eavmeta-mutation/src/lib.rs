// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// EavMeta Mutation
//
// Every change to the metadata repository runs inside the store as a named
// transaction function. Functions validate against the latest committed
// state, emit a write set, and report rejections through an error
// correlation cache keyed by transaction id. The protocol submits the
// transaction, awaits its outcome and re-raises the typed error.
//
// # Modules
//
// - [`request`] -- `MutationRequest`, the function catalog names and invocation envelope.
// - [`validator`] -- Precondition checks shared by every function.
// - [`context`] -- `MutationContext`: typed reads and writes inside a transaction.
// - [`functions`] -- `CatalogFunction`, one per catalog entry.
// - [`error_cache`] -- `ErrorCorrelationCache`: bounded, TTL-expiring, take-once.
// - [`protocol`] -- `MutationProtocol`: submit, await, resolve.

pub mod context;
pub mod error_cache;
pub mod functions;
pub mod protocol;
pub mod request;
pub mod validator;

pub use context::MutationContext;
pub use error_cache::{ErrorCacheConfig, ErrorCacheStats, ErrorCorrelationCache};
pub use functions::CatalogFunction;
pub use protocol::MutationProtocol;
pub use request::{ClassifyMode, CollectionContext, FunctionName, Invocation, MutationRequest, NewClassification};
