// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// EavMeta Query
//
// Turns structured search specifications into constraint queries against
// the EAV store, and answers reachability questions over relationships.
//
// # Modules
//
// - [`condition`] -- Search condition trees, type and status filters, search specs.
// - [`compiler`] -- `ConditionCompiler`: condition trees to constraint clauses.
// - [`sequencing`] -- Deterministic ordering and offset/limit paging.
// - [`graph`] -- `GraphEngine`: bounded breadth-first closure plus filtering.
// - [`config`] -- Timeouts and ceilings.
// - [`error`] -- `QueryError`.

pub mod compiler;
pub mod condition;
pub mod config;
pub mod error;
pub mod graph;
pub mod sequencing;

pub use compiler::{CompiledQuery, ConditionCompiler, Diagnostic};
pub use condition::{
    ClassificationCondition, Comparator, EntitySearch, GraphQuery, MatchCriteria, PropertyCondition,
    RelationshipSearch, SearchClassifications, SearchCondition, SearchProperties, StatusFilter, TypeFilter,
};
pub use config::QueryConfig;
pub use error::QueryError;
pub use graph::{Edge, GraphEngine, Neighborhood, Traversal};
pub use sequencing::{Paging, SequencingOrder};
