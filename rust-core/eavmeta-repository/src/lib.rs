// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// EavMeta Repository
//
// The caller-facing metadata repository: structured and text searches,
// relationship-graph queries, point reads now or as of a past instant, and
// one entry point per mutation. Every operation returns one result or
// exactly one `RepositoryError`.
//
// # Modules
//
// - [`repository`] -- `MetadataRepository`, search pages and neighborhoods.
// - [`draft`] -- `NewEntity` and `NewRelationship` builders.
// - [`mapper`] -- `ResultMapper`: document references to records via a snapshot.
// - [`config`] -- `RepositoryConfig` and `ConfigError`.
//
// # Example
//
// ```rust
// use eavmeta_model::{PropertyDef, PropertyValue, TypeCategory, TypeDef, TypeSystem};
// use eavmeta_repository::{MetadataRepository, NewEntity, RepositoryConfig};
// use eavmeta_query::{EntitySearch, SearchCondition, SearchProperties};
// use eavmeta_store::InMemoryEavStore;
// use std::sync::Arc;
//
// # tokio::runtime::Runtime::new().unwrap().block_on(async {
// let types = TypeSystem::new(vec![
//     TypeDef::new("g-asset", "Asset", TypeCategory::Entity).with_property(PropertyDef::new("name")),
// ])
// .unwrap();
// let repo = MetadataRepository::open(Arc::new(InMemoryEavStore::new()), Arc::new(types), RepositoryConfig::default())
//     .await
//     .unwrap();
//
// repo.create_entity("alice", NewEntity::of_type("Asset").with_property("name", PropertyValue::string("orders")))
//     .await
//     .unwrap();
//
// let search = EntitySearch {
//     properties: Some(SearchProperties::all(vec![SearchCondition::eq("name", PropertyValue::string("orders"))])),
//     ..EntitySearch::default()
// };
// assert_eq!(repo.find_entities(&search).await.unwrap().records.len(), 1);
// # });
// ```

pub mod config;
pub mod draft;
pub mod mapper;
pub mod repository;

pub use config::{ConfigError, RepositoryConfig};
pub use draft::{NewEntity, NewRelationship};
pub use mapper::ResultMapper;
pub use repository::{EntityNeighborhood, MetadataRepository, SearchPage};
