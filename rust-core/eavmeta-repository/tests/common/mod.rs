// SPDX-License-Identifier: PMPL-1.0-or-later
//! Shared fixtures for the repository integration tests

#![allow(dead_code)]

use eavmeta_model::{
    EntityRecord, InstanceProperties, PropertyDef, PropertyValue, StorageMapper, TypeCategory, TypeDef, TypeSystem,
};
use eavmeta_repository::{MetadataRepository, NewEntity, NewRelationship, RepositoryConfig};
use eavmeta_store::{InMemoryEavStore, MetricsStore};
use std::sync::{Arc, Once};

pub const HOME: &str = "cohort-home";
pub const REMOTE: &str = "cohort-remote";

static TRACING: Once = Once::new();

/// Route `tracing` output through the test harness. `RUST_LOG` applies.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Referenceable <- Asset <- {Table, Column}; Person; Uses/Owns; two
/// classifications.
pub fn types() -> Arc<TypeSystem> {
    Arc::new(
        TypeSystem::new(vec![
            TypeDef::new("g-ref", "Referenceable", TypeCategory::Entity)
                .with_property(PropertyDef::unique("qualifiedName")),
            TypeDef::new("g-asset", "Asset", TypeCategory::Entity)
                .with_supertype("Referenceable")
                .with_property(PropertyDef::new("name"))
                .with_property(PropertyDef::new("owner")),
            TypeDef::new("g-table", "Table", TypeCategory::Entity)
                .with_supertype("Asset")
                .with_property(PropertyDef::new("rows")),
            TypeDef::new("g-column", "Column", TypeCategory::Entity)
                .with_supertype("Asset")
                .with_property(PropertyDef::new("rows")),
            TypeDef::new("g-person", "Person", TypeCategory::Entity)
                .with_supertype("Referenceable")
                .with_property(PropertyDef::new("name")),
            TypeDef::new("g-uses", "Uses", TypeCategory::Relationship).with_property(PropertyDef::new("since")),
            TypeDef::new("g-owns", "Owns", TypeCategory::Relationship),
            TypeDef::new("g-conf", "Confidential", TypeCategory::Classification)
                .with_property(PropertyDef::new("level"))
                .with_valid_entity_type("Asset"),
            TypeDef::new("g-pii", "PII", TypeCategory::Classification),
        ])
        .unwrap(),
    )
}

pub fn config() -> RepositoryConfig {
    RepositoryConfig::default().with_collection(HOME, Some("Home cohort".into()))
}

pub struct Fixture {
    pub store: Arc<MetricsStore<InMemoryEavStore>>,
    pub types: Arc<TypeSystem>,
    pub repo: MetadataRepository,
}

pub async fn fixture() -> Fixture {
    fixture_with(config()).await
}

pub async fn fixture_with(config: RepositoryConfig) -> Fixture {
    init_tracing();
    let store = Arc::new(MetricsStore::new(InMemoryEavStore::new()));
    let types = types();
    let repo = MetadataRepository::open(store.clone(), types.clone(), config).await.unwrap();
    Fixture { store, types, repo }
}

pub fn props(entries: &[(&str, PropertyValue)]) -> InstanceProperties {
    entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

pub fn string(s: &str) -> PropertyValue {
    PropertyValue::string(s)
}

impl Fixture {
    pub async fn entity(&self, guid: &str, type_name: &str, name: &str) -> EntityRecord {
        self.repo
            .create_entity(
                "alice",
                NewEntity::of_type(type_name)
                    .with_guid(guid)
                    .with_property("qualifiedName", string(&format!("qn:{guid}")))
                    .with_property("name", string(name)),
            )
            .await
            .unwrap()
    }

    pub async fn relate(&self, guid: &str, type_name: &str, one: &EntityRecord, two: &EntityRecord) {
        let mapper = StorageMapper::new(&self.types);
        self.repo
            .create_relationship(
                "alice",
                NewRelationship::between(type_name, mapper.proxy_of(one), mapper.proxy_of(two)).with_guid(guid),
            )
            .await
            .unwrap();
    }

    /// Every snapshot opened so far has been released.
    pub async fn assert_no_leaked_snapshots(&self) {
        assert_eq!(self.store.stats().await.snapshots_outstanding(), 0);
        assert_eq!(self.store.inner().open_snapshot_count(), 0);
    }
}
