// SPDX-License-Identifier: PMPL-1.0-or-later
//! End-to-end tests of the mutation protocol against the in-memory store

use chrono::Utc;
use eavmeta_model::{
    EntityProxy, EntityRecord, ErrorFamily, ErrorKind, InstanceHeader, InstanceProperties, InstanceStatus,
    PropertyDef, PropertyValue, RecordRef, RelationshipRecord, StorageMapper, StoredEntity, TypeCategory, TypeDef,
    TypeSystem,
};
use eavmeta_mutation::{
    ClassifyMode, CollectionContext, ErrorCorrelationCache, MutationProtocol, MutationRequest, NewClassification,
};
use eavmeta_store::{EavStore, InMemoryEavStore};
use std::sync::Arc;
use std::time::Duration;

const HOME: &str = "home";
const REMOTE: &str = "remote";

fn types() -> Arc<TypeSystem> {
    Arc::new(
        TypeSystem::new(vec![
            TypeDef::new("g-asset", "Asset", TypeCategory::Entity)
                .with_property(PropertyDef::unique("qualifiedName"))
                .with_property(PropertyDef::new("owner")),
            TypeDef::new("g-table", "Table", TypeCategory::Entity).with_supertype("Asset"),
            TypeDef::new("g-person", "Person", TypeCategory::Entity).with_property(PropertyDef::new("name")),
            TypeDef::new("g-uses", "Uses", TypeCategory::Relationship).with_property(PropertyDef::new("since")),
            TypeDef::new("g-conf", "Confidential", TypeCategory::Classification)
                .with_property(PropertyDef::new("level"))
                .with_valid_entity_type("Asset"),
        ])
        .unwrap(),
    )
}

struct Fixture {
    store: Arc<InMemoryEavStore>,
    types: Arc<TypeSystem>,
    protocol: Arc<MutationProtocol>,
}

async fn fixture() -> Fixture {
    let store = Arc::new(InMemoryEavStore::new());
    let types = types();
    let protocol = MutationProtocol::install(
        store.clone(),
        types.clone(),
        Arc::new(ErrorCorrelationCache::with_defaults()),
        CollectionContext::new(HOME, Some("Home".into())),
        Duration::from_secs(5),
    )
    .await
    .unwrap();
    Fixture {
        store,
        types,
        protocol: Arc::new(protocol),
    }
}

fn props(entries: &[(&str, &str)]) -> InstanceProperties {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), PropertyValue::string(*v)))
        .collect()
}

fn create_asset(guid: &str, name: &str) -> MutationRequest {
    MutationRequest::CreateEntity {
        guid: guid.into(),
        type_name: "Asset".into(),
        properties: props(&[("qualifiedName", name)]),
        classifications: Vec::new(),
        initial_status: None,
    }
}

fn header(type_name: &str, guid: &str, home: &str, version: u64) -> InstanceHeader {
    let mut header = InstanceHeader::new_local(
        eavmeta_model::TypeRef {
            guid: guid.into(),
            name: type_name.into(),
        },
        home,
        None,
        "bob",
        Utc::now(),
    );
    header.version = version;
    header
}

fn remote_asset(guid: &str, version: u64) -> EntityRecord {
    EntityRecord {
        guid: guid.into(),
        header: header("Asset", "g-asset", REMOTE, version),
        properties: props(&[("qualifiedName", guid), ("owner", "bob")]),
        classifications: Vec::new(),
    }
}

fn proxy(guid: &str) -> EntityProxy {
    EntityProxy {
        guid: guid.into(),
        header: header("Asset", "g-asset", REMOTE, 1),
        unique_properties: props(&[("qualifiedName", guid)]),
    }
}

impl Fixture {
    async fn entity(&self, guid: &str) -> Option<StoredEntity> {
        let snapshot = self.store.open_snapshot(None).await.unwrap();
        let doc = self.store.get(&snapshot, &RecordRef::entity(guid).doc_id()).await.unwrap();
        self.store.release_snapshot(snapshot).await.unwrap();
        doc.map(|d| StorageMapper::new(&self.types).stored_entity_from_document(&d).unwrap())
    }

    async fn full(&self, guid: &str) -> EntityRecord {
        match self.entity(guid).await {
            Some(StoredEntity::Full(entity)) => entity,
            other => panic!("expected full entity {guid}, got {other:?}"),
        }
    }

    async fn exists(&self, reference: RecordRef) -> bool {
        let snapshot = self.store.open_snapshot(None).await.unwrap();
        let doc = self.store.get(&snapshot, &reference.doc_id()).await.unwrap();
        self.store.release_snapshot(snapshot).await.unwrap();
        doc.is_some()
    }

    async fn relate(&self, guid: &str, one: &str, two: &str) {
        let end_one = self.proxy_of(one).await;
        let end_two = self.proxy_of(two).await;
        self.protocol
            .invoke(
                "alice",
                MutationRequest::CreateRelationship {
                    guid: guid.into(),
                    type_name: "Uses".into(),
                    properties: InstanceProperties::new(),
                    initial_status: None,
                    end_one,
                    end_two,
                },
            )
            .await
            .unwrap();
    }

    async fn proxy_of(&self, guid: &str) -> EntityProxy {
        StorageMapper::new(&self.types).proxy_of(&self.full(guid).await)
    }
}

// ---------------------------------------------------------------------------
// Entity lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_create_entity_starts_at_version_one() {
    let f = fixture().await;
    let outcome = f.protocol.invoke("alice", create_asset("a", "orders")).await.unwrap();
    assert!(outcome.committed);

    let entity = f.full("a").await;
    assert_eq!(entity.header.version, 1);
    assert_eq!(entity.header.status, InstanceStatus::Active);
    assert_eq!(entity.header.metadata_collection_id, HOME);
    assert_eq!(entity.header.created_by.as_deref(), Some("alice"));
    assert_eq!(entity.header.create_time, outcome.tx_time);
}

#[tokio::test]
async fn test_duplicate_create_is_rejected() {
    let f = fixture().await;
    f.protocol.invoke("alice", create_asset("a", "orders")).await.unwrap();
    let err = f.protocol.invoke("alice", create_asset("a", "orders")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateReference);
    assert_eq!(f.full("a").await.header.version, 1);
}

#[tokio::test]
async fn test_illegal_property_is_rejected() {
    let f = fixture().await;
    let err = f
        .protocol
        .invoke(
            "alice",
            MutationRequest::CreateEntity {
                guid: "a".into(),
                type_name: "Asset".into(),
                properties: props(&[("colour", "red")]),
                classifications: Vec::new(),
                initial_status: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPropertyForType);
    assert!(f.entity("a").await.is_none());
}

#[tokio::test]
async fn test_every_accepted_mutation_bumps_version_once() {
    let f = fixture().await;
    f.protocol.invoke("alice", create_asset("a", "orders")).await.unwrap();
    f.protocol
        .invoke(
            "bob",
            MutationRequest::UpdateEntityProperties {
                guid: "a".into(),
                properties: props(&[("qualifiedName", "orders"), ("owner", "bob")]),
            },
        )
        .await
        .unwrap();
    let entity = f.full("a").await;
    assert_eq!(entity.header.version, 2);
    assert_eq!(entity.header.updated_by.as_deref(), Some("bob"));
    assert_eq!(entity.header.maintained_by, vec!["alice".to_string(), "bob".to_string()]);

    f.protocol
        .invoke(
            "bob",
            MutationRequest::UpdateEntityStatus {
                guid: "a".into(),
                status: Some(InstanceStatus::Proposed),
            },
        )
        .await
        .unwrap();
    assert_eq!(f.full("a").await.header.version, 3);
    assert_eq!(f.full("a").await.header.status, InstanceStatus::Proposed);
}

#[tokio::test]
async fn test_status_update_rules() {
    let f = fixture().await;
    f.protocol.invoke("alice", create_asset("a", "orders")).await.unwrap();

    let missing = f
        .protocol
        .invoke("alice", MutationRequest::UpdateEntityStatus { guid: "a".into(), status: None })
        .await
        .unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NullRequiredProperty);

    let deleted = f
        .protocol
        .invoke(
            "alice",
            MutationRequest::UpdateEntityStatus {
                guid: "a".into(),
                status: Some(InstanceStatus::Deleted),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(deleted.kind(), ErrorKind::StatusNotSupported);
    assert_eq!(f.full("a").await.header.version, 1);
}

#[tokio::test]
async fn test_soft_delete_and_restore() {
    let f = fixture().await;
    f.protocol
        .invoke(
            "alice",
            MutationRequest::CreateEntity {
                guid: "a".into(),
                type_name: "Asset".into(),
                properties: InstanceProperties::new(),
                classifications: Vec::new(),
                initial_status: Some(InstanceStatus::Draft),
            },
        )
        .await
        .unwrap();
    f.protocol.invoke("alice", MutationRequest::DeleteEntity { guid: "a".into() }).await.unwrap();
    let deleted = f.full("a").await;
    assert_eq!(deleted.header.status, InstanceStatus::Deleted);
    assert_eq!(deleted.header.status_on_delete, Some(InstanceStatus::Draft));

    let again = f
        .protocol
        .invoke("alice", MutationRequest::DeleteEntity { guid: "a".into() })
        .await
        .unwrap_err();
    assert_eq!(again.kind(), ErrorKind::AlreadyDeleted);

    f.protocol.invoke("alice", MutationRequest::RestoreEntity { guid: "a".into() }).await.unwrap();
    let restored = f.full("a").await;
    assert_eq!(restored.header.status, InstanceStatus::Draft);
    assert_eq!(restored.header.version, 3);

    let not_deleted = f
        .protocol
        .invoke("alice", MutationRequest::RestoreEntity { guid: "a".into() })
        .await
        .unwrap_err();
    assert_eq!(not_deleted.kind(), ErrorKind::NotDeleted);
}

#[tokio::test]
async fn test_purge_requires_soft_delete_unless_forced() {
    let f = fixture().await;
    f.protocol.invoke("alice", create_asset("a", "orders")).await.unwrap();
    let err = f
        .protocol
        .invoke("alice", MutationRequest::PurgeEntity { guid: "a".into(), force: false })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotDeleted);

    f.protocol
        .invoke("alice", MutationRequest::PurgeEntity { guid: "a".into(), force: true })
        .await
        .unwrap();
    assert!(f.entity("a").await.is_none());
}

// ---------------------------------------------------------------------------
// Relationships and purge cascade
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_purge_cascades_to_relationships_atomically() {
    let f = fixture().await;
    for guid in ["a", "b", "c"] {
        f.protocol.invoke("alice", create_asset(guid, guid)).await.unwrap();
    }
    f.relate("ab", "a", "b").await;
    f.relate("ca", "c", "a").await;
    f.relate("bc", "b", "c").await;

    f.protocol.invoke("alice", MutationRequest::DeleteEntity { guid: "a".into() }).await.unwrap();
    let outcome = f
        .protocol
        .invoke("alice", MutationRequest::PurgeEntity { guid: "a".into(), force: false })
        .await
        .unwrap();
    assert_eq!(outcome.writes, 3);

    assert!(!f.exists(RecordRef::entity("a")).await);
    assert!(!f.exists(RecordRef::relationship("ab")).await);
    assert!(!f.exists(RecordRef::relationship("ca")).await);
    assert!(f.exists(RecordRef::relationship("bc")).await);
    assert!(f.exists(RecordRef::entity("b")).await);
}

#[tokio::test]
async fn test_relationship_to_deleted_end_is_rejected() {
    let f = fixture().await;
    f.protocol.invoke("alice", create_asset("a", "a")).await.unwrap();
    f.protocol.invoke("alice", create_asset("b", "b")).await.unwrap();
    let end_one = f.proxy_of("a").await;
    let end_two = f.proxy_of("b").await;
    f.protocol.invoke("alice", MutationRequest::DeleteEntity { guid: "b".into() }).await.unwrap();

    let err = f
        .protocol
        .invoke(
            "alice",
            MutationRequest::CreateRelationship {
                guid: "ab".into(),
                type_name: "Uses".into(),
                properties: InstanceProperties::new(),
                initial_status: None,
                end_one,
                end_two,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyDeleted);
    assert!(!f.exists(RecordRef::relationship("ab")).await);
}

#[tokio::test]
async fn test_relationship_creates_stubs_for_unknown_ends() {
    let f = fixture().await;
    f.protocol.invoke("alice", create_asset("a", "a")).await.unwrap();
    let end_one = f.proxy_of("a").await;
    f.protocol
        .invoke(
            "alice",
            MutationRequest::CreateRelationship {
                guid: "ax".into(),
                type_name: "Uses".into(),
                properties: props(&[("since", "2024")]),
                initial_status: None,
                end_one,
                end_two: proxy("x"),
            },
        )
        .await
        .unwrap();
    assert!(matches!(f.entity("x").await, Some(StoredEntity::Proxy(_))));
    assert!(matches!(f.entity("a").await, Some(StoredEntity::Full(_))));
}

#[tokio::test]
async fn test_concurrent_stub_creation_is_idempotent() {
    let f = fixture().await;
    let request = MutationRequest::CreateEntityStub { proxy: proxy("x") };
    let (first, second) = tokio::join!(
        f.protocol.invoke("alice", request.clone()),
        f.protocol.invoke("bob", request.clone()),
    );
    let writes = first.unwrap().writes + second.unwrap().writes;
    assert_eq!(writes, 1);
    assert_eq!(f.store.history_len(&RecordRef::entity("x").doc_id()).await, 1);
}

#[tokio::test]
async fn test_full_create_replaces_stub() {
    let f = fixture().await;
    f.protocol
        .invoke("alice", MutationRequest::CreateEntityStub { proxy: proxy("x") })
        .await
        .unwrap();
    f.protocol.invoke("alice", create_asset("x", "x")).await.unwrap();
    let entity = f.full("x").await;
    assert_eq!(entity.header.metadata_collection_id, HOME);

    let err = f
        .protocol
        .invoke("alice", MutationRequest::DeleteEntity { guid: "missing".into() })
        .await
        .unwrap_err();
    assert_eq!(err.family(), ErrorFamily::NotFound);
}

// ---------------------------------------------------------------------------
// Classifications
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_classify_modes() {
    let f = fixture().await;
    f.protocol.invoke("alice", create_asset("a", "a")).await.unwrap();
    let classify = |mode, level: &str| MutationRequest::ClassifyEntity {
        guid: "a".into(),
        classification: "Confidential".into(),
        properties: props(&[("level", level)]),
        mode,
    };

    let update_absent = f.protocol.invoke("alice", classify(ClassifyMode::Update, "1")).await.unwrap_err();
    assert_eq!(update_absent.kind(), ErrorKind::ClassificationNotPresent);

    f.protocol.invoke("alice", classify(ClassifyMode::Add, "1")).await.unwrap();
    let add_twice = f.protocol.invoke("alice", classify(ClassifyMode::Add, "2")).await.unwrap_err();
    assert_eq!(add_twice.kind(), ErrorKind::ClassificationAlreadyPresent);

    f.protocol.invoke("bob", classify(ClassifyMode::Update, "3")).await.unwrap();
    let entity = f.full("a").await;
    let classification = entity.classification("Confidential").unwrap();
    assert_eq!(classification.properties.get("level"), Some(&PropertyValue::string("3")));
    assert_eq!(classification.header.version, 2);
    assert_eq!(entity.header.version, 3);

    f.protocol
        .invoke(
            "alice",
            MutationRequest::DeclassifyEntity {
                guid: "a".into(),
                classification: "Confidential".into(),
            },
        )
        .await
        .unwrap();
    assert!(f.full("a").await.classifications.is_empty());
}

#[tokio::test]
async fn test_classification_must_apply_to_entity_type() {
    let f = fixture().await;
    f.protocol
        .invoke(
            "alice",
            MutationRequest::CreateEntity {
                guid: "p".into(),
                type_name: "Person".into(),
                properties: props(&[("name", "Ada")]),
                classifications: Vec::new(),
                initial_status: None,
            },
        )
        .await
        .unwrap();
    let err = f
        .protocol
        .invoke(
            "alice",
            MutationRequest::ClassifyEntity {
                guid: "p".into(),
                classification: "Confidential".into(),
                properties: InstanceProperties::new(),
                mode: ClassifyMode::Add,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidClassificationForEntity);

    let created = f
        .protocol
        .invoke(
            "alice",
            MutationRequest::CreateEntity {
                guid: "t".into(),
                type_name: "Table".into(),
                properties: InstanceProperties::new(),
                classifications: vec![NewClassification {
                    name: "Confidential".into(),
                    properties: props(&[("level", "high")]),
                }],
                initial_status: None,
            },
        )
        .await;
    assert!(created.is_ok());
    assert!(f.full("t").await.classification("Confidential").is_some());
}

// ---------------------------------------------------------------------------
// Ownership and reference copies
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_remote_copy_cannot_be_changed_locally() {
    let f = fixture().await;
    f.protocol.save_entity_reference_copy("sync", remote_asset("r", 4)).await.unwrap();

    let err = f
        .protocol
        .invoke(
            "alice",
            MutationRequest::UpdateEntityProperties {
                guid: "r".into(),
                properties: props(&[("owner", "alice")]),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotLocal);
    assert_eq!(err.family(), ErrorFamily::Conflict);

    let stored = f.full("r").await;
    assert_eq!(stored.header.version, 4);
    assert_eq!(stored.properties.get("owner"), Some(&PropertyValue::string("bob")));
}

#[tokio::test]
async fn test_stale_reference_copy_is_ignored() {
    let f = fixture().await;
    f.protocol.save_entity_reference_copy("sync", remote_asset("r", 4)).await.unwrap();
    let outcome = f.protocol.save_entity_reference_copy("sync", remote_asset("r", 3)).await.unwrap();
    assert_eq!(outcome.writes, 0);
    assert_eq!(f.full("r").await.header.version, 4);

    f.protocol.save_entity_reference_copy("sync", remote_asset("r", 5)).await.unwrap();
    assert_eq!(f.full("r").await.header.version, 5);
}

#[tokio::test]
async fn test_reference_copy_never_replaces_local_record() {
    let f = fixture().await;
    f.protocol.invoke("alice", create_asset("a", "a")).await.unwrap();
    let err = f
        .protocol
        .invoke("sync", MutationRequest::StoreEntityReferenceCopy { entity: remote_asset("a", 9) })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateReference);
    assert_eq!(f.full("a").await.header.metadata_collection_id, HOME);
}

#[tokio::test]
async fn test_purge_of_referenced_copy_leaves_a_stub() {
    let f = fixture().await;
    f.protocol.save_entity_reference_copy("sync", remote_asset("r", 1)).await.unwrap();
    f.protocol.invoke("alice", create_asset("a", "a")).await.unwrap();
    f.relate("ar", "a", "r").await;

    f.protocol.purge_entity_reference_copy("sync", "r", REMOTE).await.unwrap();
    assert!(matches!(f.entity("r").await, Some(StoredEntity::Proxy(_))));

    f.protocol.save_entity_reference_copy("sync", remote_asset("s", 1)).await.unwrap();
    f.protocol.purge_entity_reference_copy("sync", "s", REMOTE).await.unwrap();
    assert!(f.entity("s").await.is_none());
}

#[tokio::test]
async fn test_relationship_copy_stubs_its_ends() {
    let f = fixture().await;
    let relationship = RelationshipRecord {
        guid: "rel".into(),
        header: header("Uses", "g-uses", REMOTE, 2),
        properties: InstanceProperties::new(),
        end_one: proxy("x"),
        end_two: proxy("y"),
    };
    f.protocol.save_relationship_reference_copy("sync", relationship).await.unwrap();
    assert!(f.exists(RecordRef::relationship("rel")).await);
    assert!(matches!(f.entity("x").await, Some(StoredEntity::Proxy(_))));
    assert!(matches!(f.entity("y").await, Some(StoredEntity::Proxy(_))));

    f.protocol.purge_relationship_reference_copy("sync", "rel", "elsewhere").await.unwrap();
    assert!(f.exists(RecordRef::relationship("rel")).await);
    f.protocol.purge_relationship_reference_copy("sync", "rel", REMOTE).await.unwrap();
    assert!(!f.exists(RecordRef::relationship("rel")).await);
}

#[tokio::test]
async fn test_home_relationship_copy_is_all_or_nothing() {
    let f = fixture().await;
    let mut bad_end = proxy("q");
    bad_end.header.type_ref = eavmeta_model::TypeRef {
        guid: "g-uses".into(),
        name: "Uses".into(),
    };
    let rejected = RelationshipRecord {
        guid: "home-rel".into(),
        header: header("Uses", "g-uses", HOME, 3),
        properties: InstanceProperties::new(),
        end_one: proxy("p"),
        end_two: bad_end,
    };
    let err = f
        .protocol
        .save_relationship_reference_copy("sync", rejected)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidType);
    assert!(f.entity("p").await.is_none());
    assert!(f.entity("q").await.is_none());
    assert!(!f.exists(RecordRef::relationship("home-rel")).await);

    let accepted = RelationshipRecord {
        guid: "home-rel".into(),
        header: header("Uses", "g-uses", HOME, 3),
        properties: props(&[("since", "2020")]),
        end_one: proxy("p"),
        end_two: proxy("q"),
    };
    f.protocol.save_relationship_reference_copy("sync", accepted).await.unwrap();
    assert!(matches!(f.entity("p").await, Some(StoredEntity::Proxy(_))));
    assert!(matches!(f.entity("q").await, Some(StoredEntity::Proxy(_))));
    assert!(f.exists(RecordRef::relationship("home-rel")).await);
}

// ---------------------------------------------------------------------------
// Error correlation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_errors_are_taken_exactly_once() {
    let f = fixture().await;
    let err = f
        .protocol
        .invoke("alice", MutationRequest::RestoreEntity { guid: "nobody".into() })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotKnown);
    assert!(f.protocol.errors().is_empty());
    let stats = f.protocol.errors().stats();
    assert_eq!(stats.recorded, 1);
    assert_eq!(stats.taken, 1);
}

#[tokio::test]
async fn test_concurrent_failures_correlate_to_their_own_transactions() {
    let f = fixture().await;
    f.protocol.invoke("alice", create_asset("a", "a")).await.unwrap();

    let missing = f.protocol.invoke("alice", MutationRequest::DeleteEntity { guid: "ghost".into() });
    let live = f.protocol.invoke("alice", MutationRequest::RestoreEntity { guid: "a".into() });
    let ok = f.protocol.invoke("alice", MutationRequest::DeleteEntity { guid: "a".into() });
    let (missing, live, ok) = tokio::join!(missing, live, ok);

    assert_eq!(missing.unwrap_err().kind(), ErrorKind::NotKnown);
    // The restore may run before or after the delete.
    if let Err(err) = live {
        assert_eq!(err.kind(), ErrorKind::NotDeleted);
    }
    assert!(ok.is_ok());
    assert!(f.protocol.errors().is_empty());
}
