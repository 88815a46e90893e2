// SPDX-License-Identifier: PMPL-1.0-or-later
//! Relationship-graph queries: related entities and neighborhoods

mod common;

use common::{config, fixture, fixture_with, Fixture};
use eavmeta_model::{EntityRecord, ErrorFamily, ErrorKind, StoredEntity};
use eavmeta_query::{GraphQuery, Paging, SequencingOrder, StatusFilter, TypeFilter};

fn guids(records: &[EntityRecord]) -> Vec<&str> {
    records.iter().map(|r| r.guid.as_str()).collect()
}

/// a -Uses- b -Uses- c -Owns- d, with a and the tables as Assets and d a
/// Person.
async fn chain(f: &Fixture) {
    let a = f.entity("a", "Asset", "a").await;
    let b = f.entity("b", "Table", "b").await;
    let c = f.entity("c", "Table", "c").await;
    let d = f.entity("d", "Person", "d").await;
    f.relate("ab", "Uses", &a, &b).await;
    f.relate("bc", "Uses", &b, &c).await;
    f.relate("cd", "Owns", &c, &d).await;
}

async fn related(f: &Fixture, query: GraphQuery) -> Vec<String> {
    f.repo
        .related_entities(&query)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.guid)
        .collect()
}

#[tokio::test]
async fn test_reachability_by_depth() {
    let f = fixture().await;
    chain(&f).await;

    let depth = |n| GraphQuery {
        max_depth: n,
        ..GraphQuery::from_root("a")
    };
    assert_eq!(related(&f, depth(Some(1))).await, vec!["b"]);
    assert_eq!(related(&f, depth(Some(2))).await, vec!["b", "c"]);
    assert_eq!(related(&f, depth(None)).await, vec!["b", "c", "d"]);
    assert_eq!(related(&f, depth(Some(0))).await, vec!["b", "c", "d"]);

    // Reachability is symmetric in the relationship ends.
    assert_eq!(related(&f, GraphQuery::from_root("d")).await, vec!["a", "b", "c"]);
    f.assert_no_leaked_snapshots().await;
}

#[tokio::test]
async fn test_depth_clamped_to_configured_ceiling() {
    let mut cfg = config();
    cfg.query.max_traversal_depth = 1;
    let f = fixture_with(cfg).await;
    chain(&f).await;

    let deep = GraphQuery {
        max_depth: Some(10),
        ..GraphQuery::from_root("a")
    };
    assert_eq!(related(&f, deep).await, vec!["b"]);
}

#[tokio::test]
async fn test_cycles_terminate_and_exclude_root() {
    let f = fixture().await;
    chain(&f).await;
    let c = f.repo.get_entity("c", None).await.unwrap();
    let a = f.repo.get_entity("a", None).await.unwrap();
    f.relate("ca", "Uses", &c, &a).await;

    assert_eq!(related(&f, GraphQuery::from_root("a")).await, vec!["b", "c", "d"]);
    assert_eq!(related(&f, GraphQuery::from_root("c")).await, vec!["a", "b", "d"]);
}

#[tokio::test]
async fn test_filters_apply_after_closure() {
    let f = fixture().await;
    chain(&f).await;

    let tables = GraphQuery {
        entity_types: Some(TypeFilter::Subtypes("Table".into())),
        ..GraphQuery::from_root("a")
    };
    assert_eq!(related(&f, tables).await, vec!["b", "c"]);

    // d is only attached through Owns.
    let uses = GraphQuery {
        relationship_types: Some(TypeFilter::AnyOf(vec!["Uses".into()])),
        ..GraphQuery::from_root("a")
    };
    assert_eq!(related(&f, uses).await, vec!["b", "c"]);

    f.repo.classify_entity("alice", "c", "PII", Default::default()).await.unwrap();
    let classified = GraphQuery {
        classifications: vec!["PII".into(), "Confidential".into()],
        ..GraphQuery::from_root("a")
    };
    assert_eq!(related(&f, classified).await, vec!["c"]);
}

#[tokio::test]
async fn test_deleted_entities_traversed_but_filtered() {
    let f = fixture().await;
    chain(&f).await;
    f.repo.delete_entity("alice", "b").await.unwrap();

    assert_eq!(related(&f, GraphQuery::from_root("a")).await, vec!["c", "d"]);

    let all = GraphQuery {
        status: StatusFilter::All,
        ..GraphQuery::from_root("a")
    };
    assert_eq!(related(&f, all).await, vec!["b", "c", "d"]);
}

#[tokio::test]
async fn test_sequencing_and_paging() {
    let f = fixture().await;
    chain(&f).await;

    let page = GraphQuery {
        sequencing: SequencingOrder::Guid,
        paging: Paging::new(1, 1),
        ..GraphQuery::from_root("a")
    };
    assert_eq!(related(&f, page).await, vec!["c"]);

    let by_name = GraphQuery {
        sequencing: SequencingOrder::PropertyDescending("name".into()),
        ..GraphQuery::from_root("a")
    };
    assert_eq!(related(&f, by_name).await, vec!["d", "c", "b"]);
}

#[tokio::test]
async fn test_neighborhood() {
    let f = fixture().await;
    chain(&f).await;

    let query = GraphQuery {
        max_depth: Some(2),
        ..GraphQuery::from_root("a")
    };
    let hood = f.repo.entity_neighborhood(&query).await.unwrap();
    match &hood.root {
        StoredEntity::Full(root) => assert_eq!(root.guid, "a"),
        other => panic!("expected full root, got {other:?}"),
    }
    assert_eq!(guids(&hood.entities), vec!["b", "c"]);
    let mut relationships: Vec<&str> = hood.relationships.iter().map(|r| r.guid.as_str()).collect();
    relationships.sort_unstable();
    assert_eq!(relationships, vec!["ab", "bc"]);

    // Relationships to filtered-out entities are dropped with them.
    let tables_only = GraphQuery {
        entity_types: Some(TypeFilter::AnyOf(vec!["Table".into()])),
        ..GraphQuery::from_root("a")
    };
    let hood = f.repo.entity_neighborhood(&tables_only).await.unwrap();
    assert_eq!(guids(&hood.entities), vec!["b", "c"]);
    assert_eq!(hood.relationships.len(), 2);
    f.assert_no_leaked_snapshots().await;
}

#[tokio::test]
async fn test_as_of_graph() {
    let f = fixture().await;
    let a = f.entity("a", "Asset", "a").await;
    let b = f.entity("b", "Table", "b").await;
    let c = f.entity("c", "Table", "c").await;
    f.relate("ab", "Uses", &a, &b).await;
    let then = f.repo.get_relationship("ab", None).await.unwrap().header.create_time;
    f.relate("bc", "Uses", &b, &c).await;

    let past = GraphQuery {
        as_of: Some(then),
        ..GraphQuery::from_root("a")
    };
    assert_eq!(related(&f, past).await, vec!["b"]);
    assert_eq!(related(&f, GraphQuery::from_root("a")).await, vec!["b", "c"]);
}

#[tokio::test]
async fn test_unknown_root_releases_snapshot() {
    let f = fixture().await;
    chain(&f).await;

    let err = f.repo.related_entities(&GraphQuery::from_root("ghost")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotKnown);
    assert_eq!(err.family(), ErrorFamily::NotFound);

    let err = f.repo.entity_neighborhood(&GraphQuery::from_root("ghost")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotKnown);

    let bad_filter = GraphQuery {
        entity_types: Some(TypeFilter::AnyOf(vec!["Uses".into()])),
        ..GraphQuery::from_root("a")
    };
    let err = f.repo.related_entities(&bad_filter).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidType);

    f.assert_no_leaked_snapshots().await;
}

#[tokio::test]
async fn test_isolated_root_has_empty_neighborhood() {
    let f = fixture().await;
    f.entity("lonely", "Asset", "lonely").await;

    assert!(related(&f, GraphQuery::from_root("lonely")).await.is_empty());
    let hood = f.repo.entity_neighborhood(&GraphQuery::from_root("lonely")).await.unwrap();
    assert!(hood.entities.is_empty());
    assert!(hood.relationships.is_empty());
}
