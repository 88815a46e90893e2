// SPDX-License-Identifier: PMPL-1.0-or-later
//! Performance benchmarks for search compilation, graph traversal and the
//! mutation protocol over the in-memory store

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use futures::future::join_all;
use std::sync::Arc;
use tokio::runtime::Runtime;

use eavmeta_model::{PropertyDef, PropertyValue, StorageMapper, TypeCategory, TypeDef, TypeSystem};
use eavmeta_query::{
    ConditionCompiler, EntitySearch, GraphQuery, Paging, QueryConfig, SearchCondition, SearchProperties,
    SequencingOrder, TypeFilter,
};
use eavmeta_repository::{MetadataRepository, NewEntity, NewRelationship, RepositoryConfig};
use eavmeta_store::InMemoryEavStore;

fn types() -> Arc<TypeSystem> {
    Arc::new(
        TypeSystem::new(vec![
            TypeDef::new("g-asset", "Asset", TypeCategory::Entity)
                .with_property(PropertyDef::unique("qualifiedName"))
                .with_property(PropertyDef::new("name"))
                .with_property(PropertyDef::new("owner")),
            TypeDef::new("g-table", "Table", TypeCategory::Entity)
                .with_supertype("Asset")
                .with_property(PropertyDef::new("rows")),
            TypeDef::new("g-column", "Column", TypeCategory::Entity)
                .with_supertype("Asset")
                .with_property(PropertyDef::new("rows")),
            TypeDef::new("g-uses", "Uses", TypeCategory::Relationship),
        ])
        .unwrap(),
    )
}

fn nested_search() -> EntitySearch {
    EntitySearch {
        type_filter: Some(TypeFilter::Subtypes("Asset".into())),
        properties: Some(SearchProperties::any(vec![
            SearchCondition::Nested(SearchProperties::all(vec![
                SearchCondition::eq("name", PropertyValue::string("table-7")),
                SearchCondition::eq("owner", PropertyValue::string("team-1")),
            ])),
            SearchCondition::eq("rows", PropertyValue::int(42)),
        ])),
        sequencing: SequencingOrder::PropertyAscending("name".into()),
        paging: Paging::new(0, 25),
        ..EntitySearch::default()
    }
}

async fn populated(entities: usize) -> MetadataRepository {
    let repo = MetadataRepository::open(Arc::new(InMemoryEavStore::new()), types(), RepositoryConfig::default())
        .await
        .unwrap();
    for i in 0..entities {
        repo.create_entity(
            "bench",
            NewEntity::of_type(if i % 2 == 0 { "Table" } else { "Column" })
                .with_guid(format!("e{i:05}"))
                .with_property("qualifiedName", PropertyValue::string(format!("qn:{i}")))
                .with_property("name", PropertyValue::string(format!("table-{i}")))
                .with_property("owner", PropertyValue::string(format!("team-{}", i % 10)))
                .with_property("rows", PropertyValue::int((i % 100) as i64)),
        )
        .await
        .unwrap();
    }
    repo
}

/// A chain e0 - e1 - ... - e{n-1} of Uses relationships.
async fn chained(length: usize) -> MetadataRepository {
    let repo = populated(length).await;
    for i in 1..length {
        let one = repo.get_entity(&format!("e{:05}", i - 1), None).await.unwrap();
        let two = repo.get_entity(&format!("e{i:05}"), None).await.unwrap();
        let mapper = StorageMapper::new(repo.types());
        repo.create_relationship(
            "bench",
            NewRelationship::between("Uses", mapper.proxy_of(&one), mapper.proxy_of(&two)).with_guid(format!("r{i:05}")),
        )
        .await
        .unwrap();
    }
    repo
}

// ============================================================================
// Condition Compilation
// ============================================================================

fn bench_compile(c: &mut Criterion) {
    let types = types();
    let config = QueryConfig::default();
    let search = nested_search();

    let mut group = c.benchmark_group("compile");
    group.bench_function("nested_entity_search", |b| {
        b.iter(|| {
            let mut compiler = ConditionCompiler::new(&types);
            black_box(compiler.entity_search(black_box(&search), &config).unwrap())
        });
    });
    group.finish();
}

// ============================================================================
// Search
// ============================================================================

fn bench_search(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("search");

    for size in [100usize, 1000].iter() {
        let repo = rt.block_on(populated(*size));
        let search = nested_search();
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::new("find_entities", size), size, |b, _| {
            b.to_async(&rt)
                .iter(|| async { black_box(repo.find_entities(&search).await.unwrap()) });
        });
    }

    group.finish();
}

// ============================================================================
// Graph Traversal
// ============================================================================

fn bench_graph(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let repo = rt.block_on(chained(50));
    let mut group = c.benchmark_group("graph");

    for depth in [1u32, 5, 20].iter() {
        let query = GraphQuery {
            max_depth: Some(*depth),
            ..GraphQuery::from_root("e00000")
        };
        group.bench_with_input(BenchmarkId::new("related_entities", depth), depth, |b, _| {
            b.to_async(&rt)
                .iter(|| async { black_box(repo.related_entities(&query).await.unwrap()) });
        });
    }

    group.finish();
}

// ============================================================================
// Mutation Protocol
// ============================================================================

fn bench_mutations(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let repo = rt.block_on(populated(1));
    let mut group = c.benchmark_group("mutation");

    group.bench_function("update_properties", |b| {
        b.to_async(&rt).iter(|| async {
            let properties = [("name".to_string(), PropertyValue::string("renamed"))].into_iter().collect();
            black_box(repo.update_entity_properties("bench", "e00000", properties).await.unwrap())
        });
    });

    group.bench_function("concurrent_updates_8", |b| {
        b.to_async(&rt).iter(|| async {
            let updates = (0..8).map(|i| {
                let properties = [("name".to_string(), PropertyValue::string(format!("n{i}")))].into_iter().collect();
                repo.update_entity_properties("bench", "e00000", properties)
            });
            black_box(join_all(updates).await)
        });
    });

    group.finish();
}

criterion_group!(compile_benches, bench_compile);

criterion_group!(search_benches, bench_search);

criterion_group!(graph_benches, bench_graph);

criterion_group!(mutation_benches, bench_mutations);

criterion_main!(compile_benches, search_benches, graph_benches, mutation_benches);
