// SPDX-License-Identifier: PMPL-1.0-or-later
//! Graph traversal.
//!
//! Reachability from a root entity is a breadth-first fixpoint over
//! relationship edges: each hop is one store query that joins the current
//! frontier against both relationship ends. The closure itself ignores
//! types and statuses; filters apply only to the final candidate set.
//!
//! All queries run against a caller-supplied snapshot, so one traversal
//! never observes two different states of the store.

use std::collections::{BTreeMap, BTreeSet};

use eavmeta_model::attribute::header;
use eavmeta_model::{Namespace, RecordRef, TypeCategory, TypeSystem};
use eavmeta_store::{Clause, ConstraintQuery, DocId, EavStore, EavValue, Snapshot, Var};
use tracing::{debug, instrument};

use crate::compiler::ConditionCompiler;
use crate::condition::GraphQuery;
use crate::config::QueryConfig;
use crate::error::QueryError;
use crate::sequencing;

/// A relationship seen during traversal, with both of its ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub relationship: DocId,
    pub ends: (DocId, DocId),
}

impl Edge {
    fn touches_only(&self, entities: &BTreeSet<DocId>) -> bool {
        entities.contains(&self.ends.0) && entities.contains(&self.ends.1)
    }
}

/// Unfiltered result of [`GraphEngine::traverse`].
#[derive(Debug, Clone, Default)]
pub struct Traversal {
    /// Entities reachable within the hop limit, root excluded.
    pub reachable: BTreeSet<DocId>,
    /// Every relationship crossed, keyed by relationship id.
    pub edges: BTreeMap<DocId, Edge>,
    /// Hops actually taken before the frontier emptied or the limit hit.
    pub hops: u32,
}

/// Filtered entities around a root and the relationships connecting them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Neighborhood {
    /// The root first, then the filtered entities in id order.
    pub entities: Vec<DocId>,
    pub relationships: Vec<DocId>,
}

pub struct GraphEngine<'a> {
    types: &'a TypeSystem,
    config: &'a QueryConfig,
}

impl<'a> GraphEngine<'a> {
    pub fn new(types: &'a TypeSystem, config: &'a QueryConfig) -> Self {
        Self { types, config }
    }

    /// Breadth-first closure from `root`, at most `max_depth` hops.
    #[instrument(skip(self, store, snapshot))]
    pub async fn traverse(
        &self,
        store: &dyn EavStore,
        snapshot: &Snapshot,
        root: &DocId,
        max_depth: u32,
    ) -> Result<Traversal, QueryError> {
        if store.get(snapshot, root).await?.is_none() {
            return Err(QueryError::UnknownRoot(root.to_string()));
        }

        let mut traversal = Traversal::default();
        let mut visited: BTreeSet<DocId> = BTreeSet::from([root.clone()]);
        let mut frontier: Vec<DocId> = vec![root.clone()];

        while !frontier.is_empty() && traversal.hops < max_depth {
            let (near, relationship, far) = (Var::new("near"), Var::new("r"), Var::new("far"));
            let values: Vec<EavValue> = frontier.iter().cloned().map(EavValue::Ref).collect();
            let hop = |from: &str, to: &str| {
                Clause::And(vec![
                    Clause::In { var: near.clone(), values: values.clone() },
                    Clause::attr_bind(&relationship, from, &near),
                    Clause::attr_bind(&relationship, to, &far),
                ])
            };
            let mut query = ConstraintQuery::find(relationship.clone()).with_clause(Clause::Or(vec![
                hop(header::END_ONE, header::END_TWO),
                hop(header::END_TWO, header::END_ONE),
            ]));
            query.project(&near);
            query.project(&far);
            query.timeout = Some(self.config.query_timeout());

            let result = store.query(snapshot, &query).await?;
            let mut next = Vec::new();
            for row in &result.rows {
                let (Some(EavValue::Ref(r)), Some(EavValue::Ref(a)), Some(EavValue::Ref(b))) =
                    (row.first(), row.get(1), row.get(2))
                else {
                    continue;
                };
                traversal.edges.entry(r.clone()).or_insert_with(|| Edge {
                    relationship: r.clone(),
                    ends: (a.clone(), b.clone()),
                });
                if visited.insert(b.clone()) {
                    traversal.reachable.insert(b.clone());
                    next.push(b.clone());
                }
            }
            traversal.hops += 1;
            debug!(hop = traversal.hops, discovered = next.len(), "traversal hop");
            frontier = next;
        }
        Ok(traversal)
    }

    /// Entities related to the root, filtered, sequenced and paged.
    pub async fn related_entities(
        &self,
        store: &dyn EavStore,
        snapshot: &Snapshot,
        spec: &GraphQuery,
    ) -> Result<Vec<DocId>, QueryError> {
        let root = RecordRef::entity(&spec.root).doc_id();
        let traversal = self.traverse(store, snapshot, &root, self.config.effective_depth(spec.max_depth)).await?;
        let edges = self.passing_edges(store, snapshot, spec, &traversal).await?;

        let mut candidates: BTreeSet<DocId> = BTreeSet::new();
        for edge in &edges {
            candidates.insert(edge.ends.0.clone());
            candidates.insert(edge.ends.1.clone());
        }
        candidates.retain(|id| traversal.reachable.contains(id));
        self.filter_entities(store, snapshot, spec, candidates, true).await
    }

    /// The root, the filtered related entities, and every passing
    /// relationship whose two ends are both in that set.
    pub async fn neighborhood(
        &self,
        store: &dyn EavStore,
        snapshot: &Snapshot,
        spec: &GraphQuery,
    ) -> Result<Neighborhood, QueryError> {
        let root = RecordRef::entity(&spec.root).doc_id();
        let traversal = self.traverse(store, snapshot, &root, self.config.effective_depth(spec.max_depth)).await?;
        let edges = self.passing_edges(store, snapshot, spec, &traversal).await?;

        let candidates = traversal.reachable.clone();
        let entities = self.filter_entities(store, snapshot, spec, candidates, false).await?;

        let mut members: BTreeSet<DocId> = entities.iter().cloned().collect();
        members.insert(root.clone());
        let relationships = edges
            .iter()
            .filter(|edge| edge.touches_only(&members))
            .map(|edge| edge.relationship.clone())
            .collect();

        let mut ordered = vec![root];
        ordered.extend(entities);
        Ok(Neighborhood {
            entities: ordered,
            relationships,
        })
    }

    /// Crossed relationships that satisfy the relationship type and status
    /// filters.
    async fn passing_edges(
        &self,
        store: &dyn EavStore,
        snapshot: &Snapshot,
        spec: &GraphQuery,
        traversal: &Traversal,
    ) -> Result<Vec<Edge>, QueryError> {
        if traversal.edges.is_empty() {
            return Ok(Vec::new());
        }
        let compiler = ConditionCompiler::new(self.types);
        let record = Var::new("r");
        let (type_clauses, _) =
            compiler.type_clauses(spec.relationship_types.as_ref(), TypeCategory::Relationship, &record)?;

        let mut query = ConstraintQuery::find(record.clone()).with_clause(Clause::In {
            var: record.clone(),
            values: traversal.edges.keys().cloned().map(EavValue::Ref).collect(),
        });
        query.extend(type_clauses);
        query.extend(ConditionCompiler::status_clauses(&spec.status, &record));
        query.timeout = Some(self.config.query_timeout());

        let passing = store.query(snapshot, &query).await?.refs(&record);
        Ok(passing
            .iter()
            .filter_map(|id| traversal.edges.get(id).cloned())
            .collect())
    }

    async fn filter_entities(
        &self,
        store: &dyn EavStore,
        snapshot: &Snapshot,
        spec: &GraphQuery,
        candidates: BTreeSet<DocId>,
        paged: bool,
    ) -> Result<Vec<DocId>, QueryError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let compiler = ConditionCompiler::new(self.types);
        let record = Var::new("e");
        let (type_clauses, type_candidates) =
            compiler.type_clauses(spec.entity_types.as_ref(), TypeCategory::Entity, &record)?;

        let mut query = ConstraintQuery::find(record.clone()).with_clause(Clause::In {
            var: record.clone(),
            values: candidates.into_iter().map(EavValue::Ref).collect(),
        });
        query.extend(type_clauses);
        query.push(Clause::attr_eq(&record, header::IS_PROXY, EavValue::Bool(false)));
        query.extend(ConditionCompiler::status_clauses(&spec.status, &record));
        if !spec.classifications.is_empty() {
            query.push(Clause::Or(
                spec.classifications
                    .iter()
                    .map(|name| Clause::attr_eq(&record, header::CLASSIFICATIONS, EavValue::str(name)))
                    .collect(),
            ));
        }

        if paged {
            let sort_keys = compiler.sort_keys(&spec.sequencing, &Namespace::EntityProperties, &type_candidates);
            sequencing::apply(&mut query, &record, &spec.sequencing, &sort_keys, spec.paging, self.config);
        } else {
            query.timeout = Some(self.config.query_timeout());
        }

        Ok(store.query(snapshot, &query).await?.refs(&record))
    }
}
