// SPDX-License-Identifier: PMPL-1.0-or-later
//! Condition compiler.
//!
//! Translates search specifications into constraint queries over the
//! document layout produced by [`eavmeta_model::StorageMapper`].
//!
//! Leaf translation:
//! - `EQ` / `NEQ` become (negated) tuple patterns on the flattened form.
//! - `GT`, `GTE`, `LT`, `LTE` and `LIKE` bind the value to a fresh variable
//!   and add a predicate on it. `LIKE` is a whole-value regex match.
//! - `IS_NULL` / `NOT_NULL` bind the first present qualified attribute (or
//!   null) and test it.
//!
//! A property that resolves to several type-qualified attributes is tried
//! under each of them and the alternatives are OR-joined. Conditions that
//! cannot be compiled are dropped and reported as [`Diagnostic`]s; they never
//! fail the search.

use eavmeta_model::attribute::header;
use eavmeta_model::{AttributeKey, Namespace, PropertyValue, RecordRef, TypeCategory, TypeSystem};
use eavmeta_store::{Clause, CompareOp, ConstraintQuery, EavValue, Predicate, Term, Var};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::condition::{
    Comparator, EntitySearch, MatchCriteria, PropertyCondition, RelationshipSearch, SearchClassifications,
    SearchCondition, SearchProperties, StatusFilter, TypeFilter,
};
use crate::config::QueryConfig;
use crate::error::QueryError;
use crate::sequencing::{self, SequencingOrder};

/// A condition that was dropped during compilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub property: String,
    pub reason: String,
}

/// Output of a compilation: the query, the variable its records are bound
/// to, and anything that had to be dropped.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub query: ConstraintQuery,
    pub record: Var,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct ConditionCompiler<'a> {
    types: &'a TypeSystem,
    next_var: usize,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> ConditionCompiler<'a> {
    pub fn new(types: &'a TypeSystem) -> Self {
        Self {
            types,
            next_var: 0,
            diagnostics: Vec::new(),
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    fn fresh(&mut self) -> Var {
        self.next_var += 1;
        Var::new(format!("v{}", self.next_var))
    }

    fn diagnose(&mut self, property: &str, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(property, reason = %reason, "search condition dropped");
        self.diagnostics.push(Diagnostic {
            property: property.to_string(),
            reason,
        });
    }

    // -----------------------------------------------------------------------
    // Condition trees
    // -----------------------------------------------------------------------

    /// Compile a condition tree whose properties live in `namespace` on
    /// records of the `candidates` types bound to `record`.
    pub fn compile(
        &mut self,
        tree: &SearchProperties,
        namespace: &Namespace,
        candidates: &[String],
        record: &Var,
    ) -> Vec<Clause> {
        self.compile_node(tree, namespace, candidates, record, true)
    }

    fn compile_node(
        &mut self,
        node: &SearchProperties,
        namespace: &Namespace,
        candidates: &[String],
        record: &Var,
        outermost: bool,
    ) -> Vec<Clause> {
        let mut children = Vec::new();
        for condition in &node.conditions {
            match condition {
                SearchCondition::Property(leaf) => {
                    if let Some(clause) = self.compile_leaf(leaf, namespace, candidates, record) {
                        children.push(clause);
                    }
                }
                SearchCondition::Nested(inner) => {
                    children.extend(self.compile_node(inner, namespace, candidates, record, false));
                }
            }
        }
        if children.is_empty() {
            return children;
        }
        match node.criteria {
            MatchCriteria::All if outermost => children,
            MatchCriteria::All => vec![Clause::And(children)],
            MatchCriteria::Any => vec![Clause::Or(children)],
            MatchCriteria::None => vec![Clause::Not(children)],
        }
    }

    /// Qualified keys of `property`; an undeclared property gets a single
    /// unqualified key, which no stored attribute carries.
    fn keys_for(&self, namespace: &Namespace, property: &str, candidates: &[String]) -> Vec<AttributeKey> {
        let keys = AttributeKey::resolve(self.types, namespace, property, candidates);
        if keys.is_empty() {
            debug!(property, namespace = %namespace, "property not declared on any candidate type");
            vec![AttributeKey::new(namespace.clone(), property, None)]
        } else {
            keys
        }
    }

    fn compile_leaf(
        &mut self,
        leaf: &PropertyCondition,
        namespace: &Namespace,
        candidates: &[String],
        record: &Var,
    ) -> Option<Clause> {
        let attributes: Vec<String> = self
            .keys_for(namespace, &leaf.property, candidates)
            .iter()
            .map(AttributeKey::queryable)
            .collect();

        if let Comparator::IsNull | Comparator::NotNull = leaf.operator {
            let bound = self.fresh();
            let predicate = if leaf.operator == Comparator::IsNull {
                Predicate::IsNull(bound.clone())
            } else {
                Predicate::NotNull(bound.clone())
            };
            return Some(Clause::And(vec![
                Clause::FirstOf {
                    entity: record.clone(),
                    attributes,
                    bind: bound,
                },
                Clause::Predicate(predicate),
            ]));
        }

        let Some(value) = &leaf.value else {
            self.diagnose(&leaf.property, "comparison has no comparand");
            return None;
        };

        match leaf.operator {
            Comparator::Eq => self.equality(&leaf.property, record, &attributes, value),
            Comparator::Neq => self
                .equality(&leaf.property, record, &attributes, value)
                .map(|eq| Clause::Not(vec![eq])),
            Comparator::Like => {
                let Some(pattern) = value.as_str() else {
                    self.diagnose(&leaf.property, "LIKE comparand is not a string");
                    return None;
                };
                if let Err(e) = Regex::new(pattern) {
                    self.diagnose(&leaf.property, format!("invalid regular expression: {e}"));
                    return None;
                }
                let bound = self.fresh();
                Some(bind_and_test(record, &attributes, &bound, || Predicate::Matches {
                    var: bound.clone(),
                    pattern: pattern.to_string(),
                }))
            }
            Comparator::Gt | Comparator::Gte | Comparator::Lt | Comparator::Lte => {
                let comparand = value.flatten();
                if let EavValue::List(_) = comparand {
                    self.diagnose(&leaf.property, "collections cannot be range-compared");
                    return None;
                }
                let op = match leaf.operator {
                    Comparator::Gt => CompareOp::Gt,
                    Comparator::Gte => CompareOp::Gte,
                    Comparator::Lt => CompareOp::Lt,
                    _ => CompareOp::Lte,
                };
                let bound = self.fresh();
                Some(bind_and_test(record, &attributes, &bound, || Predicate::Compare {
                    op,
                    var: bound.clone(),
                    value: comparand.clone(),
                }))
            }
            Comparator::IsNull | Comparator::NotNull => None,
        }
    }

    fn equality(&mut self, property: &str, record: &Var, attributes: &[String], value: &PropertyValue) -> Option<Clause> {
        let comparand = value.flatten();
        let elements: Vec<EavValue> = match comparand {
            EavValue::List(items) if items.is_empty() => {
                self.diagnose(property, "empty collection comparand");
                return None;
            }
            EavValue::List(items) => items,
            scalar => vec![scalar],
        };
        let branches = attributes
            .iter()
            .map(|attribute| {
                Clause::conjunction(
                    elements
                        .iter()
                        .map(|el| Clause::attr_eq(record, attribute.clone(), el.clone()))
                        .collect(),
                )
            })
            .collect();
        Some(or_join(branches))
    }

    // -----------------------------------------------------------------------
    // Filters
    // -----------------------------------------------------------------------

    /// Category and type restriction. The first clause binds `record`.
    /// Also returns the candidate type names used for property resolution.
    pub fn type_clauses(
        &self,
        filter: Option<&TypeFilter>,
        category: TypeCategory,
        record: &Var,
    ) -> Result<(Vec<Clause>, Vec<String>), QueryError> {
        let mut clauses = vec![Clause::attr_eq(record, header::TYPE_CATEGORY, EavValue::str(category.as_str()))];

        let candidates = match filter {
            Some(TypeFilter::Subtypes(name)) => {
                let def = self.checked_type(name, category)?;
                clauses.push(Clause::attr_eq(record, header::TYPE_SUPERS, EavValue::str(&def.guid)));
                self.types.subtypes_of(name)?.into_iter().map(|d| d.name.clone()).collect()
            }
            Some(TypeFilter::AnyOf(names)) if !names.is_empty() => {
                let mut branches = Vec::with_capacity(names.len());
                for name in names {
                    let def = self.checked_type(name, category)?;
                    branches.push(Clause::attr_eq(record, header::TYPE_ID, EavValue::str(&def.guid)));
                }
                clauses.push(or_join(branches));
                names.clone()
            }
            _ => self
                .types
                .types()
                .filter(|d| d.category == category)
                .map(|d| d.name.clone())
                .collect(),
        };
        Ok((clauses, candidates))
    }

    fn checked_type(&self, name: &str, category: TypeCategory) -> Result<&'a eavmeta_model::TypeDef, QueryError> {
        let def = self.types.get(name).ok_or_else(|| QueryError::UnknownType(name.to_string()))?;
        if def.category != category {
            return Err(QueryError::WrongCategory {
                name: name.to_string(),
                expected: category.as_str(),
            });
        }
        Ok(def)
    }

    /// Lifecycle restriction; injects "status != DELETED" by default.
    pub fn status_clauses(filter: &StatusFilter, record: &Var) -> Vec<Clause> {
        let deleted = || Clause::attr_eq(record, header::STATUS, EavValue::str("DELETED"));
        match filter {
            StatusFilter::All => Vec::new(),
            StatusFilter::Only(statuses) if !statuses.is_empty() => vec![or_join(
                statuses
                    .iter()
                    .map(|s| Clause::attr_eq(record, header::STATUS, EavValue::str(s.as_str())))
                    .collect(),
            )],
            _ => vec![Clause::Not(vec![deleted()])],
        }
    }

    /// Classification membership and classification property conditions.
    pub fn compile_classifications(&mut self, spec: &SearchClassifications, record: &Var) -> Vec<Clause> {
        let mut children: Vec<Vec<Clause>> = Vec::new();
        for condition in &spec.conditions {
            if self.types.get(&condition.name).map(|d| d.category) != Some(TypeCategory::Classification) {
                debug!(classification = %condition.name, "classification type not known");
            }
            let mut conjunct = vec![Clause::attr_eq(
                record,
                header::CLASSIFICATIONS,
                EavValue::str(&condition.name),
            )];
            if let Some(properties) = &condition.properties {
                let namespace = Namespace::ClassificationProperties(condition.name.clone());
                conjunct.extend(self.compile(properties, &namespace, &[condition.name.clone()], record));
            }
            children.push(conjunct);
        }
        if children.is_empty() {
            return Vec::new();
        }
        match spec.criteria {
            MatchCriteria::All => children.into_iter().flatten().collect(),
            MatchCriteria::Any => vec![Clause::Or(children.into_iter().map(Clause::conjunction).collect())],
            MatchCriteria::None => vec![Clause::Not(children.into_iter().flatten().collect())],
        }
    }

    /// Regex over every declared property of the candidate types.
    pub fn text_clause(
        &mut self,
        pattern: &str,
        namespace: &Namespace,
        candidates: &[String],
        record: &Var,
    ) -> Result<Clause, QueryError> {
        Regex::new(pattern).map_err(|e| QueryError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        let mut attributes: Vec<String> = Vec::new();
        for candidate in candidates {
            for property in self.types.legal_properties(candidate)? {
                for key in AttributeKey::resolve(self.types, namespace, &property.name, std::slice::from_ref(candidate)) {
                    let attribute = key.queryable();
                    if !attributes.contains(&attribute) {
                        attributes.push(attribute);
                    }
                }
            }
        }

        let bound = self.fresh();
        Ok(bind_and_test(record, &attributes, &bound, || Predicate::Matches {
            var: bound.clone(),
            pattern: pattern.to_string(),
        }))
    }

    pub fn sort_keys(&self, order: &SequencingOrder, namespace: &Namespace, candidates: &[String]) -> Vec<AttributeKey> {
        match order.property() {
            Some(property) => self.keys_for(namespace, property, candidates),
            None => Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Whole searches
    // -----------------------------------------------------------------------

    pub fn entity_search(&mut self, search: &EntitySearch, config: &QueryConfig) -> Result<CompiledQuery, QueryError> {
        let record = Var::new("e");
        let namespace = Namespace::EntityProperties;
        let (mut clauses, candidates) = self.type_clauses(search.type_filter.as_ref(), TypeCategory::Entity, &record)?;
        clauses.push(Clause::attr_eq(&record, header::IS_PROXY, EavValue::Bool(false)));
        clauses.extend(Self::status_clauses(&search.status, &record));
        if let Some(properties) = &search.properties {
            clauses.extend(self.compile(properties, &namespace, &candidates, &record));
        }
        if let Some(classifications) = &search.classifications {
            clauses.extend(self.compile_classifications(classifications, &record));
        }
        if let Some(text) = &search.text {
            clauses.push(self.text_clause(text, &namespace, &candidates, &record)?);
        }

        let mut query = ConstraintQuery::find(record.clone());
        query.extend(clauses);
        let sort_keys = self.sort_keys(&search.sequencing, &namespace, &candidates);
        sequencing::apply(&mut query, &record, &search.sequencing, &sort_keys, search.paging, config);

        Ok(CompiledQuery {
            query,
            record,
            diagnostics: self.take_diagnostics(),
        })
    }

    pub fn relationship_search(
        &mut self,
        search: &RelationshipSearch,
        config: &QueryConfig,
    ) -> Result<CompiledQuery, QueryError> {
        let record = Var::new("r");
        let (clauses, candidates) =
            self.type_clauses(search.type_filter.as_ref(), TypeCategory::Relationship, &record)?;
        self.finish_relationship_query(record, clauses, candidates, search, config)
    }

    /// Relationships with `entity` at either end, narrowed by `search`.
    pub fn relationships_for_entity(
        &mut self,
        entity: &RecordRef,
        search: &RelationshipSearch,
        config: &QueryConfig,
    ) -> Result<CompiledQuery, QueryError> {
        let record = Var::new("r");
        let (mut clauses, candidates) =
            self.type_clauses(search.type_filter.as_ref(), TypeCategory::Relationship, &record)?;
        let end = |attribute: &str| Clause::Pattern {
            entity: Term::Var(record.clone()),
            attribute: attribute.to_string(),
            value: Term::Const(EavValue::Ref(entity.doc_id())),
        };
        clauses.push(Clause::Or(vec![end(header::END_ONE), end(header::END_TWO)]));
        self.finish_relationship_query(record, clauses, candidates, search, config)
    }

    fn finish_relationship_query(
        &mut self,
        record: Var,
        mut clauses: Vec<Clause>,
        candidates: Vec<String>,
        search: &RelationshipSearch,
        config: &QueryConfig,
    ) -> Result<CompiledQuery, QueryError> {
        let namespace = Namespace::RelationshipProperties;
        clauses.extend(Self::status_clauses(&search.status, &record));
        if let Some(properties) = &search.properties {
            clauses.extend(self.compile(properties, &namespace, &candidates, &record));
        }
        if let Some(text) = &search.text {
            clauses.push(self.text_clause(text, &namespace, &candidates, &record)?);
        }

        let mut query = ConstraintQuery::find(record.clone());
        query.extend(clauses);
        let sort_keys = self.sort_keys(&search.sequencing, &namespace, &candidates);
        sequencing::apply(&mut query, &record, &search.sequencing, &sort_keys, search.paging, config);

        Ok(CompiledQuery {
            query,
            record,
            diagnostics: self.take_diagnostics(),
        })
    }
}

/// `[?record attribute ?bound]` plus a predicate on `?bound`, once per
/// attribute, OR-joined.
fn bind_and_test(record: &Var, attributes: &[String], bound: &Var, predicate: impl Fn() -> Predicate) -> Clause {
    or_join(
        attributes
            .iter()
            .map(|attribute| {
                Clause::And(vec![
                    Clause::attr_bind(record, attribute.clone(), bound),
                    Clause::Predicate(predicate()),
                ])
            })
            .collect(),
    )
}

fn or_join(mut branches: Vec<Clause>) -> Clause {
    if branches.len() == 1 {
        branches.remove(0)
    } else {
        Clause::Or(branches)
    }
}
