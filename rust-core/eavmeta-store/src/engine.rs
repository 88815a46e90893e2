// SPDX-License-Identifier: PMPL-1.0-or-later
//! Constraint-query evaluator.
//!
//! Bottom-up evaluation over sets of variable bindings. Each clause maps the
//! incoming binding set to an outgoing one: patterns extend or filter,
//! predicates filter, `Or` unions its branches, `Not` keeps the bindings for
//! which its body yields nothing. The evaluator is independent of how
//! documents are held; it only needs a [`DocumentSource`].

use regex::Regex;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::{Duration, Instant};

use crate::error::StoreError;
use crate::query::{Clause, CompareOp, ConstraintQuery, Direction, Predicate, QueryResult, Term, Var};
use crate::value::{DocId, Document, EavValue};

/// Read access to one consistent set of documents.
pub trait DocumentSource {
    /// Look up a single document.
    fn document(&self, id: &DocId) -> Option<&Document>;

    /// Iterate every visible document in key order.
    fn documents(&self) -> Box<dyn Iterator<Item = &Document> + '_>;
}

type Binding = BTreeMap<Var, EavValue>;

/// Evaluate a complete query, including projection, ordering and paging.
pub fn evaluate(source: &dyn DocumentSource, query: &ConstraintQuery) -> Result<QueryResult, StoreError> {
    let mut evaluator = Evaluator::new(source, query.timeout);
    let bindings = evaluator.eval_all(&query.clauses, vec![Binding::new()])?;

    let mut distinct: BTreeSet<Vec<EavValue>> = BTreeSet::new();
    for binding in &bindings {
        let mut row = Vec::with_capacity(query.find.len());
        for var in &query.find {
            let value = binding
                .get(var)
                .ok_or_else(|| StoreError::InvalidQuery(format!("find variable {var} is never bound")))?;
            row.push(value.clone());
        }
        distinct.insert(row);
    }

    let mut rows: Vec<Vec<EavValue>> = distinct.into_iter().collect();

    if !query.order_by.is_empty() {
        let mut keys = Vec::with_capacity(query.order_by.len());
        for key in &query.order_by {
            let idx = query
                .find
                .iter()
                .position(|v| v == &key.var)
                .ok_or_else(|| StoreError::InvalidQuery(format!("order variable {} is not projected", key.var)))?;
            keys.push((idx, key.direction));
        }
        // Stable sort: ties keep the key order of the first find variable.
        rows.sort_by(|a, b| {
            for (idx, direction) in &keys {
                let ord = order_values(&a[*idx], &b[*idx], *direction);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }

    let rows = rows
        .into_iter()
        .skip(query.offset)
        .take(query.limit.unwrap_or(usize::MAX))
        .collect();

    Ok(QueryResult {
        columns: query.find.clone(),
        rows,
    })
}

/// Nulls last regardless of direction.
fn order_values(a: &EavValue, b: &EavValue, direction: Direction) -> Ordering {
    let a = sort_scalar(a);
    let b = sort_scalar(b);
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            let ord = a.total_cmp(b);
            match direction {
                Direction::Asc => ord,
                Direction::Desc => ord.reverse(),
            }
        }
    }
}

/// Lists sort by their first element.
fn sort_scalar(value: &EavValue) -> &EavValue {
    match value {
        EavValue::List(items) => items.first().unwrap_or(value),
        other => other,
    }
}

struct Evaluator<'a> {
    source: &'a dyn DocumentSource,
    started: Instant,
    limit: Option<Duration>,
    regexes: HashMap<String, Regex>,
}

impl<'a> Evaluator<'a> {
    fn new(source: &'a dyn DocumentSource, limit: Option<Duration>) -> Self {
        Self {
            source,
            started: Instant::now(),
            limit,
            regexes: HashMap::new(),
        }
    }

    fn check_deadline(&self) -> Result<(), StoreError> {
        if let Some(limit) = self.limit {
            let elapsed = self.started.elapsed();
            if elapsed >= limit {
                return Err(StoreError::Timeout {
                    elapsed_ms: elapsed.as_millis() as u64,
                    limit_ms: limit.as_millis() as u64,
                });
            }
        }
        Ok(())
    }

    fn eval_all(&mut self, clauses: &[Clause], mut bindings: Vec<Binding>) -> Result<Vec<Binding>, StoreError> {
        for clause in clauses {
            if bindings.is_empty() {
                break;
            }
            bindings = self.eval(clause, bindings)?;
        }
        Ok(bindings)
    }

    fn eval(&mut self, clause: &Clause, bindings: Vec<Binding>) -> Result<Vec<Binding>, StoreError> {
        self.check_deadline()?;
        match clause {
            Clause::Pattern { entity, attribute, value } => {
                let mut out = Vec::new();
                for binding in bindings {
                    self.match_pattern(entity, attribute, value, &binding, &mut out)?;
                }
                Ok(out)
            }
            Clause::FirstOf { entity, attributes, bind } => {
                let mut out = Vec::with_capacity(bindings.len());
                for mut binding in bindings {
                    let id = match binding.get(entity) {
                        Some(EavValue::Ref(id)) => id.clone(),
                        Some(_) => continue,
                        None => {
                            return Err(StoreError::InvalidQuery(format!(
                                "first-of requires {entity} to be bound"
                            )))
                        }
                    };
                    let found = self.source.document(&id).and_then(|doc| {
                        attributes.iter().find_map(|attr| doc.get(attr)).cloned()
                    });
                    let found = found.unwrap_or(EavValue::Null);
                    match binding.get(bind) {
                        Some(existing) if existing != &found => continue,
                        Some(_) => out.push(binding),
                        None => {
                            binding.insert(bind.clone(), found);
                            out.push(binding);
                        }
                    }
                }
                Ok(out)
            }
            Clause::Predicate(predicate) => {
                let mut out = Vec::with_capacity(bindings.len());
                for binding in bindings {
                    if self.test_predicate(predicate, &binding)? {
                        out.push(binding);
                    }
                }
                Ok(out)
            }
            Clause::And(clauses) => self.eval_all(clauses, bindings),
            Clause::Or(branches) => {
                let mut out = Vec::new();
                for branch in branches {
                    out.extend(self.eval(branch, bindings.clone())?);
                }
                Ok(out)
            }
            Clause::Not(clauses) => {
                let mut out = Vec::with_capacity(bindings.len());
                for binding in bindings {
                    if self.eval_all(clauses, vec![binding.clone()])?.is_empty() {
                        out.push(binding);
                    }
                }
                Ok(out)
            }
            Clause::In { var, values } => {
                let mut out = Vec::new();
                for binding in bindings {
                    match binding.get(var) {
                        Some(bound) => {
                            if values.contains(bound) {
                                out.push(binding);
                            }
                        }
                        None => {
                            for value in values {
                                let mut extended = binding.clone();
                                extended.insert(var.clone(), value.clone());
                                out.push(extended);
                            }
                        }
                    }
                }
                Ok(out)
            }
        }
    }

    fn match_pattern(
        &self,
        entity: &Term,
        attribute: &str,
        value: &Term,
        binding: &Binding,
        out: &mut Vec<Binding>,
    ) -> Result<(), StoreError> {
        let (entity_var, candidates): (Option<&Var>, Vec<&Document>) = match entity {
            Term::Var(var) => match binding.get(var) {
                Some(EavValue::Ref(id)) => (None, self.source.document(id).into_iter().collect()),
                Some(_) => (None, Vec::new()),
                None => (Some(var), self.source.documents().collect()),
            },
            Term::Const(EavValue::Ref(id)) => (None, self.source.document(id).into_iter().collect()),
            Term::Const(_) => (None, Vec::new()),
        };

        for doc in candidates {
            self.check_deadline()?;
            let Some(stored) = doc.get(attribute) else {
                continue;
            };
            for element in stored.elements() {
                let mut extended = match value {
                    Term::Const(expected) => {
                        if element != expected {
                            continue;
                        }
                        binding.clone()
                    }
                    Term::Var(var) => match binding.get(var) {
                        Some(bound) => {
                            if element != bound {
                                continue;
                            }
                            binding.clone()
                        }
                        None => {
                            let mut b = binding.clone();
                            b.insert(var.clone(), element.clone());
                            b
                        }
                    },
                };
                if let Some(var) = entity_var {
                    extended.insert(var.clone(), EavValue::Ref(doc.id.clone()));
                }
                out.push(extended);
            }
        }
        Ok(())
    }

    fn test_predicate(&mut self, predicate: &Predicate, binding: &Binding) -> Result<bool, StoreError> {
        let lookup = |var: &Var| {
            binding
                .get(var)
                .ok_or_else(|| StoreError::InvalidQuery(format!("predicate variable {var} is unbound")))
        };
        match predicate {
            Predicate::Compare { op, var, value } => {
                let bound = lookup(var)?;
                Ok(bound.elements().into_iter().any(|el| compare_satisfies(*op, el, value)))
            }
            Predicate::Matches { var, pattern } => {
                let bound = lookup(var)?.clone();
                let regex = self.regex(pattern)?;
                Ok(bound
                    .elements()
                    .into_iter()
                    .any(|el| el.as_str().is_some_and(|s| regex.is_match(s))))
            }
            Predicate::IsNull(var) => Ok(lookup(var)?.is_null()),
            Predicate::NotNull(var) => Ok(!lookup(var)?.is_null()),
        }
    }

    fn regex(&mut self, pattern: &str) -> Result<&Regex, StoreError> {
        if !self.regexes.contains_key(pattern) {
            let anchored = format!("^(?:{pattern})$");
            let compiled = Regex::new(&anchored)
                .map_err(|e| StoreError::InvalidQuery(format!("invalid pattern {pattern:?}: {e}")))?;
            self.regexes.insert(pattern.to_string(), compiled);
        }
        self.regexes
            .get(pattern)
            .ok_or_else(|| StoreError::InvalidQuery(format!("pattern cache miss for {pattern:?}")))
    }
}

fn compare_satisfies(op: CompareOp, left: &EavValue, right: &EavValue) -> bool {
    match op {
        CompareOp::Eq => left == right,
        CompareOp::Ne => left != right,
        _ => match left.compare(right) {
            Some(ord) => match op {
                CompareOp::Gt => ord == Ordering::Greater,
                CompareOp::Gte => ord != Ordering::Less,
                CompareOp::Lt => ord == Ordering::Less,
                CompareOp::Lte => ord != Ordering::Greater,
                CompareOp::Eq | CompareOp::Ne => false,
            },
            None => false,
        },
    }
}

/// A plain in-memory [`DocumentSource`] over a map, used by tests and by
/// callers that already hold the documents.
#[derive(Debug, Default, Clone)]
pub struct DocumentSet {
    docs: BTreeMap<DocId, Document>,
}

impl DocumentSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, doc: Document) {
        self.docs.insert(doc.id.clone(), doc);
    }
}

impl FromIterator<Document> for DocumentSet {
    fn from_iter<I: IntoIterator<Item = Document>>(iter: I) -> Self {
        let mut set = DocumentSet::new();
        for doc in iter {
            set.insert(doc);
        }
        set
    }
}

impl DocumentSource for DocumentSet {
    fn document(&self, id: &DocId) -> Option<&Document> {
        self.docs.get(id)
    }

    fn documents(&self) -> Box<dyn Iterator<Item = &Document> + '_> {
        Box::new(self.docs.values())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::OrderKey;

    fn doc(id: &str, attrs: &[(&str, EavValue)]) -> Document {
        let mut d = Document::new(DocId::new(id));
        for (k, v) in attrs {
            d.set(*k, v.clone());
        }
        d
    }

    fn sample() -> DocumentSet {
        vec![
            doc("e:1", &[("a", EavValue::Int(1)), ("b", EavValue::Int(2)), ("name", EavValue::str("alpha"))]),
            doc("e:2", &[("a", EavValue::Int(1)), ("name", EavValue::str("beta"))]),
            doc("e:3", &[("c", EavValue::Int(3)), ("tags", EavValue::List(vec![EavValue::str("x"), EavValue::str("y")]))]),
            doc("r:1", &[("end1", EavValue::Ref(DocId::new("e:1"))), ("end2", EavValue::Ref(DocId::new("e:2")))]),
        ]
        .into_iter()
        .collect()
    }

    fn ids(result: &QueryResult) -> Vec<String> {
        result.refs(&Var::new("e")).into_iter().map(|d| d.0).collect()
    }

    #[test]
    fn test_conjunctive_patterns() {
        let e = Var::new("e");
        let q = ConstraintQuery::find(e.clone())
            .with_clause(Clause::attr_eq(&e, "a", EavValue::Int(1)))
            .with_clause(Clause::attr_eq(&e, "b", EavValue::Int(2)));
        assert_eq!(ids(&evaluate(&sample(), &q).unwrap()), vec!["e:1"]);
    }

    #[test]
    fn test_or_with_nested_and() {
        let e = Var::new("e");
        let q = ConstraintQuery::find(e.clone()).with_clause(Clause::Or(vec![
            Clause::And(vec![
                Clause::attr_eq(&e, "a", EavValue::Int(1)),
                Clause::attr_eq(&e, "b", EavValue::Int(2)),
            ]),
            Clause::attr_eq(&e, "c", EavValue::Int(3)),
        ]));
        assert_eq!(ids(&evaluate(&sample(), &q).unwrap()), vec!["e:1", "e:3"]);
    }

    #[test]
    fn test_not_filters_bound_entities() {
        let e = Var::new("e");
        let v = Var::new("n");
        let q = ConstraintQuery::find(e.clone())
            .with_clause(Clause::attr_bind(&e, "name", &v))
            .with_clause(Clause::Not(vec![Clause::attr_eq(&e, "b", EavValue::Int(2))]));
        assert_eq!(ids(&evaluate(&sample(), &q).unwrap()), vec!["e:2"]);
    }

    #[test]
    fn test_list_attribute_matches_elementwise() {
        let e = Var::new("e");
        let q = ConstraintQuery::find(e.clone()).with_clause(Clause::attr_eq(&e, "tags", EavValue::str("y")));
        assert_eq!(ids(&evaluate(&sample(), &q).unwrap()), vec!["e:3"]);
    }

    #[test]
    fn test_regex_is_whole_value_match() {
        let e = Var::new("e");
        let v = Var::new("v");
        let q = ConstraintQuery::find(e.clone())
            .with_clause(Clause::attr_bind(&e, "name", &v))
            .with_clause(Clause::Predicate(Predicate::Matches { var: v.clone(), pattern: "alp".into() }));
        assert!(evaluate(&sample(), &q).unwrap().is_empty());

        let q = ConstraintQuery::find(e.clone())
            .with_clause(Clause::attr_bind(&e, "name", &v))
            .with_clause(Clause::Predicate(Predicate::Matches { var: v, pattern: "alp.*".into() }));
        assert_eq!(ids(&evaluate(&sample(), &q).unwrap()), vec!["e:1"]);
    }

    #[test]
    fn test_first_of_binds_null_when_absent() {
        let e = Var::new("e");
        let v = Var::new("v");
        let q = ConstraintQuery::find(e.clone())
            .with_clause(Clause::In {
                var: e.clone(),
                values: vec![EavValue::Ref(DocId::new("e:1")), EavValue::Ref(DocId::new("e:2"))],
            })
            .with_clause(Clause::FirstOf { entity: e.clone(), attributes: vec!["b".into()], bind: v.clone() })
            .with_clause(Clause::Predicate(Predicate::IsNull(v)));
        assert_eq!(ids(&evaluate(&sample(), &q).unwrap()), vec!["e:2"]);
    }

    #[test]
    fn test_join_through_reference() {
        let r = Var::new("r");
        let e = Var::new("e");
        let q = ConstraintQuery::find(e.clone())
            .with_clause(Clause::Pattern {
                entity: Term::Var(r.clone()),
                attribute: "end1".into(),
                value: Term::Const(EavValue::Ref(DocId::new("e:1"))),
            })
            .with_clause(Clause::attr_bind(&r, "end2", &e));
        assert_eq!(ids(&evaluate(&sample(), &q).unwrap()), vec!["e:2"]);
    }

    #[test]
    fn test_order_offset_limit() {
        let e = Var::new("e");
        let n = Var::new("n");
        let mut q = ConstraintQuery::find(e.clone()).with_clause(Clause::attr_bind(&e, "name", &n));
        q.project(&n);
        q.order_by.push(OrderKey { var: n, direction: Direction::Desc });
        q.limit = Some(1);
        assert_eq!(ids(&evaluate(&sample(), &q).unwrap()), vec!["e:2"]);
        q.offset = 1;
        assert_eq!(ids(&evaluate(&sample(), &q).unwrap()), vec!["e:1"]);
    }

    #[test]
    fn test_unbound_predicate_is_invalid() {
        let e = Var::new("e");
        let q = ConstraintQuery::find(e.clone())
            .with_clause(Clause::attr_eq(&e, "a", EavValue::Int(1)))
            .with_clause(Clause::Predicate(Predicate::IsNull(Var::new("missing"))));
        assert!(matches!(evaluate(&sample(), &q), Err(StoreError::InvalidQuery(_))));
    }

    #[test]
    fn test_zero_timeout_expires() {
        let e = Var::new("e");
        let mut q = ConstraintQuery::find(e.clone()).with_clause(Clause::attr_eq(&e, "a", EavValue::Int(1)));
        q.timeout = Some(Duration::ZERO);
        assert!(matches!(evaluate(&sample(), &q), Err(StoreError::Timeout { .. })));
    }
}
