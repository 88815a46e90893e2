// SPDX-License-Identifier: PMPL-1.0-or-later
//! Constraint-query programs.
//!
//! A [`ConstraintQuery`] is a declarative program in the Datalog style: a set
//! of tuple patterns over `(document, attribute, value)`, predicates over bound
//! variables, and the boolean combinators `And`, `Or` and `Not`. The store
//! evaluates it against a snapshot and returns the distinct rows of the `find`
//! variables.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::value::EavValue;

/// A logic variable, written `?name`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Var(pub String);

impl Var {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        if name.starts_with('?') {
            Self(name)
        } else {
            Self(format!("?{name}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of a pattern: either a variable or a constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Term {
    Var(Var),
    Const(EavValue),
}

impl Term {
    pub fn var(name: impl Into<String>) -> Self {
        Term::Var(Var::new(name))
    }
}

impl From<Var> for Term {
    fn from(v: Var) -> Self {
        Term::Var(v)
    }
}

impl From<EavValue> for Term {
    fn from(v: EavValue) -> Self {
        Term::Const(v)
    }
}

/// Comparison operators usable in a [`Predicate::Compare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "not=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
        }
    }
}

/// A predicate over an already-bound variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// Numeric / lexicographic / temporal comparison with a constant.
    /// Incomparable kinds never satisfy the predicate.
    Compare { op: CompareOp, var: Var, value: EavValue },
    /// Regular-expression match against a string value (whole-value match).
    Matches { var: Var, pattern: String },
    /// Value is `Null` or an empty list.
    IsNull(Var),
    /// Value is neither `Null` nor an empty list.
    NotNull(Var),
}

/// One constraint of a query body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Clause {
    /// `[entity attribute value]` tuple pattern. A list-valued attribute
    /// matches element-wise.
    Pattern {
        entity: Term,
        attribute: String,
        value: Term,
    },
    /// Bind `bind` to the value of the first attribute in `attributes` that
    /// is present on `entity`, or to `Null` when none is. Never filters.
    FirstOf {
        entity: Var,
        attributes: Vec<String>,
        bind: Var,
    },
    Predicate(Predicate),
    /// Conjunction; used to preserve scoping inside `Or` / `Not`.
    And(Vec<Clause>),
    /// Disjunction: union of the bindings produced by each branch.
    Or(Vec<Clause>),
    /// Negation of the conjunction of the enclosed clauses.
    Not(Vec<Clause>),
    /// Restrict (or bind) a variable to a fixed collection of values.
    In { var: Var, values: Vec<EavValue> },
}

impl Clause {
    /// `[?e attribute value]` with a constant value.
    pub fn attr_eq(entity: &Var, attribute: impl Into<String>, value: EavValue) -> Self {
        Clause::Pattern {
            entity: Term::Var(entity.clone()),
            attribute: attribute.into(),
            value: Term::Const(value),
        }
    }

    /// `[?e attribute ?v]`.
    pub fn attr_bind(entity: &Var, attribute: impl Into<String>, bind: &Var) -> Self {
        Clause::Pattern {
            entity: Term::Var(entity.clone()),
            attribute: attribute.into(),
            value: Term::Var(bind.clone()),
        }
    }

    /// Wrap several clauses in an `And` unless there is exactly one.
    pub fn conjunction(mut clauses: Vec<Clause>) -> Self {
        if clauses.len() == 1 {
            clauses.remove(0)
        } else {
            Clause::And(clauses)
        }
    }
}

/// Sort direction for an [`OrderKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

/// Sort on one of the `find` variables. `Null` values always sort last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderKey {
    pub var: Var,
    pub direction: Direction,
}

/// A complete constraint program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintQuery {
    /// Variables projected into each result row.
    pub find: Vec<Var>,
    /// Conjunctive body.
    pub clauses: Vec<Clause>,
    /// Sort keys; each must also appear in `find`.
    pub order_by: Vec<OrderKey>,
    pub offset: usize,
    pub limit: Option<usize>,
    /// Evaluation deadline.
    #[serde(default)]
    pub timeout: Option<Duration>,
}

impl ConstraintQuery {
    /// An empty program projecting the given variable.
    pub fn find(var: Var) -> Self {
        Self {
            find: vec![var],
            clauses: Vec::new(),
            order_by: Vec::new(),
            offset: 0,
            limit: None,
            timeout: None,
        }
    }

    /// Builder-style clause append.
    pub fn with_clause(mut self, clause: Clause) -> Self {
        self.clauses.push(clause);
        self
    }

    pub fn push(&mut self, clause: Clause) {
        self.clauses.push(clause);
    }

    pub fn extend(&mut self, clauses: impl IntoIterator<Item = Clause>) {
        self.clauses.extend(clauses);
    }

    /// Add a projected variable unless already present.
    pub fn project(&mut self, var: &Var) {
        if !self.find.contains(var) {
            self.find.push(var.clone());
        }
    }
}

/// Rows returned by a query, one value per `find` variable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<Var>,
    pub rows: Vec<Vec<EavValue>>,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one column in row order.
    pub fn column(&self, var: &Var) -> Vec<EavValue> {
        match self.columns.iter().position(|c| c == var) {
            Some(idx) => self.rows.iter().map(|row| row[idx].clone()).collect(),
            None => Vec::new(),
        }
    }

    /// Document references of one column in row order, skipping non-refs.
    pub fn refs(&self, var: &Var) -> Vec<crate::value::DocId> {
        self.column(var)
            .into_iter()
            .filter_map(|v| match v {
                EavValue::Ref(id) => Some(id),
                _ => None,
            })
            .collect()
    }
}
