// SPDX-License-Identifier: PMPL-1.0-or-later
//! Document and value model of the EAV store.
//!
//! A [`Document`] is a flat map of attribute name to [`EavValue`]. List values
//! are cardinality-many attributes: a pattern constraint matches a list when
//! any of its elements matches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Stable key of a document in the store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocId(pub String);

impl DocId {
    /// Create a document id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string reference
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DocId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A single attribute value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
pub enum EavValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Time(DateTime<Utc>),
    Ref(DocId),
    List(Vec<EavValue>),
}

impl EavValue {
    /// Shorthand for a string value.
    pub fn str(s: impl Into<String>) -> Self {
        Self::Str(s.into())
    }

    /// `true` for `Null` and for an empty list.
    pub fn is_null(&self) -> bool {
        match self {
            EavValue::Null => true,
            EavValue::List(items) => items.is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            EavValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            EavValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            EavValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            EavValue::Time(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_ref_id(&self) -> Option<&DocId> {
        match self {
            EavValue::Ref(id) => Some(id),
            _ => None,
        }
    }

    /// The elements a pattern constraint is matched against: the list items
    /// for a list, the value itself otherwise.
    pub fn elements(&self) -> Vec<&EavValue> {
        match self {
            EavValue::List(items) => items.iter().collect(),
            other => vec![other],
        }
    }

    /// Ordering between two values of comparable kinds.
    ///
    /// Integers and floats compare numerically; strings, times, booleans and
    /// references compare within their own kind. Anything else (including
    /// `Null`) is incomparable and yields `None`.
    pub fn compare(&self, other: &EavValue) -> Option<Ordering> {
        match (self, other) {
            (EavValue::Int(a), EavValue::Int(b)) => Some(a.cmp(b)),
            (EavValue::Int(a), EavValue::Float(b)) => (!b.is_nan()).then(|| cmp_int_float(*a, *b)),
            (EavValue::Float(a), EavValue::Int(b)) => (!a.is_nan()).then(|| cmp_int_float(*b, *a).reverse()),
            (EavValue::Float(a), EavValue::Float(b)) => a.partial_cmp(b),
            (EavValue::Str(a), EavValue::Str(b)) => Some(a.cmp(b)),
            (EavValue::Time(a), EavValue::Time(b)) => Some(a.cmp(b)),
            (EavValue::Bool(a), EavValue::Bool(b)) => Some(a.cmp(b)),
            (EavValue::Ref(a), EavValue::Ref(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            EavValue::Null => 0,
            EavValue::Bool(_) => 1,
            EavValue::Int(_) | EavValue::Float(_) => 2,
            EavValue::Str(_) => 3,
            EavValue::Time(_) => 4,
            EavValue::Ref(_) => 5,
            EavValue::List(_) => 6,
        }
    }

    /// Total order used for de-duplication and deterministic sorting.
    pub fn total_cmp(&self, other: &EavValue) -> Ordering {
        match (self, other) {
            (EavValue::Float(a), EavValue::Float(b)) => a.total_cmp(b),
            (EavValue::Int(a), EavValue::Float(b)) => cmp_int_float(*a, *b),
            (EavValue::Float(a), EavValue::Int(b)) => cmp_int_float(*b, *a).reverse(),
            (EavValue::List(a), EavValue::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.total_cmp(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (a, b) if a.rank() == b.rank() => a.compare(b).unwrap_or(Ordering::Equal),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

/// Exact ordering of an integer against a float, without rounding the
/// integer. NaN sorts by sign, as in `f64::total_cmp`.
fn cmp_int_float(int: i64, float: f64) -> Ordering {
    // 2^63, exactly representable.
    const BOUND: f64 = 9_223_372_036_854_775_808.0;
    if float.is_nan() {
        return if float.is_sign_negative() { Ordering::Greater } else { Ordering::Less };
    }
    if float >= BOUND {
        return Ordering::Less;
    }
    if float < -BOUND {
        return Ordering::Greater;
    }
    let whole = float.trunc();
    match int.cmp(&(whole as i64)) {
        Ordering::Equal => 0.0_f64.partial_cmp(&(float - whole)).unwrap_or(Ordering::Equal),
        unequal => unequal,
    }
}

impl PartialEq for EavValue {
    fn eq(&self, other: &Self) -> bool {
        self.total_cmp(other) == Ordering::Equal
    }
}

impl Eq for EavValue {}

impl PartialOrd for EavValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EavValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.total_cmp(other)
    }
}

impl fmt::Display for EavValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EavValue::Null => write!(f, "nil"),
            EavValue::Bool(b) => write!(f, "{b}"),
            EavValue::Int(i) => write!(f, "{i}"),
            EavValue::Float(v) => write!(f, "{v}"),
            EavValue::Str(s) => write!(f, "\"{s}\""),
            EavValue::Time(t) => write!(f, "#inst \"{}\"", t.to_rfc3339()),
            EavValue::Ref(id) => write!(f, "#ref {id}"),
            EavValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// A full document version: its key plus every attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub attributes: BTreeMap<String, EavValue>,
}

impl Document {
    /// Create an empty document.
    pub fn new(id: DocId) -> Self {
        Self {
            id,
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with(mut self, attribute: impl Into<String>, value: EavValue) -> Self {
        self.set(attribute, value);
        self
    }

    /// Set an attribute. `Null` values are not stored.
    pub fn set(&mut self, attribute: impl Into<String>, value: EavValue) {
        let attribute = attribute.into();
        if matches!(value, EavValue::Null) {
            self.attributes.remove(&attribute);
        } else {
            self.attributes.insert(attribute, value);
        }
    }

    pub fn get(&self, attribute: &str) -> Option<&EavValue> {
        self.attributes.get(attribute)
    }

    pub fn remove(&mut self, attribute: &str) -> Option<EavValue> {
        self.attributes.remove(attribute)
    }

    /// Remove every attribute whose name starts with `prefix`.
    pub fn remove_prefixed(&mut self, prefix: &str) -> usize {
        let before = self.attributes.len();
        self.attributes.retain(|k, _| !k.starts_with(prefix));
        before - self.attributes.len()
    }

    /// Iterate attributes whose name starts with `prefix`.
    pub fn prefixed<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a String, &'a EavValue)> {
        self.attributes
            .range(prefix.to_string()..)
            .take_while(move |(k, _)| k.starts_with(prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_cross_comparison() {
        assert_eq!(EavValue::Int(2).compare(&EavValue::Float(1.5)), Some(Ordering::Greater));
        assert_eq!(EavValue::Float(2.0), EavValue::Int(2));
    }

    #[test]
    fn test_large_int_float_order_is_exact() {
        let two_53 = 9_007_199_254_740_992_i64;
        let above = EavValue::Int(two_53 + 1);
        let float = EavValue::Float(two_53 as f64);
        assert_eq!(above.total_cmp(&float), Ordering::Greater);
        assert_eq!(float.total_cmp(&above), Ordering::Less);
        assert_eq!(above.compare(&float), Some(Ordering::Greater));
        assert_eq!(EavValue::Int(two_53), float);

        let mut values = vec![above.clone(), float.clone(), EavValue::Int(two_53 - 1), EavValue::Float(-0.5)];
        values.sort();
        assert_eq!(values, vec![EavValue::Float(-0.5), EavValue::Int(two_53 - 1), float, above]);
    }

    #[test]
    fn test_int_float_edges() {
        assert_eq!(EavValue::Int(i64::MAX).total_cmp(&EavValue::Float(f64::INFINITY)), Ordering::Less);
        assert_eq!(EavValue::Int(i64::MAX).total_cmp(&EavValue::Float(9.3e18)), Ordering::Less);
        assert_eq!(EavValue::Int(i64::MIN).total_cmp(&EavValue::Float(-9.3e18)), Ordering::Greater);
        assert_eq!(EavValue::Int(i64::MIN), EavValue::Float(-9_223_372_036_854_775_808.0));
        assert_eq!(EavValue::Int(-3).total_cmp(&EavValue::Float(-2.5)), Ordering::Less);
        assert_eq!(EavValue::Int(-2).total_cmp(&EavValue::Float(-2.5)), Ordering::Greater);
        assert_eq!(EavValue::Int(1).compare(&EavValue::Float(f64::NAN)), None);
    }

    #[test]
    fn test_incomparable_kinds() {
        assert_eq!(EavValue::str("a").compare(&EavValue::Int(1)), None);
        assert_eq!(EavValue::Null.compare(&EavValue::Null), None);
    }

    #[test]
    fn test_null_and_empty_list_are_null() {
        assert!(EavValue::Null.is_null());
        assert!(EavValue::List(vec![]).is_null());
        assert!(!EavValue::List(vec![EavValue::Int(1)]).is_null());
    }

    #[test]
    fn test_document_null_set_removes() {
        let mut doc = Document::new(DocId::new("e:1")).with("a", EavValue::Int(1));
        doc.set("a", EavValue::Null);
        assert!(doc.get("a").is_none());
    }

    #[test]
    fn test_prefixed_iteration_and_removal() {
        let mut doc = Document::new(DocId::new("e:1"))
            .with("props/A.x", EavValue::Int(1))
            .with("props/A.y", EavValue::Int(2))
            .with("status", EavValue::str("ACTIVE"));
        assert_eq!(doc.prefixed("props/").count(), 2);
        assert_eq!(doc.remove_prefixed("props/"), 2);
        assert_eq!(doc.attributes.len(), 1);
    }

    #[test]
    fn test_value_serde_roundtrip() {
        let value = EavValue::List(vec![EavValue::Ref(DocId::new("e:1")), EavValue::Float(0.5)]);
        let json = serde_json::to_string(&value).unwrap();
        let parsed: EavValue = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, value);
    }
}
