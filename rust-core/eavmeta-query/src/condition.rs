// SPDX-License-Identifier: PMPL-1.0-or-later
//! Structured search specifications.

use chrono::{DateTime, Utc};
use eavmeta_model::{InstanceStatus, PropertyValue};
use serde::{Deserialize, Serialize};

use crate::sequencing::{Paging, SequencingOrder};

/// Boolean combinator of an interior node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchCriteria {
    /// Every child must hold.
    #[default]
    All,
    /// At least one child must hold.
    Any,
    /// The conjunction of the children must not hold.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Comparator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Regular-expression match over the whole value.
    Like,
    IsNull,
    NotNull,
}

/// Leaf: one comparison against one property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyCondition {
    pub property: String,
    pub operator: Comparator,
    /// Absent for `IS_NULL` / `NOT_NULL`.
    #[serde(default)]
    pub value: Option<PropertyValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchCondition {
    Property(PropertyCondition),
    Nested(SearchProperties),
}

impl SearchCondition {
    pub fn property(property: impl Into<String>, operator: Comparator, value: Option<PropertyValue>) -> Self {
        Self::Property(PropertyCondition {
            property: property.into(),
            operator,
            value,
        })
    }

    pub fn eq(property: impl Into<String>, value: PropertyValue) -> Self {
        Self::property(property, Comparator::Eq, Some(value))
    }
}

/// Interior node: a combinator over child conditions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchProperties {
    pub criteria: MatchCriteria,
    pub conditions: Vec<SearchCondition>,
}

impl SearchProperties {
    pub fn new(criteria: MatchCriteria, conditions: Vec<SearchCondition>) -> Self {
        Self { criteria, conditions }
    }

    pub fn all(conditions: Vec<SearchCondition>) -> Self {
        Self::new(MatchCriteria::All, conditions)
    }

    pub fn any(conditions: Vec<SearchCondition>) -> Self {
        Self::new(MatchCriteria::Any, conditions)
    }

    pub fn none(conditions: Vec<SearchCondition>) -> Self {
        Self::new(MatchCriteria::None, conditions)
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

/// Membership in one classification, optionally with conditions on its
/// properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationCondition {
    pub name: String,
    #[serde(default)]
    pub properties: Option<SearchProperties>,
}

impl ClassificationCondition {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchClassifications {
    pub criteria: MatchCriteria,
    pub conditions: Vec<ClassificationCondition>,
}

/// Restriction on the type of matched records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeFilter {
    /// This type or any of its descendants.
    Subtypes(String),
    /// Exactly these types.
    AnyOf(Vec<String>),
}

/// Restriction on lifecycle status.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    /// Everything except DELETED.
    #[default]
    Default,
    /// Only the listed statuses. An empty list behaves like `Default`.
    Only(Vec<InstanceStatus>),
    /// Every status, DELETED included.
    All,
}

/// A complete entity search.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EntitySearch {
    pub type_filter: Option<TypeFilter>,
    pub properties: Option<SearchProperties>,
    pub classifications: Option<SearchClassifications>,
    /// Regex matched against every string property of the candidate types.
    pub text: Option<String>,
    pub status: StatusFilter,
    pub as_of: Option<DateTime<Utc>>,
    pub sequencing: SequencingOrder,
    pub paging: Paging,
}

/// A complete relationship search.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationshipSearch {
    pub type_filter: Option<TypeFilter>,
    pub properties: Option<SearchProperties>,
    pub text: Option<String>,
    pub status: StatusFilter,
    pub as_of: Option<DateTime<Utc>>,
    pub sequencing: SequencingOrder,
    pub paging: Paging,
}

/// A reachability query rooted at one entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphQuery {
    /// GUID of the root entity.
    pub root: String,
    pub relationship_types: Option<TypeFilter>,
    pub entity_types: Option<TypeFilter>,
    /// Keep only entities holding at least one of these classifications.
    pub classifications: Vec<String>,
    pub status: StatusFilter,
    /// Requested hop count; clamped to the configured ceiling.
    pub max_depth: Option<u32>,
    pub as_of: Option<DateTime<Utc>>,
    pub sequencing: SequencingOrder,
    pub paging: Paging,
}

impl GraphQuery {
    pub fn from_root(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_tree_json() {
        let tree = SearchProperties::any(vec![
            SearchCondition::Nested(SearchProperties::all(vec![
                SearchCondition::eq("a", PropertyValue::int(1)),
                SearchCondition::eq("b", PropertyValue::int(2)),
            ])),
            SearchCondition::property("c", Comparator::IsNull, None),
        ]);
        let json = serde_json::to_string(&tree).unwrap();
        assert!(json.contains("\"ANY\""));
        assert!(json.contains("\"IS_NULL\""));
        let back: SearchProperties = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tree);
    }

    #[test]
    fn test_search_defaults() {
        let search: EntitySearch = serde_json::from_str("{}").unwrap();
        assert_eq!(search.status, StatusFilter::Default);
        assert!(search.type_filter.is_none());
    }
}
