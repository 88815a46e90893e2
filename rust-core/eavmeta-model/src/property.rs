// SPDX-License-Identifier: PMPL-1.0-or-later
//! Typed property values.
//!
//! [`PropertyValue`] is a closed sum over the property categories. Every
//! value has two stored forms: a lossless serialized form used to rebuild
//! the record, and a flattened [`EavValue`] used for matching. Both are
//! derived here so that callers can never write one without the other.

use chrono::{DateTime, Utc};
use eavmeta_store::EavValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ModelError;

/// Property bag keyed by property name.
pub type InstanceProperties = BTreeMap<String, PropertyValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PrimitiveValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Date(DateTime<Utc>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum PropertyValue {
    Primitive { value: PrimitiveValue },
    Enum {
        ordinal: i32,
        symbolic_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Array { items: Vec<PropertyValue> },
    Map { entries: BTreeMap<String, PropertyValue> },
    Struct {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        type_name: Option<String>,
        fields: BTreeMap<String, PropertyValue>,
    },
}

impl PropertyValue {
    pub fn string(s: impl Into<String>) -> Self {
        Self::Primitive { value: PrimitiveValue::String(s.into()) }
    }

    pub fn int(i: i64) -> Self {
        Self::Primitive { value: PrimitiveValue::Int(i) }
    }

    pub fn float(f: f64) -> Self {
        Self::Primitive { value: PrimitiveValue::Float(f) }
    }

    pub fn bool(b: bool) -> Self {
        Self::Primitive { value: PrimitiveValue::Bool(b) }
    }

    pub fn date(d: DateTime<Utc>) -> Self {
        Self::Primitive { value: PrimitiveValue::Date(d) }
    }

    pub fn enumeration(ordinal: i32, symbolic_name: impl Into<String>) -> Self {
        Self::Enum {
            ordinal,
            symbolic_name: symbolic_name.into(),
            description: None,
        }
    }

    pub fn array(items: Vec<PropertyValue>) -> Self {
        Self::Array { items }
    }

    /// The queryable projection.
    ///
    /// Enums project to their symbolic name. Collections project to the
    /// flat list of their scalar leaves so that pattern matching finds any
    /// contained value.
    pub fn flatten(&self) -> EavValue {
        match self {
            PropertyValue::Primitive { value } => value.flatten(),
            PropertyValue::Enum { symbolic_name, .. } => EavValue::Str(symbolic_name.clone()),
            _ => {
                let mut leaves = Vec::new();
                self.collect_leaves(&mut leaves);
                EavValue::List(leaves)
            }
        }
    }

    fn collect_leaves(&self, out: &mut Vec<EavValue>) {
        match self {
            PropertyValue::Array { items } => items.iter().for_each(|v| v.collect_leaves(out)),
            PropertyValue::Map { entries } => entries.values().for_each(|v| v.collect_leaves(out)),
            PropertyValue::Struct { fields, .. } => fields.values().for_each(|v| v.collect_leaves(out)),
            scalar => out.push(scalar.flatten()),
        }
    }

    /// Whether this is a string-valued scalar (text search targets).
    pub fn is_string(&self) -> bool {
        matches!(self, PropertyValue::Primitive { value: PrimitiveValue::String(_) })
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Primitive { value: PrimitiveValue::String(s) } => Some(s),
            PropertyValue::Enum { symbolic_name, .. } => Some(symbolic_name),
            _ => None,
        }
    }

    /// Lossless stored form.
    pub fn to_stored(&self) -> Result<EavValue, ModelError> {
        Ok(EavValue::Str(serde_json::to_string(self)?))
    }

    pub fn from_stored(value: &EavValue) -> Result<Self, ModelError> {
        match value {
            EavValue::Str(json) => Ok(serde_json::from_str(json)?),
            other => Err(ModelError::mapping("property", format!("serialized form is not a string: {other}"))),
        }
    }
}

impl PrimitiveValue {
    fn flatten(&self) -> EavValue {
        match self {
            PrimitiveValue::Bool(b) => EavValue::Bool(*b),
            PrimitiveValue::Int(i) => EavValue::Int(*i),
            PrimitiveValue::Float(f) => EavValue::Float(*f),
            PrimitiveValue::String(s) => EavValue::Str(s.clone()),
            PrimitiveValue::Date(d) => EavValue::Time(*d),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_flattens_to_symbolic_name() {
        assert_eq!(PropertyValue::enumeration(2, "Confidential").flatten(), EavValue::str("Confidential"));
    }

    #[test]
    fn test_nested_collections_flatten_to_leaves() {
        let mut entries = BTreeMap::new();
        entries.insert("k".to_string(), PropertyValue::array(vec![PropertyValue::int(1), PropertyValue::int(2)]));
        entries.insert("z".to_string(), PropertyValue::string("x"));
        let value = PropertyValue::Map { entries };
        assert_eq!(
            value.flatten(),
            EavValue::List(vec![EavValue::Int(1), EavValue::Int(2), EavValue::str("x")])
        );
    }

    #[test]
    fn test_stored_form_roundtrip() {
        let mut fields = BTreeMap::new();
        fields.insert("when".to_string(), PropertyValue::date(Utc::now()));
        fields.insert("level".to_string(), PropertyValue::enumeration(1, "High"));
        let value = PropertyValue::Struct { type_name: Some("Scope".into()), fields };
        let stored = value.to_stored().unwrap();
        assert_eq!(PropertyValue::from_stored(&stored).unwrap(), value);
    }

    #[test]
    fn test_from_stored_rejects_non_string() {
        assert!(PropertyValue::from_stored(&EavValue::Int(1)).is_err());
    }
}
