// SPDX-License-Identifier: PMPL-1.0-or-later
//! Attribute naming.
//!
//! Every stored attribute name is produced here. Properties use
//! [`AttributeKey`]; header fields use the constants in [`header`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::typesystem::TypeSystem;

/// The property sub-space an attribute lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Namespace {
    EntityProperties,
    RelationshipProperties,
    /// Properties of the named classification.
    ClassificationProperties(String),
}

impl Namespace {
    pub fn prefix(&self) -> String {
        match self {
            Namespace::EntityProperties => "entityProperties".to_string(),
            Namespace::RelationshipProperties => "relationshipProperties".to_string(),
            Namespace::ClassificationProperties(name) => format!("classifications.{name}.classificationProperties"),
        }
    }

    /// Prefix shared by every flattened attribute of this namespace.
    pub fn queryable_prefix(&self) -> String {
        format!("{}/", self.prefix())
    }

    /// Prefix shared by every serialized attribute of this namespace.
    pub fn serialized_prefix(&self) -> String {
        format!("{}.value/", self.prefix())
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.prefix())
    }
}

/// Name of one property attribute: namespace, property name and the type
/// that declares the property.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributeKey {
    pub namespace: Namespace,
    pub base_name: String,
    pub qualifier: Option<String>,
}

impl AttributeKey {
    pub fn new(namespace: Namespace, base_name: impl Into<String>, qualifier: Option<String>) -> Self {
        Self {
            namespace,
            base_name: base_name.into(),
            qualifier,
        }
    }

    fn local_name(&self) -> String {
        match &self.qualifier {
            Some(q) => format!("{q}.{}", self.base_name),
            None => self.base_name.clone(),
        }
    }

    /// Attribute holding the flattened, matchable value.
    pub fn queryable(&self) -> String {
        format!("{}{}", self.namespace.queryable_prefix(), self.local_name())
    }

    /// Attribute holding the lossless serialized value.
    pub fn serialized(&self) -> String {
        format!("{}{}", self.namespace.serialized_prefix(), self.local_name())
    }

    /// Key for storing `property` on an instance of `type_name`: qualified by
    /// the nearest declaring type, or by the instance type itself when the
    /// type system does not declare it.
    pub fn for_storage(types: &TypeSystem, namespace: Namespace, type_name: &str, property: &str) -> Self {
        let qualifier = types
            .declaring_type(type_name, property)
            .map(|d| d.name.clone())
            .unwrap_or_else(|| type_name.to_string());
        Self::new(namespace, property, Some(qualifier))
    }

    /// Every concrete key `property` may be stored under across the
    /// candidate types, in first-seen order without duplicates. Empty when
    /// no candidate type declares the property.
    pub fn resolve(types: &TypeSystem, namespace: &Namespace, property: &str, candidates: &[String]) -> Vec<Self> {
        let mut keys: Vec<Self> = Vec::new();
        for candidate in candidates {
            if let Some(declaring) = types.declaring_type(candidate, property) {
                let key = Self::new(namespace.clone(), property, Some(declaring.name.clone()));
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        keys
    }

    /// Recover the property name from a serialized attribute of `namespace`.
    pub fn base_name_of(namespace: &Namespace, attribute: &str) -> Option<String> {
        let rest = attribute.strip_prefix(&namespace.serialized_prefix())?;
        Some(match rest.split_once('.') {
            Some((_, base)) => base.to_string(),
            None => rest.to_string(),
        })
    }
}

/// Header attribute names.
pub mod header {
    pub const TYPE_ID: &str = "type.id";
    pub const TYPE_NAME: &str = "type.name";
    /// GUIDs of the type and all its ancestors.
    pub const TYPE_SUPERS: &str = "type.supers";
    pub const TYPE_CATEGORY: &str = "type.category";
    pub const VERSION: &str = "version";
    pub const STATUS: &str = "status";
    pub const STATUS_ON_DELETE: &str = "statusOnDelete";
    pub const CREATED_BY: &str = "createdBy";
    pub const UPDATED_BY: &str = "updatedBy";
    pub const MAINTAINED_BY: &str = "maintainedBy";
    pub const CREATE_TIME: &str = "createTime";
    pub const UPDATE_TIME: &str = "updateTime";
    pub const PROVENANCE: &str = "provenanceType";
    pub const COLLECTION_ID: &str = "metadataCollectionId";
    pub const COLLECTION_NAME: &str = "metadataCollectionName";
    pub const REPLICATED_BY: &str = "replicatedBy";
    pub const LICENSE: &str = "instanceLicense";

    pub const IS_PROXY: &str = "isProxy";
    pub const END_ONE: &str = "end1";
    pub const END_TWO: &str = "end2";
    /// Names of the classifications an entity holds.
    pub const CLASSIFICATIONS: &str = "classifications";
    pub const LATEST_CLASSIFICATION_CHANGE: &str = "latestClassificationChange";

    pub const ORIGIN: &str = "origin";
    pub const ORIGIN_GUID: &str = "originGuid";

    /// Prefix of the header attributes of one classification.
    pub fn classification_prefix(name: &str) -> String {
        format!("classifications.{name}/")
    }

    /// Header attribute `field` of classification `name`.
    pub fn classification(name: &str, field: &str) -> String {
        format!("{}{field}", classification_prefix(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typesystem::{PropertyDef, TypeCategory, TypeDef};

    fn types() -> TypeSystem {
        TypeSystem::new(vec![
            TypeDef::new("g-base", "Base", TypeCategory::Entity).with_property(PropertyDef::new("name")),
            TypeDef::new("g-a", "A", TypeCategory::Entity).with_supertype("Base"),
            TypeDef::new("g-b", "B", TypeCategory::Entity).with_property(PropertyDef::new("name")),
        ])
        .unwrap()
    }

    #[test]
    fn test_rendering() {
        let key = AttributeKey::new(Namespace::EntityProperties, "name", Some("Base".into()));
        assert_eq!(key.queryable(), "entityProperties/Base.name");
        assert_eq!(key.serialized(), "entityProperties.value/Base.name");

        let ckey = AttributeKey::new(Namespace::ClassificationProperties("Conf".into()), "level", Some("Conf".into()));
        assert_eq!(ckey.queryable(), "classifications.Conf.classificationProperties/Conf.level");
    }

    #[test]
    fn test_resolve_unions_distinct_declarers() {
        let ts = types();
        let candidates = vec!["A".to_string(), "Base".to_string(), "B".to_string()];
        let keys = AttributeKey::resolve(&ts, &Namespace::EntityProperties, "name", &candidates);
        let rendered: Vec<_> = keys.iter().map(|k| k.queryable()).collect();
        assert_eq!(rendered, vec!["entityProperties/Base.name", "entityProperties/B.name"]);
        assert!(AttributeKey::resolve(&ts, &Namespace::EntityProperties, "nope", &candidates).is_empty());
    }

    #[test]
    fn test_base_name_of() {
        let ns = Namespace::EntityProperties;
        assert_eq!(
            AttributeKey::base_name_of(&ns, "entityProperties.value/Base.name").as_deref(),
            Some("name")
        );
        assert!(AttributeKey::base_name_of(&ns, "entityProperties/Base.name").is_none());
    }

    #[test]
    fn test_for_storage_falls_back_to_instance_type() {
        let ts = types();
        let key = AttributeKey::for_storage(&ts, Namespace::EntityProperties, "A", "extra");
        assert_eq!(key.qualifier.as_deref(), Some("A"));
    }
}
