// SPDX-License-Identifier: PMPL-1.0-or-later
//! Type definitions and the immutable [`TypeSystem`] threaded through the
//! compiler, the validator and the storage mapping.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::ModelError;
use crate::instance::TypeRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TypeCategory {
    Entity,
    Relationship,
    Classification,
}

impl TypeCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            TypeCategory::Entity => "ENTITY",
            TypeCategory::Relationship => "RELATIONSHIP",
            TypeCategory::Classification => "CLASSIFICATION",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDef {
    pub name: String,
    /// Unique properties are carried on entity proxies.
    #[serde(default)]
    pub unique: bool,
}

impl PropertyDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), unique: false }
    }

    pub fn unique(name: impl Into<String>) -> Self {
        Self { name: name.into(), unique: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDef {
    pub guid: String,
    pub name: String,
    pub category: TypeCategory,
    #[serde(default)]
    pub supertype: Option<String>,
    /// Properties declared by this type (not inherited).
    #[serde(default)]
    pub properties: Vec<PropertyDef>,
    /// Classifications only: entity types this classification may be
    /// attached to (including their subtypes). Empty means any.
    #[serde(default)]
    pub valid_entity_types: Vec<String>,
}

impl TypeDef {
    pub fn new(guid: impl Into<String>, name: impl Into<String>, category: TypeCategory) -> Self {
        Self {
            guid: guid.into(),
            name: name.into(),
            category,
            supertype: None,
            properties: Vec::new(),
            valid_entity_types: Vec::new(),
        }
    }

    pub fn with_supertype(mut self, name: impl Into<String>) -> Self {
        self.supertype = Some(name.into());
        self
    }

    pub fn with_property(mut self, property: PropertyDef) -> Self {
        self.properties.push(property);
        self
    }

    pub fn with_valid_entity_type(mut self, name: impl Into<String>) -> Self {
        self.valid_entity_types.push(name.into());
        self
    }

    pub fn type_ref(&self) -> TypeRef {
        TypeRef {
            guid: self.guid.clone(),
            name: self.name.clone(),
        }
    }

    pub fn declares(&self, property: &str) -> bool {
        self.properties.iter().any(|p| p.name == property)
    }
}

/// Loaded type metadata. Immutable after construction.
#[derive(Debug, Clone, Default)]
pub struct TypeSystem {
    by_name: BTreeMap<String, TypeDef>,
    name_by_guid: HashMap<String, String>,
}

impl TypeSystem {
    /// Build and validate a type system: names and GUIDs unique, every
    /// supertype known and of the same category, no inheritance cycles.
    pub fn new(defs: Vec<TypeDef>) -> Result<Self, ModelError> {
        let mut by_name = BTreeMap::new();
        let mut name_by_guid = HashMap::new();
        for def in defs {
            if name_by_guid.insert(def.guid.clone(), def.name.clone()).is_some() {
                return Err(ModelError::InvalidTypeSystem(format!("duplicate type guid {}", def.guid)));
            }
            if by_name.contains_key(&def.name) {
                return Err(ModelError::InvalidTypeSystem(format!("duplicate type name {}", def.name)));
            }
            by_name.insert(def.name.clone(), def);
        }

        for def in by_name.values() {
            if let Some(parent) = &def.supertype {
                let parent_def = by_name.get(parent).ok_or_else(|| {
                    ModelError::InvalidTypeSystem(format!("{} has unknown supertype {parent}", def.name))
                })?;
                if parent_def.category != def.category {
                    return Err(ModelError::InvalidTypeSystem(format!(
                        "{} and its supertype {parent} differ in category",
                        def.name
                    )));
                }
            }
            let mut seen = HashSet::new();
            let mut cursor = Some(def);
            while let Some(current) = cursor {
                if !seen.insert(current.name.as_str()) {
                    return Err(ModelError::InvalidTypeSystem(format!("inheritance cycle through {}", def.name)));
                }
                cursor = current.supertype.as_ref().and_then(|p| by_name.get(p));
            }
        }

        Ok(Self { by_name, name_by_guid })
    }

    /// Load type definitions from a JSON array.
    pub fn from_json_str(json: &str) -> Result<Self, ModelError> {
        let defs: Vec<TypeDef> = serde_json::from_str(json)?;
        Self::new(defs)
    }

    pub fn get(&self, name: &str) -> Option<&TypeDef> {
        self.by_name.get(name)
    }

    pub fn require(&self, name: &str) -> Result<&TypeDef, ModelError> {
        self.get(name).ok_or_else(|| ModelError::UnknownType(name.to_string()))
    }

    pub fn get_by_guid(&self, guid: &str) -> Option<&TypeDef> {
        self.name_by_guid.get(guid).and_then(|name| self.by_name.get(name))
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDef> {
        self.by_name.values()
    }

    /// The type itself followed by its ancestors, nearest first.
    pub fn supertype_closure(&self, name: &str) -> Result<Vec<&TypeDef>, ModelError> {
        let mut closure = Vec::new();
        let mut cursor = Some(self.require(name)?);
        while let Some(def) = cursor {
            closure.push(def);
            cursor = def.supertype.as_ref().and_then(|p| self.by_name.get(p));
        }
        Ok(closure)
    }

    pub fn is_subtype_of(&self, name: &str, ancestor: &str) -> bool {
        self.supertype_closure(name)
            .map(|closure| closure.iter().any(|d| d.name == ancestor))
            .unwrap_or(false)
    }

    /// The type and all of its descendants, in name order.
    pub fn subtypes_of(&self, name: &str) -> Result<Vec<&TypeDef>, ModelError> {
        self.require(name)?;
        Ok(self.by_name.values().filter(|d| self.is_subtype_of(&d.name, name)).collect())
    }

    /// Nearest type in the closure of `type_name` that declares `property`.
    pub fn declaring_type(&self, type_name: &str, property: &str) -> Option<&TypeDef> {
        self.supertype_closure(type_name)
            .ok()?
            .into_iter()
            .find(|d| d.declares(property))
    }

    /// Every property legal on `type_name`, inherited ones included.
    pub fn legal_properties(&self, type_name: &str) -> Result<Vec<&PropertyDef>, ModelError> {
        Ok(self
            .supertype_closure(type_name)?
            .into_iter()
            .flat_map(|d| d.properties.iter())
            .collect())
    }

    pub fn is_legal_property(&self, type_name: &str, property: &str) -> bool {
        self.declaring_type(type_name, property).is_some()
    }

    pub fn unique_properties(&self, type_name: &str) -> Vec<String> {
        self.legal_properties(type_name)
            .map(|props| props.into_iter().filter(|p| p.unique).map(|p| p.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Whether `classification` may be attached to an entity of `entity_type`.
    pub fn is_classification_valid_for(&self, classification: &str, entity_type: &str) -> bool {
        let Some(def) = self.get(classification) else {
            return false;
        };
        if def.category != TypeCategory::Classification {
            return false;
        }
        def.valid_entity_types.is_empty()
            || def
                .valid_entity_types
                .iter()
                .any(|allowed| self.is_subtype_of(entity_type, allowed))
    }
}
