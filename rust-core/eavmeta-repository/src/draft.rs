// SPDX-License-Identifier: PMPL-1.0-or-later
//! Builders for records about to be created.

use eavmeta_model::{EntityProxy, InstanceProperties, InstanceStatus, PropertyValue};
use eavmeta_mutation::NewClassification;

/// Input of [`crate::MetadataRepository::create_entity`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntity {
    /// Fixed GUID; a random one is generated when unset.
    pub guid: Option<String>,
    pub type_name: String,
    pub properties: InstanceProperties,
    pub classifications: Vec<NewClassification>,
    pub initial_status: Option<InstanceStatus>,
}

impl NewEntity {
    pub fn of_type(type_name: impl Into<String>) -> Self {
        Self {
            guid: None,
            type_name: type_name.into(),
            properties: InstanceProperties::new(),
            classifications: Vec::new(),
            initial_status: None,
        }
    }

    pub fn with_guid(mut self, guid: impl Into<String>) -> Self {
        self.guid = Some(guid.into());
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    /// Attach a classification with the given properties at creation.
    pub fn with_classification(mut self, name: impl Into<String>, properties: InstanceProperties) -> Self {
        self.classifications.push(NewClassification {
            name: name.into(),
            properties,
        });
        self
    }

    pub fn with_status(mut self, status: InstanceStatus) -> Self {
        self.initial_status = Some(status);
        self
    }
}

/// Input of [`crate::MetadataRepository::create_relationship`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewRelationship {
    pub guid: Option<String>,
    pub type_name: String,
    pub properties: InstanceProperties,
    pub initial_status: Option<InstanceStatus>,
    pub end_one: EntityProxy,
    pub end_two: EntityProxy,
}

impl NewRelationship {
    pub fn between(type_name: impl Into<String>, end_one: EntityProxy, end_two: EntityProxy) -> Self {
        Self {
            guid: None,
            type_name: type_name.into(),
            properties: InstanceProperties::new(),
            initial_status: None,
            end_one,
            end_two,
        }
    }

    pub fn with_guid(mut self, guid: impl Into<String>) -> Self {
        self.guid = Some(guid.into());
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    pub fn with_status(mut self, status: InstanceStatus) -> Self {
        self.initial_status = Some(status);
        self
    }
}
