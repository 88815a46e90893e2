// SPDX-License-Identifier: PMPL-1.0-or-later
//! Mutation requests.
//!
//! A [`MutationRequest`] names one transaction function and carries its
//! arguments. It travels to the store inside an [`Invocation`] as JSON and
//! is decoded again by the function that runs it.

use eavmeta_model::{Classification, EntityProxy, EntityRecord, InstanceProperties, InstanceStatus, RecordRef, RelationshipRecord};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The collection a mutation acts on behalf of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionContext {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl CollectionContext {
    pub fn new(id: impl Into<String>, name: Option<String>) -> Self {
        Self { id: id.into(), name }
    }
}

/// Everything a transaction function receives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    /// Invoking identity.
    pub user: String,
    /// Local (acting) collection.
    pub collection: CollectionContext,
    pub request: MutationRequest,
}

/// A classification to attach while creating an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewClassification {
    pub name: String,
    #[serde(default)]
    pub properties: InstanceProperties,
}

/// Behaviour of `classify-entity` with respect to an existing
/// classification of the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifyMode {
    /// Fail if already present.
    #[default]
    Add,
    /// Fail if not present.
    Update,
    Upsert,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "function", rename_all = "kebab-case")]
pub enum MutationRequest {
    CreateEntity {
        guid: String,
        type_name: String,
        #[serde(default)]
        properties: InstanceProperties,
        #[serde(default)]
        classifications: Vec<NewClassification>,
        #[serde(default)]
        initial_status: Option<InstanceStatus>,
    },
    CreateEntityStub {
        proxy: EntityProxy,
    },
    UpdateEntityProperties {
        guid: String,
        properties: InstanceProperties,
    },
    UpdateEntityStatus {
        guid: String,
        status: Option<InstanceStatus>,
    },
    DeleteEntity {
        guid: String,
    },
    RestoreEntity {
        guid: String,
    },
    PurgeEntity {
        guid: String,
        #[serde(default)]
        force: bool,
    },
    ClassifyEntity {
        guid: String,
        classification: String,
        #[serde(default)]
        properties: InstanceProperties,
        #[serde(default)]
        mode: ClassifyMode,
    },
    DeclassifyEntity {
        guid: String,
        classification: String,
    },
    CreateRelationship {
        guid: String,
        type_name: String,
        #[serde(default)]
        properties: InstanceProperties,
        #[serde(default)]
        initial_status: Option<InstanceStatus>,
        end_one: EntityProxy,
        end_two: EntityProxy,
    },
    UpdateRelationshipProperties {
        guid: String,
        properties: InstanceProperties,
    },
    UpdateRelationshipStatus {
        guid: String,
        status: Option<InstanceStatus>,
    },
    DeleteRelationship {
        guid: String,
    },
    RestoreRelationship {
        guid: String,
    },
    PurgeRelationship {
        guid: String,
        #[serde(default)]
        force: bool,
    },
    StoreEntityReferenceCopy {
        entity: EntityRecord,
    },
    PurgeEntityReferenceCopy {
        guid: String,
        home_collection_id: String,
    },
    StoreRelationshipReferenceCopy {
        relationship: RelationshipRecord,
    },
    StoreHomeRelationship {
        relationship: RelationshipRecord,
    },
    PurgeRelationshipReferenceCopy {
        guid: String,
        home_collection_id: String,
    },
    StoreClassificationReferenceCopy {
        guid: String,
        classification: Classification,
    },
    PurgeClassificationReferenceCopy {
        guid: String,
        classification: String,
        home_collection_id: String,
    },
}

/// Registered names of the transaction functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionName {
    CreateEntity,
    CreateEntityStub,
    UpdateEntityProperties,
    UpdateEntityStatus,
    DeleteEntity,
    RestoreEntity,
    PurgeEntity,
    ClassifyEntity,
    DeclassifyEntity,
    CreateRelationship,
    UpdateRelationshipProperties,
    UpdateRelationshipStatus,
    DeleteRelationship,
    RestoreRelationship,
    PurgeRelationship,
    StoreEntityReferenceCopy,
    PurgeEntityReferenceCopy,
    StoreRelationshipReferenceCopy,
    StoreHomeRelationship,
    PurgeRelationshipReferenceCopy,
    StoreClassificationReferenceCopy,
    PurgeClassificationReferenceCopy,
}

impl FunctionName {
    pub const ALL: [FunctionName; 22] = [
        FunctionName::CreateEntity,
        FunctionName::CreateEntityStub,
        FunctionName::UpdateEntityProperties,
        FunctionName::UpdateEntityStatus,
        FunctionName::DeleteEntity,
        FunctionName::RestoreEntity,
        FunctionName::PurgeEntity,
        FunctionName::ClassifyEntity,
        FunctionName::DeclassifyEntity,
        FunctionName::CreateRelationship,
        FunctionName::UpdateRelationshipProperties,
        FunctionName::UpdateRelationshipStatus,
        FunctionName::DeleteRelationship,
        FunctionName::RestoreRelationship,
        FunctionName::PurgeRelationship,
        FunctionName::StoreEntityReferenceCopy,
        FunctionName::PurgeEntityReferenceCopy,
        FunctionName::StoreRelationshipReferenceCopy,
        FunctionName::StoreHomeRelationship,
        FunctionName::PurgeRelationshipReferenceCopy,
        FunctionName::StoreClassificationReferenceCopy,
        FunctionName::PurgeClassificationReferenceCopy,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FunctionName::CreateEntity => "create-entity",
            FunctionName::CreateEntityStub => "create-entity-stub",
            FunctionName::UpdateEntityProperties => "update-entity-properties",
            FunctionName::UpdateEntityStatus => "update-entity-status",
            FunctionName::DeleteEntity => "delete-entity",
            FunctionName::RestoreEntity => "restore-entity",
            FunctionName::PurgeEntity => "purge-entity",
            FunctionName::ClassifyEntity => "classify-entity",
            FunctionName::DeclassifyEntity => "declassify-entity",
            FunctionName::CreateRelationship => "create-relationship",
            FunctionName::UpdateRelationshipProperties => "update-relationship-properties",
            FunctionName::UpdateRelationshipStatus => "update-relationship-status",
            FunctionName::DeleteRelationship => "delete-relationship",
            FunctionName::RestoreRelationship => "restore-relationship",
            FunctionName::PurgeRelationship => "purge-relationship",
            FunctionName::StoreEntityReferenceCopy => "store-entity-reference-copy",
            FunctionName::PurgeEntityReferenceCopy => "purge-entity-reference-copy",
            FunctionName::StoreRelationshipReferenceCopy => "store-relationship-reference-copy",
            FunctionName::StoreHomeRelationship => "store-home-relationship",
            FunctionName::PurgeRelationshipReferenceCopy => "purge-relationship-reference-copy",
            FunctionName::StoreClassificationReferenceCopy => "store-classification-reference-copy",
            FunctionName::PurgeClassificationReferenceCopy => "purge-classification-reference-copy",
        }
    }
}

impl fmt::Display for FunctionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl MutationRequest {
    pub fn function_name(&self) -> FunctionName {
        match self {
            MutationRequest::CreateEntity { .. } => FunctionName::CreateEntity,
            MutationRequest::CreateEntityStub { .. } => FunctionName::CreateEntityStub,
            MutationRequest::UpdateEntityProperties { .. } => FunctionName::UpdateEntityProperties,
            MutationRequest::UpdateEntityStatus { .. } => FunctionName::UpdateEntityStatus,
            MutationRequest::DeleteEntity { .. } => FunctionName::DeleteEntity,
            MutationRequest::RestoreEntity { .. } => FunctionName::RestoreEntity,
            MutationRequest::PurgeEntity { .. } => FunctionName::PurgeEntity,
            MutationRequest::ClassifyEntity { .. } => FunctionName::ClassifyEntity,
            MutationRequest::DeclassifyEntity { .. } => FunctionName::DeclassifyEntity,
            MutationRequest::CreateRelationship { .. } => FunctionName::CreateRelationship,
            MutationRequest::UpdateRelationshipProperties { .. } => FunctionName::UpdateRelationshipProperties,
            MutationRequest::UpdateRelationshipStatus { .. } => FunctionName::UpdateRelationshipStatus,
            MutationRequest::DeleteRelationship { .. } => FunctionName::DeleteRelationship,
            MutationRequest::RestoreRelationship { .. } => FunctionName::RestoreRelationship,
            MutationRequest::PurgeRelationship { .. } => FunctionName::PurgeRelationship,
            MutationRequest::StoreEntityReferenceCopy { .. } => FunctionName::StoreEntityReferenceCopy,
            MutationRequest::PurgeEntityReferenceCopy { .. } => FunctionName::PurgeEntityReferenceCopy,
            MutationRequest::StoreRelationshipReferenceCopy { .. } => FunctionName::StoreRelationshipReferenceCopy,
            MutationRequest::StoreHomeRelationship { .. } => FunctionName::StoreHomeRelationship,
            MutationRequest::PurgeRelationshipReferenceCopy { .. } => FunctionName::PurgeRelationshipReferenceCopy,
            MutationRequest::StoreClassificationReferenceCopy { .. } => {
                FunctionName::StoreClassificationReferenceCopy
            }
            MutationRequest::PurgeClassificationReferenceCopy { .. } => {
                FunctionName::PurgeClassificationReferenceCopy
            }
        }
    }

    /// The record this request creates or changes.
    pub fn target(&self) -> RecordRef {
        match self {
            MutationRequest::CreateEntity { guid, .. }
            | MutationRequest::UpdateEntityProperties { guid, .. }
            | MutationRequest::UpdateEntityStatus { guid, .. }
            | MutationRequest::DeleteEntity { guid }
            | MutationRequest::RestoreEntity { guid }
            | MutationRequest::PurgeEntity { guid, .. }
            | MutationRequest::ClassifyEntity { guid, .. }
            | MutationRequest::DeclassifyEntity { guid, .. }
            | MutationRequest::PurgeEntityReferenceCopy { guid, .. }
            | MutationRequest::StoreClassificationReferenceCopy { guid, .. }
            | MutationRequest::PurgeClassificationReferenceCopy { guid, .. } => RecordRef::entity(guid),
            MutationRequest::CreateEntityStub { proxy } => proxy.reference(),
            MutationRequest::StoreEntityReferenceCopy { entity } => entity.reference(),
            MutationRequest::CreateRelationship { guid, .. }
            | MutationRequest::UpdateRelationshipProperties { guid, .. }
            | MutationRequest::UpdateRelationshipStatus { guid, .. }
            | MutationRequest::DeleteRelationship { guid }
            | MutationRequest::RestoreRelationship { guid }
            | MutationRequest::PurgeRelationship { guid, .. }
            | MutationRequest::PurgeRelationshipReferenceCopy { guid, .. } => RecordRef::relationship(guid),
            MutationRequest::StoreRelationshipReferenceCopy { relationship }
            | MutationRequest::StoreHomeRelationship { relationship } => relationship.reference(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eavmeta_model::PropertyValue;

    #[test]
    fn test_function_names_unique() {
        let mut names: Vec<&str> = FunctionName::ALL.iter().map(|f| f.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), FunctionName::ALL.len());
    }

    #[test]
    fn test_invocation_json() {
        let mut properties = InstanceProperties::new();
        properties.insert("name".into(), PropertyValue::string("orders"));
        let invocation = Invocation {
            user: "alice".into(),
            collection: CollectionContext::new("home", None),
            request: MutationRequest::CreateEntity {
                guid: "g-1".into(),
                type_name: "Asset".into(),
                properties,
                classifications: Vec::new(),
                initial_status: None,
            },
        };
        let json = serde_json::to_value(&invocation).unwrap();
        assert_eq!(json["request"]["function"], "create-entity");
        let back: Invocation = serde_json::from_value(json).unwrap();
        assert_eq!(back, invocation);
        assert_eq!(back.request.function_name(), FunctionName::CreateEntity);
        assert_eq!(back.request.target(), RecordRef::entity("g-1"));
    }
}
