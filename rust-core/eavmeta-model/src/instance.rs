// SPDX-License-Identifier: PMPL-1.0-or-later
//! Instance records: entities, entity proxies, relationships and
//! classifications, with their shared header.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ModelError;
use crate::property::InstanceProperties;
use crate::reference::RecordRef;

/// Lifecycle status of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    Draft,
    Prepared,
    Proposed,
    Approved,
    Rejected,
    Active,
    Disabled,
    Deprecated,
    Other,
    Deleted,
}

impl InstanceStatus {
    pub const ALL: [InstanceStatus; 10] = [
        InstanceStatus::Draft,
        InstanceStatus::Prepared,
        InstanceStatus::Proposed,
        InstanceStatus::Approved,
        InstanceStatus::Rejected,
        InstanceStatus::Active,
        InstanceStatus::Disabled,
        InstanceStatus::Deprecated,
        InstanceStatus::Other,
        InstanceStatus::Deleted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            InstanceStatus::Draft => "DRAFT",
            InstanceStatus::Prepared => "PREPARED",
            InstanceStatus::Proposed => "PROPOSED",
            InstanceStatus::Approved => "APPROVED",
            InstanceStatus::Rejected => "REJECTED",
            InstanceStatus::Active => "ACTIVE",
            InstanceStatus::Disabled => "DISABLED",
            InstanceStatus::Deprecated => "DEPRECATED",
            InstanceStatus::Other => "OTHER",
            InstanceStatus::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InstanceStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ModelError::mapping("status", format!("unknown instance status {s:?}")))
    }
}

/// Where the authoritative copy of an instance lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProvenanceType {
    /// Homed in a member collection of the cohort; only that collection may
    /// change it.
    LocalCohort,
    /// Sourced from an external system; changed only through the collection
    /// named in `replicated_by`.
    ExternalSource,
}

impl ProvenanceType {
    pub fn as_str(self) -> &'static str {
        match self {
            ProvenanceType::LocalCohort => "LOCAL_COHORT",
            ProvenanceType::ExternalSource => "EXTERNAL_SOURCE",
        }
    }
}

impl FromStr for ProvenanceType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOCAL_COHORT" => Ok(ProvenanceType::LocalCohort),
            "EXTERNAL_SOURCE" => Ok(ProvenanceType::ExternalSource),
            other => Err(ModelError::mapping("provenance", format!("unknown provenance type {other:?}"))),
        }
    }
}

/// Identity of an instance's type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeRef {
    pub guid: String,
    pub name: String,
}

/// Header fields shared by every kind of instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceHeader {
    pub type_ref: TypeRef,
    pub version: u64,
    pub status: InstanceStatus,
    pub status_on_delete: Option<InstanceStatus>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub maintained_by: Vec<String>,
    pub create_time: DateTime<Utc>,
    pub update_time: Option<DateTime<Utc>>,
    pub provenance: ProvenanceType,
    /// Home collection.
    pub metadata_collection_id: String,
    pub metadata_collection_name: Option<String>,
    pub replicated_by: Option<String>,
    pub instance_license: Option<String>,
}

impl InstanceHeader {
    /// Header of a freshly created, locally homed instance at version 1.
    pub fn new_local(
        type_ref: TypeRef,
        collection_id: impl Into<String>,
        collection_name: Option<String>,
        user: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let user = user.into();
        Self {
            type_ref,
            version: 1,
            status: InstanceStatus::Active,
            status_on_delete: None,
            created_by: Some(user.clone()),
            updated_by: None,
            maintained_by: vec![user],
            create_time: now,
            update_time: None,
            provenance: ProvenanceType::LocalCohort,
            metadata_collection_id: collection_id.into(),
            metadata_collection_name: collection_name,
            replicated_by: None,
            instance_license: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.status == InstanceStatus::Deleted
    }

    /// Record one accepted mutation: version + 1, update metadata, and the
    /// user added to the maintainers.
    pub fn touch(&mut self, user: &str, now: DateTime<Utc>) {
        self.version += 1;
        self.updated_by = Some(user.to_string());
        self.update_time = Some(now);
        if !self.maintained_by.iter().any(|m| m == user) {
            self.maintained_by.push(user.to_string());
        }
    }

    /// Time of the most recent change.
    pub fn last_change(&self) -> DateTime<Utc> {
        self.update_time.unwrap_or(self.create_time)
    }
}

/// How a classification came to be attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClassificationOrigin {
    Assigned,
    Propagated,
}

impl ClassificationOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            ClassificationOrigin::Assigned => "ASSIGNED",
            ClassificationOrigin::Propagated => "PROPAGATED",
        }
    }
}

impl FromStr for ClassificationOrigin {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ASSIGNED" => Ok(ClassificationOrigin::Assigned),
            "PROPAGATED" => Ok(ClassificationOrigin::Propagated),
            other => Err(ModelError::mapping("classification", format!("unknown origin {other:?}"))),
        }
    }
}

/// A classification attached to an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Classification type name; unique per entity.
    pub name: String,
    pub header: InstanceHeader,
    pub origin: ClassificationOrigin,
    pub origin_guid: Option<String>,
    pub properties: InstanceProperties,
}

/// A full entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub guid: String,
    pub header: InstanceHeader,
    pub properties: InstanceProperties,
    pub classifications: Vec<Classification>,
}

impl EntityRecord {
    pub fn reference(&self) -> RecordRef {
        RecordRef::entity(&self.guid)
    }

    pub fn classification(&self, name: &str) -> Option<&Classification> {
        self.classifications.iter().find(|c| c.name == name)
    }

    /// Latest create/update time over all classifications.
    pub fn latest_classification_change(&self) -> Option<DateTime<Utc>> {
        self.classifications.iter().map(|c| c.header.last_change()).max()
    }
}

/// A reference-only placeholder for an entity, carrying its header and
/// unique properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityProxy {
    pub guid: String,
    pub header: InstanceHeader,
    pub unique_properties: InstanceProperties,
}

impl EntityProxy {
    pub fn reference(&self) -> RecordRef {
        RecordRef::entity(&self.guid)
    }
}

/// A relationship between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pub guid: String,
    pub header: InstanceHeader,
    pub properties: InstanceProperties,
    pub end_one: EntityProxy,
    pub end_two: EntityProxy,
}

impl RelationshipRecord {
    pub fn reference(&self) -> RecordRef {
        RecordRef::relationship(&self.guid)
    }

    /// The endpoint opposite `guid`, if `guid` is one of the ends.
    pub fn other_end(&self, guid: &str) -> Option<&EntityProxy> {
        if self.end_one.guid == guid {
            Some(&self.end_two)
        } else if self.end_two.guid == guid {
            Some(&self.end_one)
        } else {
            None
        }
    }
}

/// What is stored under an entity reference: a full record or a stub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StoredEntity {
    Full(EntityRecord),
    Proxy(EntityProxy),
}

impl StoredEntity {
    pub fn guid(&self) -> &str {
        match self {
            StoredEntity::Full(e) => &e.guid,
            StoredEntity::Proxy(p) => &p.guid,
        }
    }

    pub fn header(&self) -> &InstanceHeader {
        match self {
            StoredEntity::Full(e) => &e.header,
            StoredEntity::Proxy(p) => &p.header,
        }
    }

    pub fn is_proxy(&self) -> bool {
        matches!(self, StoredEntity::Proxy(_))
    }
}
