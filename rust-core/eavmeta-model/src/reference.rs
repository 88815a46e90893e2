// SPDX-License-Identifier: PMPL-1.0-or-later
//! Record references: kind tag plus GUID.

use eavmeta_store::DocId;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::ModelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Entity,
    Relationship,
}

impl RecordKind {
    fn tag(self) -> &'static str {
        match self {
            RecordKind::Entity => "e",
            RecordKind::Relationship => "r",
        }
    }
}

/// Stable reference to an entity or relationship.
///
/// Its document-key form is `e:<guid>` or `r:<guid>`; that same form is the
/// value stored in other records that point at it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordRef {
    pub kind: RecordKind,
    pub guid: String,
}

impl RecordRef {
    pub fn entity(guid: impl Into<String>) -> Self {
        Self { kind: RecordKind::Entity, guid: guid.into() }
    }

    pub fn relationship(guid: impl Into<String>) -> Self {
        Self { kind: RecordKind::Relationship, guid: guid.into() }
    }

    /// A fresh entity reference with a random GUID.
    pub fn new_entity() -> Self {
        Self::entity(Uuid::new_v4().to_string())
    }

    /// A fresh relationship reference with a random GUID.
    pub fn new_relationship() -> Self {
        Self::relationship(Uuid::new_v4().to_string())
    }

    pub fn doc_id(&self) -> DocId {
        DocId::new(self.to_string())
    }

    /// Parse a document key back into a reference.
    pub fn from_doc_id(id: &DocId) -> Result<Self, ModelError> {
        match id.as_str().split_once(':') {
            Some(("e", guid)) if !guid.is_empty() => Ok(Self::entity(guid)),
            Some(("r", guid)) if !guid.is_empty() => Ok(Self::relationship(guid)),
            _ => Err(ModelError::InvalidReference(id.to_string())),
        }
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.tag(), self.guid)
    }
}
