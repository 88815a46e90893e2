// SPDX-License-Identifier: PMPL-1.0-or-later
//! Result mapper.
//!
//! Hydrates document references into records through the snapshot the
//! query ran against, so a result never mixes two points in time.

use eavmeta_model::mapping::relationship_ends;
use eavmeta_model::{EntityRecord, RelationshipRecord, RepositoryError, StorageMapper, StoredEntity, TypeSystem};
use eavmeta_store::{DocId, EavStore, Snapshot};
use tracing::debug;

pub struct ResultMapper<'a> {
    store: &'a dyn EavStore,
    snapshot: &'a Snapshot,
    mapper: StorageMapper<'a>,
}

impl<'a> ResultMapper<'a> {
    pub fn new(store: &'a dyn EavStore, snapshot: &'a Snapshot, types: &'a TypeSystem) -> Self {
        Self {
            store,
            snapshot,
            mapper: StorageMapper::new(types),
        }
    }

    pub async fn stored_entity(&self, id: &DocId) -> Result<Option<StoredEntity>, RepositoryError> {
        match self.store.get(self.snapshot, id).await? {
            Some(doc) => Ok(Some(self.mapper.stored_entity_from_document(&doc)?)),
            None => Ok(None),
        }
    }

    pub async fn relationship(&self, id: &DocId) -> Result<Option<RelationshipRecord>, RepositoryError> {
        let Some(doc) = self.store.get(self.snapshot, id).await? else {
            return Ok(None);
        };
        let (one, two) = relationship_ends(&doc)?;
        let end_one = self.store.get(self.snapshot, &one).await?;
        let end_two = self.store.get(self.snapshot, &two).await?;
        Ok(Some(self.mapper.relationship_from_document(&doc, end_one.as_ref(), end_two.as_ref())?))
    }

    /// Full entities for `ids`, in order. Stubs are skipped.
    pub async fn entities(&self, ids: &[DocId]) -> Result<Vec<EntityRecord>, RepositoryError> {
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            match self.stored_entity(id).await? {
                Some(StoredEntity::Full(entity)) => records.push(entity),
                Some(StoredEntity::Proxy(_)) => debug!(id = %id, "skipping stub in results"),
                None => debug!(id = %id, "result no longer visible"),
            }
        }
        Ok(records)
    }

    pub async fn relationships(&self, ids: &[DocId]) -> Result<Vec<RelationshipRecord>, RepositoryError> {
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(relationship) = self.relationship(id).await? {
                records.push(relationship);
            }
        }
        Ok(records)
    }
}
