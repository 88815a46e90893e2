// SPDX-License-Identifier: PMPL-1.0-or-later
//! Reference copies: records homed in another collection, stored verbatim.
//!
//! Copies keep the header they arrive with. A copy older than (or as old
//! as) the stored one is ignored, and a copy may never replace a record the
//! local collection owns.

use eavmeta_model::{Classification, EntityRecord, RecordRef, RelationshipRecord, RepositoryError, StoredEntity, TypeCategory};
use eavmeta_store::WriteOp;
use tracing::debug;

use super::classification::not_present;
use super::relationship::endpoint_stubs;
use crate::context::MutationContext;
use crate::validator;

pub(super) fn store_entity(ctx: &MutationContext<'_>, entity: &EntityRecord) -> Result<Vec<WriteOp>, RepositoryError> {
    let reference = entity.reference();
    let local = &ctx.collection().id;
    validator::instance_type(ctx.types(), &entity.header.type_ref.name, TypeCategory::Entity)?;
    validator::not_owned(&entity.header, local, &reference)?;

    if let Some(existing) = ctx.stored_entity(&reference)? {
        validator::not_owned(existing.header(), local, &reference)?;
        if let StoredEntity::Full(current) = &existing {
            if current.header.version >= entity.header.version {
                debug!(guid = %entity.guid, stored = current.header.version, "ignoring stale reference copy");
                return Ok(Vec::new());
            }
        }
    }
    Ok(vec![ctx.put_entity(entity)?])
}

/// Remove a reference copy. One that relationships still point at is
/// downgraded to a stub so their ends keep resolving.
pub(super) fn purge_entity(ctx: &MutationContext<'_>, guid: &str, home: &str) -> Result<Vec<WriteOp>, RepositoryError> {
    let reference = RecordRef::entity(guid);
    let Some(existing) = ctx.stored_entity(&reference)? else {
        return Ok(Vec::new());
    };
    validator::not_owned(existing.header(), &ctx.collection().id, &reference)?;
    if existing.header().metadata_collection_id != home {
        debug!(guid, home, stored_home = %existing.header().metadata_collection_id, "copy is from another home");
        return Ok(Vec::new());
    }

    if ctx.relationships_touching(&reference)?.is_empty() {
        return Ok(vec![WriteOp::Evict(reference.doc_id())]);
    }
    match existing {
        StoredEntity::Full(entity) => {
            debug!(guid, "downgrading referenced copy to a stub");
            Ok(vec![ctx.put_proxy(&ctx.mapper().proxy_of(&entity))?])
        }
        StoredEntity::Proxy(_) => Ok(Vec::new()),
    }
}

pub(super) fn store_relationship(
    ctx: &MutationContext<'_>,
    relationship: &RelationshipRecord,
) -> Result<Vec<WriteOp>, RepositoryError> {
    let reference = relationship.reference();
    let local = &ctx.collection().id;
    validator::instance_type(ctx.types(), &relationship.header.type_ref.name, TypeCategory::Relationship)?;
    validator::not_owned(&relationship.header, local, &reference)?;

    if let Some(current) = ctx.relationship(&reference)? {
        validator::not_owned(&current.header, local, &reference)?;
        if current.header.version >= relationship.header.version {
            debug!(guid = %relationship.guid, stored = current.header.version, "ignoring stale reference copy");
            return Ok(Vec::new());
        }
    }

    let mut writes = endpoint_stubs(ctx, [&relationship.end_one, &relationship.end_two], false)?;
    writes.push(ctx.put_relationship(relationship)?);
    Ok(writes)
}

/// A copy of a relationship the local collection owns replaces the stored
/// one, together with stubs for ends that do not resolve yet.
pub(super) fn store_home_relationship(
    ctx: &MutationContext<'_>,
    relationship: &RelationshipRecord,
) -> Result<Vec<WriteOp>, RepositoryError> {
    let reference = relationship.reference();
    validator::instance_type(ctx.types(), &relationship.header.type_ref.name, TypeCategory::Relationship)?;
    validator::local(&relationship.header, &ctx.collection().id, &reference)?;
    for end in [&relationship.end_one, &relationship.end_two] {
        validator::instance_type(ctx.types(), &end.header.type_ref.name, TypeCategory::Entity)?;
    }

    let mut writes = endpoint_stubs(ctx, [&relationship.end_one, &relationship.end_two], false)?;
    writes.push(ctx.put_relationship(relationship)?);
    Ok(writes)
}

pub(super) fn purge_relationship(
    ctx: &MutationContext<'_>,
    guid: &str,
    home: &str,
) -> Result<Vec<WriteOp>, RepositoryError> {
    let reference = RecordRef::relationship(guid);
    let Some(current) = ctx.relationship(&reference)? else {
        return Ok(Vec::new());
    };
    validator::not_owned(&current.header, &ctx.collection().id, &reference)?;
    if current.header.metadata_collection_id != home {
        return Ok(Vec::new());
    }
    Ok(vec![WriteOp::Evict(reference.doc_id())])
}

pub(super) fn store_classification(
    ctx: &MutationContext<'_>,
    guid: &str,
    classification: &Classification,
) -> Result<Vec<WriteOp>, RepositoryError> {
    let reference = RecordRef::entity(guid);
    let local = &ctx.collection().id;
    let mut entity = ctx.require_entity(&reference)?;
    validator::not_owned(&classification.header, local, &reference)?;
    validator::classification_applicable(ctx.types(), &classification.name, &entity.header.type_ref.name)?;

    match entity.classifications.iter().position(|c| c.name == classification.name) {
        Some(index) => {
            let current = &entity.classifications[index];
            validator::not_owned(&current.header, local, &reference)?;
            if current.header.version >= classification.header.version {
                debug!(guid, classification = %classification.name, "ignoring stale classification copy");
                return Ok(Vec::new());
            }
            entity.classifications[index] = classification.clone();
        }
        None => entity.classifications.push(classification.clone()),
    }
    Ok(vec![ctx.put_entity(&entity)?])
}

pub(super) fn purge_classification(
    ctx: &MutationContext<'_>,
    guid: &str,
    name: &str,
    home: &str,
) -> Result<Vec<WriteOp>, RepositoryError> {
    let reference = RecordRef::entity(guid);
    let Some(StoredEntity::Full(mut entity)) = ctx.stored_entity(&reference)? else {
        return Ok(Vec::new());
    };
    let Some(index) = entity.classifications.iter().position(|c| c.name == name) else {
        return Err(not_present(&reference, name));
    };
    let current = &entity.classifications[index];
    validator::not_owned(&current.header, &ctx.collection().id, &reference)?;
    if current.header.metadata_collection_id != home {
        return Ok(Vec::new());
    }
    entity.classifications.remove(index);
    Ok(vec![ctx.put_entity(&entity)?])
}
