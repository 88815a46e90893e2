// SPDX-License-Identifier: PMPL-1.0-or-later
//! Entity lifecycle: create, stub, update, soft-delete, restore, purge.

use eavmeta_model::{
    EntityProxy, EntityRecord, ErrorKind, InstanceProperties, InstanceStatus, RecordRef, RepositoryError,
    TypeCategory,
};
use eavmeta_store::WriteOp;
use tracing::debug;

use super::classification;
use crate::context::MutationContext;
use crate::request::NewClassification;
use crate::validator;

pub(super) fn create(
    ctx: &MutationContext<'_>,
    guid: &str,
    type_name: &str,
    properties: &InstanceProperties,
    classifications: &[NewClassification],
    initial_status: Option<InstanceStatus>,
) -> Result<Vec<WriteOp>, RepositoryError> {
    let def = validator::instance_type(ctx.types(), type_name, TypeCategory::Entity)?;
    validator::legal_properties(ctx.types(), type_name, properties)?;
    let status = validator::initial_status(initial_status)?;

    let reference = RecordRef::entity(guid);
    if let Some(existing) = ctx.stored_entity(&reference)? {
        if !existing.is_proxy() {
            return Err(RepositoryError::new(
                ErrorKind::DuplicateReference,
                format!("{reference} already exists"),
            ));
        }
        debug!(guid, "replacing stub with full entity");
    }

    let mut header = ctx.new_header(def.type_ref());
    header.status = status;
    let mut entity = EntityRecord {
        guid: guid.to_string(),
        header,
        properties: properties.clone(),
        classifications: Vec::with_capacity(classifications.len()),
    };
    for spec in classifications {
        if entity.classification(&spec.name).is_some() {
            return Err(RepositoryError::new(
                ErrorKind::ClassificationAlreadyPresent,
                format!("{} listed twice", spec.name),
            ));
        }
        let new = classification::new_classification(ctx, type_name, &spec.name, &spec.properties)?;
        entity.classifications.push(new);
    }
    Ok(vec![ctx.put_entity(&entity)?])
}

/// Writes the stub only when nothing is stored under its reference.
pub(super) fn create_stub(ctx: &MutationContext<'_>, proxy: &EntityProxy) -> Result<Vec<WriteOp>, RepositoryError> {
    validator::instance_type(ctx.types(), &proxy.header.type_ref.name, TypeCategory::Entity)?;
    if ctx.document(&proxy.reference()).is_some() {
        debug!(guid = %proxy.guid, "stub target already exists");
        return Ok(Vec::new());
    }
    Ok(vec![ctx.put_proxy(proxy)?])
}

/// Full, live, locally owned entity: the precondition of every update.
fn updatable(ctx: &MutationContext<'_>, guid: &str) -> Result<EntityRecord, RepositoryError> {
    let reference = RecordRef::entity(guid);
    let entity = ctx.require_entity(&reference)?;
    validator::not_deleted(&entity.header, &reference)?;
    validator::local(&entity.header, &ctx.collection().id, &reference)?;
    Ok(entity)
}

pub(super) fn update_properties(
    ctx: &MutationContext<'_>,
    guid: &str,
    properties: &InstanceProperties,
) -> Result<Vec<WriteOp>, RepositoryError> {
    let mut entity = updatable(ctx, guid)?;
    validator::legal_properties(ctx.types(), &entity.header.type_ref.name, properties)?;
    entity.properties = properties.clone();
    entity.header.touch(ctx.user(), ctx.now());
    Ok(vec![ctx.put_entity(&entity)?])
}

pub(super) fn update_status(
    ctx: &MutationContext<'_>,
    guid: &str,
    status: Option<InstanceStatus>,
) -> Result<Vec<WriteOp>, RepositoryError> {
    let mut entity = updatable(ctx, guid)?;
    entity.header.status = validator::required_status(status)?;
    entity.header.touch(ctx.user(), ctx.now());
    Ok(vec![ctx.put_entity(&entity)?])
}

pub(super) fn soft_delete(ctx: &MutationContext<'_>, guid: &str) -> Result<Vec<WriteOp>, RepositoryError> {
    let mut entity = updatable(ctx, guid)?;
    entity.header.status_on_delete = Some(entity.header.status);
    entity.header.status = InstanceStatus::Deleted;
    entity.header.touch(ctx.user(), ctx.now());
    Ok(vec![ctx.put_entity(&entity)?])
}

pub(super) fn restore(ctx: &MutationContext<'_>, guid: &str) -> Result<Vec<WriteOp>, RepositoryError> {
    let reference = RecordRef::entity(guid);
    let mut entity = ctx.require_entity(&reference)?;
    validator::deleted(&entity.header, &reference)?;
    validator::local(&entity.header, &ctx.collection().id, &reference)?;
    entity.header.status = entity.header.status_on_delete.take().unwrap_or(InstanceStatus::Active);
    entity.header.touch(ctx.user(), ctx.now());
    Ok(vec![ctx.put_entity(&entity)?])
}

/// Evict the entity and, in the same write set, every relationship that
/// references it. Endpoint stubs at the far ends are left alone.
pub(super) fn purge(ctx: &MutationContext<'_>, guid: &str, force: bool) -> Result<Vec<WriteOp>, RepositoryError> {
    let reference = RecordRef::entity(guid);
    let entity = ctx.require_entity(&reference)?;
    validator::local(&entity.header, &ctx.collection().id, &reference)?;
    if !force {
        validator::deleted(&entity.header, &reference)?;
    }
    evict_with_relationships(ctx, &reference)
}

pub(super) fn evict_with_relationships(
    ctx: &MutationContext<'_>,
    reference: &RecordRef,
) -> Result<Vec<WriteOp>, RepositoryError> {
    let relationships = ctx.relationships_touching(reference)?;
    debug!(entity = %reference, cascade = relationships.len(), "purging entity");
    let mut writes: Vec<WriteOp> = relationships.into_iter().map(WriteOp::Evict).collect();
    writes.push(WriteOp::Evict(reference.doc_id()));
    Ok(writes)
}
