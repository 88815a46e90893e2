// SPDX-License-Identifier: PMPL-1.0-or-later
//! Relationship lifecycle.

use eavmeta_model::{
    EntityProxy, ErrorKind, InstanceProperties, InstanceStatus, RecordRef, RelationshipRecord, RepositoryError,
    TypeCategory,
};
use eavmeta_store::WriteOp;
use tracing::debug;

use crate::context::MutationContext;
use crate::validator;

pub(super) fn create(
    ctx: &MutationContext<'_>,
    guid: &str,
    type_name: &str,
    properties: &InstanceProperties,
    initial_status: Option<InstanceStatus>,
    end_one: &EntityProxy,
    end_two: &EntityProxy,
) -> Result<Vec<WriteOp>, RepositoryError> {
    let def = validator::instance_type(ctx.types(), type_name, TypeCategory::Relationship)?;
    validator::legal_properties(ctx.types(), type_name, properties)?;
    let status = validator::initial_status(initial_status)?;

    let reference = RecordRef::relationship(guid);
    if ctx.document(&reference).is_some() {
        return Err(RepositoryError::new(
            ErrorKind::DuplicateReference,
            format!("{reference} already exists"),
        ));
    }

    let mut writes = endpoint_stubs(ctx, [end_one, end_two], true)?;
    let mut header = ctx.new_header(def.type_ref());
    header.status = status;
    writes.push(ctx.put_relationship(&RelationshipRecord {
        guid: guid.to_string(),
        header,
        properties: properties.clone(),
        end_one: end_one.clone(),
        end_two: end_two.clone(),
    })?);
    Ok(writes)
}

/// Stubs for endpoints that do not resolve yet. With `live` set, an
/// existing endpoint must not be deleted.
pub(super) fn endpoint_stubs(
    ctx: &MutationContext<'_>,
    ends: [&EntityProxy; 2],
    live: bool,
) -> Result<Vec<WriteOp>, RepositoryError> {
    let mut writes = Vec::new();
    for (index, end) in ends.iter().enumerate() {
        let reference = end.reference();
        match ctx.stored_entity(&reference)? {
            Some(existing) => {
                if live {
                    validator::not_deleted(existing.header(), &reference)?;
                }
            }
            // A self-relationship needs only one stub.
            None if index == 1 && ends[0].guid == end.guid => {}
            None => {
                validator::instance_type(ctx.types(), &end.header.type_ref.name, TypeCategory::Entity)?;
                debug!(guid = %end.guid, "creating endpoint stub");
                writes.push(ctx.put_proxy(end)?);
            }
        }
    }
    Ok(writes)
}

fn updatable(ctx: &MutationContext<'_>, guid: &str) -> Result<RelationshipRecord, RepositoryError> {
    let reference = RecordRef::relationship(guid);
    let relationship = ctx.require_relationship(&reference)?;
    validator::not_deleted(&relationship.header, &reference)?;
    validator::local(&relationship.header, &ctx.collection().id, &reference)?;
    Ok(relationship)
}

pub(super) fn update_properties(
    ctx: &MutationContext<'_>,
    guid: &str,
    properties: &InstanceProperties,
) -> Result<Vec<WriteOp>, RepositoryError> {
    let mut relationship = updatable(ctx, guid)?;
    validator::legal_properties(ctx.types(), &relationship.header.type_ref.name, properties)?;
    relationship.properties = properties.clone();
    relationship.header.touch(ctx.user(), ctx.now());
    Ok(vec![ctx.put_relationship(&relationship)?])
}

pub(super) fn update_status(
    ctx: &MutationContext<'_>,
    guid: &str,
    status: Option<InstanceStatus>,
) -> Result<Vec<WriteOp>, RepositoryError> {
    let mut relationship = updatable(ctx, guid)?;
    relationship.header.status = validator::required_status(status)?;
    relationship.header.touch(ctx.user(), ctx.now());
    Ok(vec![ctx.put_relationship(&relationship)?])
}

pub(super) fn soft_delete(ctx: &MutationContext<'_>, guid: &str) -> Result<Vec<WriteOp>, RepositoryError> {
    let mut relationship = updatable(ctx, guid)?;
    relationship.header.status_on_delete = Some(relationship.header.status);
    relationship.header.status = InstanceStatus::Deleted;
    relationship.header.touch(ctx.user(), ctx.now());
    Ok(vec![ctx.put_relationship(&relationship)?])
}

pub(super) fn restore(ctx: &MutationContext<'_>, guid: &str) -> Result<Vec<WriteOp>, RepositoryError> {
    let reference = RecordRef::relationship(guid);
    let mut relationship = ctx.require_relationship(&reference)?;
    validator::deleted(&relationship.header, &reference)?;
    validator::local(&relationship.header, &ctx.collection().id, &reference)?;
    relationship.header.status = relationship
        .header
        .status_on_delete
        .take()
        .unwrap_or(InstanceStatus::Active);
    relationship.header.touch(ctx.user(), ctx.now());
    Ok(vec![ctx.put_relationship(&relationship)?])
}

pub(super) fn purge(ctx: &MutationContext<'_>, guid: &str, force: bool) -> Result<Vec<WriteOp>, RepositoryError> {
    let reference = RecordRef::relationship(guid);
    let relationship = ctx.require_relationship(&reference)?;
    validator::local(&relationship.header, &ctx.collection().id, &reference)?;
    if !force {
        validator::deleted(&relationship.header, &reference)?;
    }
    Ok(vec![WriteOp::Evict(reference.doc_id())])
}
