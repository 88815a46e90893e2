// SPDX-License-Identifier: PMPL-1.0-or-later
//! Classify and declassify.
//!
//! Both change the host entity: its version goes up by one, the user joins
//! its maintainers, and the latest-classification-change marker is
//! recomputed when the document is rewritten.

use eavmeta_model::{
    Classification, ClassificationOrigin, ErrorKind, InstanceProperties, RecordRef, RepositoryError, TypeCategory,
};
use eavmeta_store::WriteOp;

use crate::context::MutationContext;
use crate::request::ClassifyMode;
use crate::validator;

/// A freshly assigned classification, validated against the entity type.
pub(super) fn new_classification(
    ctx: &MutationContext<'_>,
    entity_type: &str,
    name: &str,
    properties: &InstanceProperties,
) -> Result<Classification, RepositoryError> {
    let def = validator::instance_type(ctx.types(), name, TypeCategory::Classification)?;
    validator::classification_applicable(ctx.types(), name, entity_type)?;
    validator::legal_properties(ctx.types(), name, properties)?;
    Ok(Classification {
        name: name.to_string(),
        header: ctx.new_header(def.type_ref()),
        origin: ClassificationOrigin::Assigned,
        origin_guid: None,
        properties: properties.clone(),
    })
}

pub(super) fn classify(
    ctx: &MutationContext<'_>,
    guid: &str,
    name: &str,
    properties: &InstanceProperties,
    mode: ClassifyMode,
) -> Result<Vec<WriteOp>, RepositoryError> {
    let reference = RecordRef::entity(guid);
    let mut entity = ctx.require_entity(&reference)?;
    validator::not_deleted(&entity.header, &reference)?;
    let entity_type = entity.header.type_ref.name.clone();

    let position = entity.classifications.iter().position(|c| c.name == name);
    match (position, mode) {
        (Some(_), ClassifyMode::Add) => {
            return Err(RepositoryError::new(
                ErrorKind::ClassificationAlreadyPresent,
                format!("{reference} is already classified as {name}"),
            ));
        }
        (None, ClassifyMode::Update) => return Err(not_present(&reference, name)),
        (Some(index), _) => {
            validator::local(&entity.classifications[index].header, &ctx.collection().id, &reference)?;
            validator::classification_applicable(ctx.types(), name, &entity_type)?;
            validator::legal_properties(ctx.types(), name, properties)?;
            let existing = &mut entity.classifications[index];
            existing.properties = properties.clone();
            existing.header.touch(ctx.user(), ctx.now());
        }
        (None, _) => {
            let classification = new_classification(ctx, &entity_type, name, properties)?;
            entity.classifications.push(classification);
        }
    }

    entity.header.touch(ctx.user(), ctx.now());
    Ok(vec![ctx.put_entity(&entity)?])
}

pub(super) fn declassify(ctx: &MutationContext<'_>, guid: &str, name: &str) -> Result<Vec<WriteOp>, RepositoryError> {
    let reference = RecordRef::entity(guid);
    let mut entity = ctx.require_entity(&reference)?;
    validator::not_deleted(&entity.header, &reference)?;
    let Some(index) = entity.classifications.iter().position(|c| c.name == name) else {
        return Err(not_present(&reference, name));
    };
    validator::local(&entity.classifications[index].header, &ctx.collection().id, &reference)?;
    entity.classifications.remove(index);
    entity.header.touch(ctx.user(), ctx.now());
    Ok(vec![ctx.put_entity(&entity)?])
}

pub(super) fn not_present(reference: &RecordRef, name: &str) -> RepositoryError {
    RepositoryError::new(
        ErrorKind::ClassificationNotPresent,
        format!("{reference} is not classified as {name}"),
    )
}
