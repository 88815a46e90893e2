// SPDX-License-Identifier: PMPL-1.0-or-later
//! Consistency validator.
//!
//! Preconditions shared by the transaction functions. Each check returns
//! the typed error its failure maps to:
//!
//! | check | error |
//! |---|---|
//! | existence | `NOT_KNOWN` |
//! | shape (full record, not a stub) | `PROXY_ONLY` |
//! | lifecycle | `ALREADY_DELETED` / `NOT_DELETED` |
//! | ownership | `NOT_LOCAL` |
//! | required field | `NULL_REQUIRED_PROPERTY` |
//! | classification applicability | `INVALID_CLASSIFICATION_FOR_ENTITY` |

use eavmeta_model::{
    EntityRecord, ErrorKind, InstanceHeader, InstanceProperties, InstanceStatus, ProvenanceType, RecordRef,
    RepositoryError, StoredEntity, TypeCategory, TypeDef, TypeSystem,
};

pub fn exists<T>(record: Option<T>, reference: &RecordRef) -> Result<T, RepositoryError> {
    record.ok_or_else(|| RepositoryError::new(ErrorKind::NotKnown, format!("{reference} is not known")))
}

pub fn full_entity(stored: StoredEntity) -> Result<EntityRecord, RepositoryError> {
    match stored {
        StoredEntity::Full(entity) => Ok(entity),
        StoredEntity::Proxy(proxy) => Err(RepositoryError::new(
            ErrorKind::ProxyOnly,
            format!("{} is only held as a proxy", proxy.reference()),
        )),
    }
}

pub fn not_deleted(header: &InstanceHeader, reference: &RecordRef) -> Result<(), RepositoryError> {
    if header.is_deleted() {
        return Err(RepositoryError::new(
            ErrorKind::AlreadyDeleted,
            format!("{reference} is already deleted"),
        ));
    }
    Ok(())
}

pub fn deleted(header: &InstanceHeader, reference: &RecordRef) -> Result<(), RepositoryError> {
    if !header.is_deleted() {
        return Err(RepositoryError::new(ErrorKind::NotDeleted, format!("{reference} is not deleted")));
    }
    Ok(())
}

/// Whether `collection` may change the record: its home for locally
/// sourced records, the replicating collection for external ones.
pub fn is_local(header: &InstanceHeader, collection: &str) -> bool {
    match header.provenance {
        ProvenanceType::LocalCohort => header.metadata_collection_id == collection,
        ProvenanceType::ExternalSource => header.replicated_by.as_deref() == Some(collection),
    }
}

pub fn local(header: &InstanceHeader, collection: &str, reference: &RecordRef) -> Result<(), RepositoryError> {
    if !is_local(header, collection) {
        return Err(RepositoryError::new(
            ErrorKind::NotLocal,
            format!(
                "{reference} is homed in {} and cannot be changed by {collection}",
                header.metadata_collection_id
            ),
        ));
    }
    Ok(())
}

/// A reference copy must never replace a record this collection owns.
pub fn not_owned(header: &InstanceHeader, collection: &str, reference: &RecordRef) -> Result<(), RepositoryError> {
    if header.metadata_collection_id == collection {
        return Err(RepositoryError::new(
            ErrorKind::DuplicateReference,
            format!("{reference} is homed in the local collection {collection}"),
        ));
    }
    Ok(())
}

/// A status to set explicitly: present, and not DELETED (soft-delete has
/// its own operation).
pub fn required_status(status: Option<InstanceStatus>) -> Result<InstanceStatus, RepositoryError> {
    match status {
        None => Err(RepositoryError::new(ErrorKind::NullRequiredProperty, "new status is required")),
        Some(InstanceStatus::Deleted) => Err(RepositoryError::new(
            ErrorKind::StatusNotSupported,
            "DELETED can only be reached by deleting",
        )),
        Some(status) => Ok(status),
    }
}

/// Initial status of a new record; ACTIVE when unspecified.
pub fn initial_status(status: Option<InstanceStatus>) -> Result<InstanceStatus, RepositoryError> {
    match status {
        None => Ok(InstanceStatus::Active),
        explicit => required_status(explicit),
    }
}

pub fn instance_type<'t>(
    types: &'t TypeSystem,
    name: &str,
    category: TypeCategory,
) -> Result<&'t TypeDef, RepositoryError> {
    match types.get(name) {
        Some(def) if def.category == category => Ok(def),
        Some(_) => Err(RepositoryError::new(
            ErrorKind::InvalidType,
            format!("{name} is not a {} type", category.as_str()),
        )),
        None => Err(RepositoryError::new(ErrorKind::InvalidType, format!("unknown type {name}"))),
    }
}

pub fn legal_properties(
    types: &TypeSystem,
    type_name: &str,
    properties: &InstanceProperties,
) -> Result<(), RepositoryError> {
    if let Some(name) = properties.keys().find(|name| !types.is_legal_property(type_name, name)) {
        return Err(RepositoryError::new(
            ErrorKind::InvalidPropertyForType,
            format!("{name} is not a property of {type_name}"),
        ));
    }
    Ok(())
}

pub fn classification_applicable(
    types: &TypeSystem,
    classification: &str,
    entity_type: &str,
) -> Result<(), RepositoryError> {
    if !types.is_classification_valid_for(classification, entity_type) {
        return Err(RepositoryError::new(
            ErrorKind::InvalidClassificationForEntity,
            format!("{classification} cannot classify an entity of type {entity_type}"),
        ));
    }
    Ok(())
}
