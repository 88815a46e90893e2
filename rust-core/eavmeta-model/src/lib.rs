// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// EavMeta Model
//
// The strongly-typed metadata instance model (entities, entity proxies,
// relationships, classifications and typed property values), the type system
// that governs it, and its mapping onto flat EAV documents.
//
// # Modules
//
// - [`reference`] -- `RecordRef`: kind tag plus GUID.
// - [`property`] -- `PropertyValue`, the closed sum of property categories.
// - [`instance`] -- Record headers and record types.
// - [`typesystem`] -- `TypeDef` and the immutable `TypeSystem`.
// - [`attribute`] -- `AttributeKey` and header attribute names.
// - [`mapping`] -- `StorageMapper`: records to documents and back.
// - [`error`] -- `ModelError` and the caller-facing `RepositoryError`.

pub mod attribute;
pub mod error;
pub mod instance;
pub mod mapping;
pub mod property;
pub mod reference;
pub mod typesystem;

pub use attribute::{AttributeKey, Namespace};
pub use error::{ErrorFamily, ErrorKind, ModelError, RepositoryError};
pub use instance::{
    Classification, ClassificationOrigin, EntityProxy, EntityRecord, InstanceHeader, InstanceStatus, ProvenanceType,
    RelationshipRecord, StoredEntity, TypeRef,
};
pub use mapping::StorageMapper;
pub use property::{InstanceProperties, PrimitiveValue, PropertyValue};
pub use reference::{RecordKind, RecordRef};
pub use typesystem::{PropertyDef, TypeCategory, TypeDef, TypeSystem};
