// SPDX-License-Identifier: PMPL-1.0-or-later
//! Mapping between instance records and store documents.
//!
//! `*_to_document` compiles a record into one flat document; the
//! `*_from_document` functions map it back. Header fields sit at the top
//! level, properties in their namespace (flattened and serialized side by
//! side), and each classification under `classifications.<name>`.

use chrono::{DateTime, Utc};
use eavmeta_store::{DocId, Document, EavValue};

use crate::attribute::{header, AttributeKey, Namespace};
use crate::error::ModelError;
use crate::instance::{
    Classification, ClassificationOrigin, EntityProxy, EntityRecord, InstanceHeader, InstanceStatus, ProvenanceType,
    RelationshipRecord, StoredEntity, TypeRef,
};
use crate::property::{InstanceProperties, PropertyValue};
use crate::reference::{RecordKind, RecordRef};
use crate::typesystem::TypeSystem;

/// Compiles records for storage and maps documents back into records.
#[derive(Debug, Clone, Copy)]
pub struct StorageMapper<'a> {
    types: &'a TypeSystem,
}

impl<'a> StorageMapper<'a> {
    pub fn new(types: &'a TypeSystem) -> Self {
        Self { types }
    }

    pub fn types(&self) -> &'a TypeSystem {
        self.types
    }

    // -----------------------------------------------------------------------
    // Record -> document
    // -----------------------------------------------------------------------

    pub fn entity_to_document(&self, entity: &EntityRecord) -> Result<Document, ModelError> {
        let mut doc = Document::new(RecordRef::entity(&entity.guid).doc_id());
        self.write_type(&mut doc, &entity.header)?;
        write_header(&mut doc, "", &entity.header);
        doc.set(header::IS_PROXY, EavValue::Bool(false));
        self.write_properties(
            &mut doc,
            Namespace::EntityProperties,
            &entity.header.type_ref.name,
            &entity.properties,
        )?;

        doc.set(
            header::CLASSIFICATIONS,
            EavValue::List(entity.classifications.iter().map(|c| EavValue::str(&c.name)).collect()),
        );
        if let Some(latest) = entity.latest_classification_change() {
            doc.set(header::LATEST_CLASSIFICATION_CHANGE, EavValue::Time(latest));
        }
        for classification in &entity.classifications {
            self.write_classification(&mut doc, classification)?;
        }
        Ok(doc)
    }

    pub fn proxy_to_document(&self, proxy: &EntityProxy) -> Result<Document, ModelError> {
        let mut doc = Document::new(RecordRef::entity(&proxy.guid).doc_id());
        self.write_type(&mut doc, &proxy.header)?;
        write_header(&mut doc, "", &proxy.header);
        doc.set(header::IS_PROXY, EavValue::Bool(true));
        self.write_properties(
            &mut doc,
            Namespace::EntityProperties,
            &proxy.header.type_ref.name,
            &proxy.unique_properties,
        )?;
        Ok(doc)
    }

    pub fn relationship_to_document(&self, relationship: &RelationshipRecord) -> Result<Document, ModelError> {
        let mut doc = Document::new(RecordRef::relationship(&relationship.guid).doc_id());
        self.write_type(&mut doc, &relationship.header)?;
        write_header(&mut doc, "", &relationship.header);
        doc.set(header::END_ONE, EavValue::Ref(relationship.end_one.reference().doc_id()));
        doc.set(header::END_TWO, EavValue::Ref(relationship.end_two.reference().doc_id()));
        self.write_properties(
            &mut doc,
            Namespace::RelationshipProperties,
            &relationship.header.type_ref.name,
            &relationship.properties,
        )?;
        Ok(doc)
    }

    /// Write (or overwrite) one classification inside an entity document.
    pub fn write_classification(&self, doc: &mut Document, classification: &Classification) -> Result<(), ModelError> {
        let prefix = header::classification_prefix(&classification.name);
        write_header(doc, &prefix, &classification.header);
        doc.set(
            header::classification(&classification.name, header::ORIGIN),
            EavValue::str(classification.origin.as_str()),
        );
        if let Some(origin_guid) = &classification.origin_guid {
            doc.set(
                header::classification(&classification.name, header::ORIGIN_GUID),
                EavValue::str(origin_guid),
            );
        }
        self.write_properties(
            doc,
            Namespace::ClassificationProperties(classification.name.clone()),
            &classification.header.type_ref.name,
            &classification.properties,
        )
    }

    fn write_type(&self, doc: &mut Document, header: &InstanceHeader) -> Result<(), ModelError> {
        let closure = self.types.supertype_closure(&header.type_ref.name)?;
        let category = closure
            .first()
            .map(|d| d.category.as_str())
            .ok_or_else(|| ModelError::UnknownType(header.type_ref.name.clone()))?;
        doc.set(
            header::TYPE_SUPERS,
            EavValue::List(closure.iter().map(|d| EavValue::str(&d.guid)).collect()),
        );
        doc.set(header::TYPE_CATEGORY, EavValue::str(category));
        Ok(())
    }

    /// Replace every property of `namespace` on `doc`.
    pub fn write_properties(
        &self,
        doc: &mut Document,
        namespace: Namespace,
        type_name: &str,
        properties: &InstanceProperties,
    ) -> Result<(), ModelError> {
        doc.remove_prefixed(&namespace.queryable_prefix());
        doc.remove_prefixed(&namespace.serialized_prefix());
        for (name, value) in properties {
            let key = AttributeKey::for_storage(self.types, namespace.clone(), type_name, name);
            doc.set(key.queryable(), value.flatten());
            doc.set(key.serialized(), value.to_stored()?);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Document -> record
    // -----------------------------------------------------------------------

    /// Map an entity document to a full record or a proxy.
    pub fn stored_entity_from_document(&self, doc: &Document) -> Result<StoredEntity, ModelError> {
        let reference = RecordRef::from_doc_id(&doc.id)?;
        if reference.kind != RecordKind::Entity {
            return Err(ModelError::mapping(&doc.id, "not an entity document"));
        }
        let header = read_header(doc, "")?;
        let properties = read_properties(doc, &Namespace::EntityProperties)?;

        if doc.get(header::IS_PROXY).and_then(EavValue::as_bool).unwrap_or(false) {
            return Ok(StoredEntity::Proxy(EntityProxy {
                guid: reference.guid,
                header,
                unique_properties: properties,
            }));
        }

        let mut classifications = Vec::new();
        for name in classification_names(doc) {
            classifications.push(read_classification(doc, &name)?);
        }
        Ok(StoredEntity::Full(EntityRecord {
            guid: reference.guid,
            header,
            properties,
            classifications,
        }))
    }

    /// Proxy view of any entity document, full or stub.
    pub fn proxy_from_document(&self, doc: &Document) -> Result<EntityProxy, ModelError> {
        match self.stored_entity_from_document(doc)? {
            StoredEntity::Full(entity) => Ok(self.proxy_of(&entity)),
            StoredEntity::Proxy(proxy) => Ok(proxy),
        }
    }

    /// Map a relationship document, resolving its ends from the given
    /// endpoint documents.
    pub fn relationship_from_document(
        &self,
        doc: &Document,
        end_one: Option<&Document>,
        end_two: Option<&Document>,
    ) -> Result<RelationshipRecord, ModelError> {
        let reference = RecordRef::from_doc_id(&doc.id)?;
        if reference.kind != RecordKind::Relationship {
            return Err(ModelError::mapping(&doc.id, "not a relationship document"));
        }
        let end_one = end_one.ok_or(ModelError::InconsistentRelationship {
            guid: reference.guid.clone(),
            end: "end1",
        })?;
        let end_two = end_two.ok_or(ModelError::InconsistentRelationship {
            guid: reference.guid.clone(),
            end: "end2",
        })?;
        Ok(RelationshipRecord {
            header: read_header(doc, "")?,
            properties: read_properties(doc, &Namespace::RelationshipProperties)?,
            end_one: self.proxy_from_document(end_one)?,
            end_two: self.proxy_from_document(end_two)?,
            guid: reference.guid,
        })
    }

    /// Proxy carrying an entity's header and unique properties.
    pub fn proxy_of(&self, entity: &EntityRecord) -> EntityProxy {
        let unique = self.types.unique_properties(&entity.header.type_ref.name);
        EntityProxy {
            guid: entity.guid.clone(),
            header: entity.header.clone(),
            unique_properties: entity
                .properties
                .iter()
                .filter(|(name, _)| unique.contains(name))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        }
    }
}

/// Endpoint references of a relationship document.
pub fn relationship_ends(doc: &Document) -> Result<(DocId, DocId), ModelError> {
    let end = |attr: &str| {
        doc.get(attr)
            .and_then(EavValue::as_ref_id)
            .cloned()
            .ok_or_else(|| ModelError::mapping(&doc.id, format!("missing {attr}")))
    };
    Ok((end(header::END_ONE)?, end(header::END_TWO)?))
}

/// Names of the classifications an entity document holds, in stored order.
pub fn classification_names(doc: &Document) -> Vec<String> {
    doc.get(header::CLASSIFICATIONS)
        .map(|v| v.elements().into_iter().filter_map(|e| e.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

fn read_classification(doc: &Document, name: &str) -> Result<Classification, ModelError> {
    let prefix = header::classification_prefix(name);
    let origin = match doc.get(&header::classification(name, header::ORIGIN)).and_then(EavValue::as_str) {
        Some(s) => s.parse()?,
        None => ClassificationOrigin::Assigned,
    };
    Ok(Classification {
        name: name.to_string(),
        header: read_header(doc, &prefix)?,
        origin,
        origin_guid: opt_str(doc, &header::classification(name, header::ORIGIN_GUID)),
        properties: read_properties(doc, &Namespace::ClassificationProperties(name.to_string()))?,
    })
}

fn write_header(doc: &mut Document, prefix: &str, h: &InstanceHeader) {
    let attr = |field: &str| format!("{prefix}{field}");
    let opt = |v: &Option<String>| v.as_ref().map(EavValue::str).unwrap_or(EavValue::Null);

    doc.set(attr(header::TYPE_ID), EavValue::str(&h.type_ref.guid));
    doc.set(attr(header::TYPE_NAME), EavValue::str(&h.type_ref.name));
    doc.set(attr(header::VERSION), EavValue::Int(h.version as i64));
    doc.set(attr(header::STATUS), EavValue::str(h.status.as_str()));
    doc.set(
        attr(header::STATUS_ON_DELETE),
        h.status_on_delete.map(|s| EavValue::str(s.as_str())).unwrap_or(EavValue::Null),
    );
    doc.set(attr(header::CREATED_BY), opt(&h.created_by));
    doc.set(attr(header::UPDATED_BY), opt(&h.updated_by));
    doc.set(
        attr(header::MAINTAINED_BY),
        if h.maintained_by.is_empty() {
            EavValue::Null
        } else {
            EavValue::List(h.maintained_by.iter().map(EavValue::str).collect())
        },
    );
    doc.set(attr(header::CREATE_TIME), EavValue::Time(h.create_time));
    doc.set(attr(header::UPDATE_TIME), h.update_time.map(EavValue::Time).unwrap_or(EavValue::Null));
    doc.set(attr(header::PROVENANCE), EavValue::str(h.provenance.as_str()));
    doc.set(attr(header::COLLECTION_ID), EavValue::str(&h.metadata_collection_id));
    doc.set(attr(header::COLLECTION_NAME), opt(&h.metadata_collection_name));
    doc.set(attr(header::REPLICATED_BY), opt(&h.replicated_by));
    doc.set(attr(header::LICENSE), opt(&h.instance_license));
}

fn read_header(doc: &Document, prefix: &str) -> Result<InstanceHeader, ModelError> {
    let attr = |field: &str| format!("{prefix}{field}");
    let required = |field: &str| {
        opt_str(doc, &attr(field)).ok_or_else(|| ModelError::mapping(&doc.id, format!("missing {prefix}{field}")))
    };

    let version = doc
        .get(&attr(header::VERSION))
        .and_then(EavValue::as_int)
        .ok_or_else(|| ModelError::mapping(&doc.id, format!("missing {prefix}version")))?;
    let create_time = opt_time(doc, &attr(header::CREATE_TIME))
        .ok_or_else(|| ModelError::mapping(&doc.id, format!("missing {prefix}createTime")))?;
    let status_on_delete = match opt_str(doc, &attr(header::STATUS_ON_DELETE)) {
        Some(s) => Some(s.parse::<InstanceStatus>()?),
        None => None,
    };

    Ok(InstanceHeader {
        type_ref: TypeRef {
            guid: required(header::TYPE_ID)?,
            name: required(header::TYPE_NAME)?,
        },
        version: version.max(0) as u64,
        status: required(header::STATUS)?.parse()?,
        status_on_delete,
        created_by: opt_str(doc, &attr(header::CREATED_BY)),
        updated_by: opt_str(doc, &attr(header::UPDATED_BY)),
        maintained_by: doc
            .get(&attr(header::MAINTAINED_BY))
            .map(|v| v.elements().into_iter().filter_map(|e| e.as_str().map(str::to_string)).collect())
            .unwrap_or_default(),
        create_time,
        update_time: opt_time(doc, &attr(header::UPDATE_TIME)),
        provenance: required(header::PROVENANCE)?.parse::<ProvenanceType>()?,
        metadata_collection_id: required(header::COLLECTION_ID)?,
        metadata_collection_name: opt_str(doc, &attr(header::COLLECTION_NAME)),
        replicated_by: opt_str(doc, &attr(header::REPLICATED_BY)),
        instance_license: opt_str(doc, &attr(header::LICENSE)),
    })
}

fn read_properties(doc: &Document, namespace: &Namespace) -> Result<InstanceProperties, ModelError> {
    let prefix = namespace.serialized_prefix();
    let mut properties = InstanceProperties::new();
    for (attribute, stored) in doc.prefixed(&prefix) {
        if let Some(name) = AttributeKey::base_name_of(namespace, attribute) {
            properties.insert(name, PropertyValue::from_stored(stored)?);
        }
    }
    Ok(properties)
}

fn opt_str(doc: &Document, attribute: &str) -> Option<String> {
    doc.get(attribute).and_then(EavValue::as_str).map(str::to_string)
}

fn opt_time(doc: &Document, attribute: &str) -> Option<DateTime<Utc>> {
    doc.get(attribute).and_then(EavValue::as_time)
}
