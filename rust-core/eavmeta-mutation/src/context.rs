// SPDX-License-Identifier: PMPL-1.0-or-later
//! Typed view of the transaction context for mutation handlers.

use chrono::{DateTime, Utc};
use eavmeta_model::attribute::header;
use eavmeta_model::{
    EntityProxy, EntityRecord, InstanceHeader, RecordRef, RelationshipRecord, RepositoryError, StorageMapper,
    StoredEntity, TypeSystem,
};
use eavmeta_store::{Clause, ConstraintQuery, DocId, Document, EavValue, Term, TxContext, Var, WriteOp};

use crate::request::CollectionContext;
use crate::validator;

pub struct MutationContext<'a> {
    tx: &'a TxContext<'a>,
    mapper: StorageMapper<'a>,
    user: &'a str,
    collection: &'a CollectionContext,
}

impl<'a> MutationContext<'a> {
    pub fn new(tx: &'a TxContext<'a>, types: &'a TypeSystem, user: &'a str, collection: &'a CollectionContext) -> Self {
        Self {
            tx,
            mapper: StorageMapper::new(types),
            user,
            collection,
        }
    }

    pub fn types(&self) -> &'a TypeSystem {
        self.mapper.types()
    }

    pub fn mapper(&self) -> StorageMapper<'a> {
        self.mapper
    }

    pub fn user(&self) -> &str {
        self.user
    }

    pub fn collection(&self) -> &CollectionContext {
        self.collection
    }

    /// Timestamp for every header touched by this transaction.
    pub fn now(&self) -> DateTime<Utc> {
        self.tx.tx_time()
    }

    /// Header of a new record homed in the acting collection.
    pub fn new_header(&self, type_ref: eavmeta_model::TypeRef) -> InstanceHeader {
        InstanceHeader::new_local(
            type_ref,
            self.collection.id.clone(),
            self.collection.name.clone(),
            self.user,
            self.now(),
        )
    }

    pub fn document(&self, reference: &RecordRef) -> Option<&'a Document> {
        self.tx.get(&reference.doc_id())
    }

    pub fn stored_entity(&self, reference: &RecordRef) -> Result<Option<StoredEntity>, RepositoryError> {
        self.document(reference)
            .map(|doc| self.mapper.stored_entity_from_document(doc))
            .transpose()
            .map_err(RepositoryError::from)
    }

    /// The full entity at `reference`: `NOT_KNOWN` if absent, `PROXY_ONLY`
    /// for a stub.
    pub fn require_entity(&self, reference: &RecordRef) -> Result<EntityRecord, RepositoryError> {
        validator::full_entity(validator::exists(self.stored_entity(reference)?, reference)?)
    }

    pub fn relationship(&self, reference: &RecordRef) -> Result<Option<RelationshipRecord>, RepositoryError> {
        let Some(doc) = self.document(reference) else {
            return Ok(None);
        };
        let (one, two) = eavmeta_model::mapping::relationship_ends(doc)?;
        Ok(Some(self.mapper.relationship_from_document(doc, self.tx.get(&one), self.tx.get(&two))?))
    }

    pub fn require_relationship(&self, reference: &RecordRef) -> Result<RelationshipRecord, RepositoryError> {
        validator::exists(self.relationship(reference)?, reference)
    }

    /// Every relationship with `entity` at either end, whatever its status
    /// or home.
    pub fn relationships_touching(&self, entity: &RecordRef) -> Result<Vec<DocId>, RepositoryError> {
        let r = Var::new("r");
        let end = |attribute: &str| Clause::Pattern {
            entity: Term::Var(r.clone()),
            attribute: attribute.to_string(),
            value: Term::Const(EavValue::Ref(entity.doc_id())),
        };
        let query = ConstraintQuery::find(r.clone())
            .with_clause(Clause::Or(vec![end(header::END_ONE), end(header::END_TWO)]));
        Ok(self.tx.query(&query)?.refs(&r))
    }

    // -----------------------------------------------------------------------
    // Write helpers
    // -----------------------------------------------------------------------

    pub fn put_entity(&self, entity: &EntityRecord) -> Result<WriteOp, RepositoryError> {
        Ok(WriteOp::Put(self.mapper.entity_to_document(entity)?))
    }

    pub fn put_proxy(&self, proxy: &EntityProxy) -> Result<WriteOp, RepositoryError> {
        Ok(WriteOp::Put(self.mapper.proxy_to_document(proxy)?))
    }

    pub fn put_relationship(&self, relationship: &RelationshipRecord) -> Result<WriteOp, RepositoryError> {
        Ok(WriteOp::Put(self.mapper.relationship_to_document(relationship)?))
    }
}
