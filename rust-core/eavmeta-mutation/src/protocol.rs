// SPDX-License-Identifier: PMPL-1.0-or-later
//! Mutation protocol: submit, await, resolve.
//!
//! Every mutation is one transaction calling one catalog function. After
//! the store reports the outcome, the error correlation cache is consulted
//! under the transaction id: a recorded error is what the function
//! rejected the request with, and is returned as is. An aborted
//! transaction with no recorded error surfaces as an infrastructure fault.
//!
//! Reference-copy requests are routed here: a copy whose home is the local
//! collection is committed directly as a home write, anything else goes to
//! the store-as-reference-copy functions.

use eavmeta_model::{
    Classification, EntityRecord, ErrorKind, ModelError, RelationshipRecord, RepositoryError,
    StorageMapper, TypeSystem,
};
use eavmeta_store::{EavStore, TxId, TxOp, TxOutcome, WriteOp};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::error_cache::ErrorCorrelationCache;
use crate::functions::CatalogFunction;
use crate::request::{ClassifyMode, CollectionContext, Invocation, MutationRequest};

pub struct MutationProtocol {
    store: Arc<dyn EavStore>,
    types: Arc<TypeSystem>,
    errors: Arc<ErrorCorrelationCache>,
    collection: CollectionContext,
    commit_timeout: Duration,
}

impl MutationProtocol {
    /// Register the function catalog with `store` and build the protocol.
    pub async fn install(
        store: Arc<dyn EavStore>,
        types: Arc<TypeSystem>,
        errors: Arc<ErrorCorrelationCache>,
        collection: CollectionContext,
        commit_timeout: Duration,
    ) -> Result<Self, RepositoryError> {
        for function in CatalogFunction::catalog(&types, &errors) {
            store.register_function(function).await?;
        }
        debug!(store = store.name(), collection = %collection.id, "mutation functions installed");
        Ok(Self {
            store,
            types,
            errors,
            collection,
            commit_timeout,
        })
    }

    pub fn collection(&self) -> &CollectionContext {
        &self.collection
    }

    pub fn errors(&self) -> &Arc<ErrorCorrelationCache> {
        &self.errors
    }

    fn call(&self, user: &str, request: MutationRequest) -> Result<TxOp, RepositoryError> {
        let function = request.function_name().as_str().to_string();
        let invocation = Invocation {
            user: user.to_string(),
            collection: self.collection.clone(),
            request,
        };
        let args = serde_json::to_value(&invocation).map_err(ModelError::from)?;
        Ok(TxOp::Call { function, args })
    }

    /// Run one request and return its committed outcome or its typed error.
    #[instrument(skip(self, request), fields(function = %request.function_name(), target = %request.target()))]
    pub async fn invoke(&self, user: &str, request: MutationRequest) -> Result<TxOutcome, RepositoryError> {
        let op = self.call(user, request)?;
        let tx = self.store.submit_tx(vec![op]).await?;
        self.resolve(tx).await
    }

    async fn resolve(&self, tx: TxId) -> Result<TxOutcome, RepositoryError> {
        let outcome = self.store.await_commit(tx, self.commit_timeout).await?;
        if let Some(error) = self.errors.take(tx) {
            debug!(tx = %tx, kind = %error.kind(), "re-raising function error");
            return Err(error);
        }
        if !outcome.committed {
            let fault = outcome.fault.unwrap_or_else(|| format!("{tx} aborted"));
            return Err(RepositoryError::new(ErrorKind::FunctionFault, fault));
        }
        debug!(tx = %tx, writes = outcome.writes, "mutation committed");
        Ok(outcome)
    }

    async fn commit_home(&self, ops: Vec<TxOp>) -> Result<TxOutcome, RepositoryError> {
        let tx = self.store.submit_tx(ops).await?;
        self.resolve(tx).await
    }

    fn is_local_home(&self, home: &str) -> bool {
        home == self.collection.id
    }

    // -----------------------------------------------------------------------
    // Reference-copy routing
    // -----------------------------------------------------------------------

    pub async fn save_entity_reference_copy(&self, user: &str, entity: EntityRecord) -> Result<TxOutcome, RepositoryError> {
        if self.is_local_home(&entity.header.metadata_collection_id) {
            let doc = StorageMapper::new(&self.types).entity_to_document(&entity)?;
            return self.commit_home(vec![WriteOp::Put(doc).into()]).await;
        }
        self.invoke(user, MutationRequest::StoreEntityReferenceCopy { entity }).await
    }

    pub async fn purge_entity_reference_copy(
        &self,
        user: &str,
        guid: &str,
        home_collection_id: &str,
    ) -> Result<TxOutcome, RepositoryError> {
        let request = if self.is_local_home(home_collection_id) {
            MutationRequest::PurgeEntity {
                guid: guid.to_string(),
                force: true,
            }
        } else {
            MutationRequest::PurgeEntityReferenceCopy {
                guid: guid.to_string(),
                home_collection_id: home_collection_id.to_string(),
            }
        };
        self.invoke(user, request).await
    }

    /// A locally homed relationship is committed together with stubs for
    /// any endpoint that does not resolve yet, in one function call.
    pub async fn save_relationship_reference_copy(
        &self,
        user: &str,
        relationship: RelationshipRecord,
    ) -> Result<TxOutcome, RepositoryError> {
        let request = if self.is_local_home(&relationship.header.metadata_collection_id) {
            MutationRequest::StoreHomeRelationship { relationship }
        } else {
            MutationRequest::StoreRelationshipReferenceCopy { relationship }
        };
        self.invoke(user, request).await
    }

    pub async fn purge_relationship_reference_copy(
        &self,
        user: &str,
        guid: &str,
        home_collection_id: &str,
    ) -> Result<TxOutcome, RepositoryError> {
        let request = if self.is_local_home(home_collection_id) {
            MutationRequest::PurgeRelationship {
                guid: guid.to_string(),
                force: true,
            }
        } else {
            MutationRequest::PurgeRelationshipReferenceCopy {
                guid: guid.to_string(),
                home_collection_id: home_collection_id.to_string(),
            }
        };
        self.invoke(user, request).await
    }

    pub async fn save_classification_reference_copy(
        &self,
        user: &str,
        guid: &str,
        classification: Classification,
    ) -> Result<TxOutcome, RepositoryError> {
        let request = if self.is_local_home(&classification.header.metadata_collection_id) {
            MutationRequest::ClassifyEntity {
                guid: guid.to_string(),
                classification: classification.name,
                properties: classification.properties,
                mode: ClassifyMode::Upsert,
            }
        } else {
            MutationRequest::StoreClassificationReferenceCopy {
                guid: guid.to_string(),
                classification,
            }
        };
        self.invoke(user, request).await
    }

    pub async fn purge_classification_reference_copy(
        &self,
        user: &str,
        guid: &str,
        classification: &str,
        home_collection_id: &str,
    ) -> Result<TxOutcome, RepositoryError> {
        let request = if self.is_local_home(home_collection_id) {
            MutationRequest::DeclassifyEntity {
                guid: guid.to_string(),
                classification: classification.to_string(),
            }
        } else {
            MutationRequest::PurgeClassificationReferenceCopy {
                guid: guid.to_string(),
                classification: classification.to_string(),
                home_collection_id: home_collection_id.to_string(),
            }
        };
        self.invoke(user, request).await
    }
}
