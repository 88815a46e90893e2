// SPDX-License-Identifier: PMPL-1.0-or-later
//! The transaction function catalog.
//!
//! Every [`FunctionName`] is registered with the store as one
//! [`CatalogFunction`]. On invocation it decodes the [`Invocation`], runs
//! the matching handler against the latest state, and either returns the
//! handler's write set or, when a precondition fails, records the typed
//! error in the [`ErrorCorrelationCache`] and returns an empty write set.
//! Only undecodable arguments abort the transaction.

mod classification;
mod entity;
mod reference_copy;
mod relationship;

use eavmeta_model::{RepositoryError, TypeSystem};
use eavmeta_store::{FunctionFault, TransactionFunction, TxContext, WriteOp};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::context::MutationContext;
use crate::error_cache::ErrorCorrelationCache;
use crate::request::{FunctionName, Invocation, MutationRequest};

pub struct CatalogFunction {
    name: FunctionName,
    types: Arc<TypeSystem>,
    errors: Arc<ErrorCorrelationCache>,
}

impl CatalogFunction {
    pub fn new(name: FunctionName, types: Arc<TypeSystem>, errors: Arc<ErrorCorrelationCache>) -> Self {
        Self { name, types, errors }
    }

    /// One function per catalog entry, sharing the type system and cache.
    pub fn catalog(types: &Arc<TypeSystem>, errors: &Arc<ErrorCorrelationCache>) -> Vec<Arc<dyn TransactionFunction>> {
        FunctionName::ALL
            .iter()
            .map(|name| Arc::new(Self::new(*name, types.clone(), errors.clone())) as Arc<dyn TransactionFunction>)
            .collect()
    }
}

impl TransactionFunction for CatalogFunction {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    fn invoke(&self, ctx: &TxContext<'_>, args: &serde_json::Value) -> Result<Vec<WriteOp>, FunctionFault> {
        let invocation: Invocation = serde_json::from_value(args.clone())
            .map_err(|e| FunctionFault::new(format!("malformed arguments to {}: {e}", self.name)))?;
        if invocation.request.function_name() != self.name {
            return Err(FunctionFault::new(format!(
                "{} invoked with a {} request",
                self.name,
                invocation.request.function_name()
            )));
        }

        let mctx = MutationContext::new(ctx, &self.types, &invocation.user, &invocation.collection);
        match dispatch(&mctx, &invocation.request) {
            Ok(writes) => {
                debug!(tx = %ctx.tx_id(), function = %self.name, writes = writes.len(), "function accepted");
                Ok(writes)
            }
            Err(error) => {
                warn!(tx = %ctx.tx_id(), function = %self.name, error = %error, "function rejected");
                self.errors.record(ctx.tx_id(), error);
                Ok(Vec::new())
            }
        }
    }
}

fn dispatch(ctx: &MutationContext<'_>, request: &MutationRequest) -> Result<Vec<WriteOp>, RepositoryError> {
    use MutationRequest::*;
    match request {
        CreateEntity {
            guid,
            type_name,
            properties,
            classifications,
            initial_status,
        } => entity::create(ctx, guid, type_name, properties, classifications, *initial_status),
        CreateEntityStub { proxy } => entity::create_stub(ctx, proxy),
        UpdateEntityProperties { guid, properties } => entity::update_properties(ctx, guid, properties),
        UpdateEntityStatus { guid, status } => entity::update_status(ctx, guid, *status),
        DeleteEntity { guid } => entity::soft_delete(ctx, guid),
        RestoreEntity { guid } => entity::restore(ctx, guid),
        PurgeEntity { guid, force } => entity::purge(ctx, guid, *force),
        ClassifyEntity {
            guid,
            classification,
            properties,
            mode,
        } => classification::classify(ctx, guid, classification, properties, *mode),
        DeclassifyEntity { guid, classification } => classification::declassify(ctx, guid, classification),
        CreateRelationship {
            guid,
            type_name,
            properties,
            initial_status,
            end_one,
            end_two,
        } => relationship::create(ctx, guid, type_name, properties, *initial_status, end_one, end_two),
        UpdateRelationshipProperties { guid, properties } => relationship::update_properties(ctx, guid, properties),
        UpdateRelationshipStatus { guid, status } => relationship::update_status(ctx, guid, *status),
        DeleteRelationship { guid } => relationship::soft_delete(ctx, guid),
        RestoreRelationship { guid } => relationship::restore(ctx, guid),
        PurgeRelationship { guid, force } => relationship::purge(ctx, guid, *force),
        StoreEntityReferenceCopy { entity } => reference_copy::store_entity(ctx, entity),
        PurgeEntityReferenceCopy {
            guid,
            home_collection_id,
        } => reference_copy::purge_entity(ctx, guid, home_collection_id),
        StoreRelationshipReferenceCopy { relationship } => reference_copy::store_relationship(ctx, relationship),
        StoreHomeRelationship { relationship } => reference_copy::store_home_relationship(ctx, relationship),
        PurgeRelationshipReferenceCopy {
            guid,
            home_collection_id,
        } => reference_copy::purge_relationship(ctx, guid, home_collection_id),
        StoreClassificationReferenceCopy { guid, classification } => {
            reference_copy::store_classification(ctx, guid, classification)
        }
        PurgeClassificationReferenceCopy {
            guid,
            classification,
            home_collection_id,
        } => reference_copy::purge_classification(ctx, guid, classification, home_collection_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::CollectionContext;
    use chrono::Utc;
    use eavmeta_model::{ErrorKind, TypeCategory, TypeDef};
    use eavmeta_store::{DocumentSet, TxId};

    fn function(name: FunctionName) -> (CatalogFunction, Arc<ErrorCorrelationCache>) {
        let types = Arc::new(TypeSystem::new(vec![TypeDef::new("t-a", "Asset", TypeCategory::Entity)]).unwrap());
        let errors = Arc::new(ErrorCorrelationCache::with_defaults());
        (CatalogFunction::new(name, types, errors.clone()), errors)
    }

    fn invocation(request: MutationRequest) -> serde_json::Value {
        serde_json::to_value(Invocation {
            user: "alice".into(),
            collection: CollectionContext::new("home", None),
            request,
        })
        .unwrap()
    }

    #[test]
    fn test_rejection_is_cached_and_commits_nothing() {
        let (function, errors) = function(FunctionName::DeleteEntity);
        let docs = DocumentSet::default();
        let ctx = TxContext::new(TxId(9), Utc::now(), &docs);
        let writes = function
            .invoke(&ctx, &invocation(MutationRequest::DeleteEntity { guid: "missing".into() }))
            .unwrap();
        assert!(writes.is_empty());
        assert_eq!(errors.take(TxId(9)).map(|e| e.kind()), Some(ErrorKind::NotKnown));
    }

    #[test]
    fn test_malformed_arguments_fault() {
        let (function, errors) = function(FunctionName::DeleteEntity);
        let docs = DocumentSet::default();
        let ctx = TxContext::new(TxId(1), Utc::now(), &docs);
        assert!(function.invoke(&ctx, &serde_json::json!({"nonsense": true})).is_err());

        let mismatched = invocation(MutationRequest::RestoreEntity { guid: "g".into() });
        assert!(function.invoke(&ctx, &mismatched).is_err());
        assert!(errors.is_empty());
    }

    #[test]
    fn test_catalog_covers_every_name() {
        let types = Arc::new(TypeSystem::new(Vec::new()).unwrap());
        let errors = Arc::new(ErrorCorrelationCache::with_defaults());
        let catalog = CatalogFunction::catalog(&types, &errors);
        assert_eq!(catalog.len(), FunctionName::ALL.len());
        assert!(catalog.iter().any(|f| f.name() == "purge-entity"));
    }
}
