// SPDX-License-Identifier: PMPL-1.0-or-later
//! The metadata repository facade.
//!
//! Reads open one snapshot ("now" or a past instant), run against it,
//! hydrate results through the same snapshot and release it on every exit
//! path. Mutations go through the [`MutationProtocol`]; those that return a
//! record read it back as of the committing transaction.

use chrono::{DateTime, Utc};
use eavmeta_model::{
    Classification, EntityProxy, EntityRecord, InstanceProperties, InstanceStatus, RecordRef, RelationshipRecord,
    RepositoryError, StoredEntity, TypeSystem,
};
use eavmeta_mutation::{
    validator, ClassifyMode, CollectionContext, ErrorCacheStats, ErrorCorrelationCache, MutationProtocol,
    MutationRequest,
};
use eavmeta_query::{ConditionCompiler, Diagnostic, EntitySearch, GraphEngine, GraphQuery, RelationshipSearch};
use eavmeta_store::{EavStore, Snapshot, TxOutcome};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::config::RepositoryConfig;
use crate::draft::{NewEntity, NewRelationship};
use crate::mapper::ResultMapper;

/// One page of search results plus the conditions the compiler dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPage<T> {
    pub records: Vec<T>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Entities around a root and the relationships connecting them.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityNeighborhood {
    /// The root as stored; it may be a stub.
    pub root: StoredEntity,
    pub entities: Vec<EntityRecord>,
    pub relationships: Vec<RelationshipRecord>,
}

pub struct MetadataRepository {
    store: Arc<dyn EavStore>,
    types: Arc<TypeSystem>,
    config: RepositoryConfig,
    protocol: MutationProtocol,
}

impl MetadataRepository {
    /// Validate `config`, install the transaction functions into `store`
    /// and return the repository.
    pub async fn open(
        store: Arc<dyn EavStore>,
        types: Arc<TypeSystem>,
        config: RepositoryConfig,
    ) -> Result<Self, RepositoryError> {
        config.validate()?;
        let errors = Arc::new(ErrorCorrelationCache::new(config.error_cache.clone()));
        let protocol = MutationProtocol::install(
            store.clone(),
            types.clone(),
            errors,
            config.collection(),
            config.commit_timeout(),
        )
        .await?;
        info!(
            store = store.name(),
            collection = %config.local_collection_id,
            "metadata repository opened"
        );
        Ok(Self {
            store,
            types,
            config,
            protocol,
        })
    }

    pub fn types(&self) -> &TypeSystem {
        &self.types
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn collection(&self) -> &CollectionContext {
        self.protocol.collection()
    }

    pub fn error_cache_stats(&self) -> ErrorCacheStats {
        self.protocol.errors().stats()
    }

    fn results<'a>(&'a self, snapshot: &'a Snapshot) -> ResultMapper<'a> {
        ResultMapper::new(self.store.as_ref(), snapshot, &self.types)
    }

    /// Release `snapshot`, then hand back `result`. A release failure only
    /// surfaces when the operation itself succeeded.
    async fn release<T>(&self, snapshot: Snapshot, result: Result<T, RepositoryError>) -> Result<T, RepositoryError> {
        match self.store.release_snapshot(snapshot).await {
            Ok(()) => result,
            Err(err) => {
                warn!(error = %err, "snapshot release failed");
                result.and(Err(err.into()))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Point reads
    // -----------------------------------------------------------------------

    /// What is stored under an entity GUID, full record or stub.
    #[instrument(skip(self))]
    pub async fn get_stored_entity(
        &self,
        guid: &str,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<Option<StoredEntity>, RepositoryError> {
        let snapshot = self.store.open_snapshot(as_of).await?;
        let result = self.results(&snapshot).stored_entity(&RecordRef::entity(guid).doc_id()).await;
        self.release(snapshot, result).await
    }

    /// The full entity; `NOT_KNOWN` if nothing is stored, `PROXY_ONLY` for
    /// a stub.
    pub async fn get_entity(&self, guid: &str, as_of: Option<DateTime<Utc>>) -> Result<EntityRecord, RepositoryError> {
        let stored = self.get_stored_entity(guid, as_of).await?;
        validator::full_entity(validator::exists(stored, &RecordRef::entity(guid))?)
    }

    #[instrument(skip(self))]
    pub async fn get_relationship(
        &self,
        guid: &str,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<RelationshipRecord, RepositoryError> {
        let reference = RecordRef::relationship(guid);
        let snapshot = self.store.open_snapshot(as_of).await?;
        let result = self.results(&snapshot).relationship(&reference.doc_id()).await;
        validator::exists(self.release(snapshot, result).await?, &reference)
    }

    // -----------------------------------------------------------------------
    // Searches
    // -----------------------------------------------------------------------

    #[instrument(skip(self, search))]
    pub async fn find_entities(&self, search: &EntitySearch) -> Result<SearchPage<EntityRecord>, RepositoryError> {
        let compiled = ConditionCompiler::new(&self.types).entity_search(search, &self.config.query)?;
        let snapshot = self.store.open_snapshot(search.as_of).await?;
        let result = match self.store.query(&snapshot, &compiled.query).await {
            Ok(rows) => self.results(&snapshot).entities(&rows.refs(&compiled.record)).await,
            Err(err) => Err(err.into()),
        };
        let records = self.release(snapshot, result).await?;
        debug!(found = records.len(), dropped = compiled.diagnostics.len(), "entity search");
        Ok(SearchPage {
            records,
            diagnostics: compiled.diagnostics,
        })
    }

    #[instrument(skip(self, search))]
    pub async fn find_relationships(
        &self,
        search: &RelationshipSearch,
    ) -> Result<SearchPage<RelationshipRecord>, RepositoryError> {
        let compiled = ConditionCompiler::new(&self.types).relationship_search(search, &self.config.query)?;
        let snapshot = self.store.open_snapshot(search.as_of).await?;
        let result = match self.store.query(&snapshot, &compiled.query).await {
            Ok(rows) => self.results(&snapshot).relationships(&rows.refs(&compiled.record)).await,
            Err(err) => Err(err.into()),
        };
        let records = self.release(snapshot, result).await?;
        Ok(SearchPage {
            records,
            diagnostics: compiled.diagnostics,
        })
    }

    /// Relationships with the entity at either end, of any home.
    #[instrument(skip(self, search))]
    pub async fn relationships_for_entity(
        &self,
        guid: &str,
        search: &RelationshipSearch,
    ) -> Result<SearchPage<RelationshipRecord>, RepositoryError> {
        let entity = RecordRef::entity(guid);
        let compiled =
            ConditionCompiler::new(&self.types).relationships_for_entity(&entity, search, &self.config.query)?;
        let snapshot = self.store.open_snapshot(search.as_of).await?;
        let result = self.entity_relationships(&snapshot, &entity, &compiled).await;
        let records = self.release(snapshot, result).await?;
        Ok(SearchPage {
            records,
            diagnostics: compiled.diagnostics,
        })
    }

    async fn entity_relationships(
        &self,
        snapshot: &Snapshot,
        entity: &RecordRef,
        compiled: &eavmeta_query::CompiledQuery,
    ) -> Result<Vec<RelationshipRecord>, RepositoryError> {
        let results = self.results(snapshot);
        validator::exists(results.stored_entity(&entity.doc_id()).await?, entity)?;
        let rows = self.store.query(snapshot, &compiled.query).await?;
        results.relationships(&rows.refs(&compiled.record)).await
    }

    // -----------------------------------------------------------------------
    // Graph queries
    // -----------------------------------------------------------------------

    /// Entities reachable from the root, filtered, sequenced and paged.
    #[instrument(skip(self, query), fields(root = %query.root))]
    pub async fn related_entities(&self, query: &GraphQuery) -> Result<Vec<EntityRecord>, RepositoryError> {
        let snapshot = self.store.open_snapshot(query.as_of).await?;
        let engine = GraphEngine::new(&self.types, &self.config.query);
        let result = match engine.related_entities(self.store.as_ref(), &snapshot, query).await {
            Ok(ids) => self.results(&snapshot).entities(&ids).await,
            Err(err) => Err(err.into()),
        };
        self.release(snapshot, result).await
    }

    #[instrument(skip(self, query), fields(root = %query.root))]
    pub async fn entity_neighborhood(&self, query: &GraphQuery) -> Result<EntityNeighborhood, RepositoryError> {
        let snapshot = self.store.open_snapshot(query.as_of).await?;
        let result = self.neighborhood_in(&snapshot, query).await;
        self.release(snapshot, result).await
    }

    async fn neighborhood_in(&self, snapshot: &Snapshot, query: &GraphQuery) -> Result<EntityNeighborhood, RepositoryError> {
        let engine = GraphEngine::new(&self.types, &self.config.query);
        let neighborhood = engine.neighborhood(self.store.as_ref(), snapshot, query).await?;
        let results = self.results(snapshot);

        let root_ref = RecordRef::entity(&query.root);
        let root = validator::exists(results.stored_entity(&root_ref.doc_id()).await?, &root_ref)?;
        let others = neighborhood.entities.get(1..).unwrap_or_default();
        Ok(EntityNeighborhood {
            root,
            entities: results.entities(others).await?,
            relationships: results.relationships(&neighborhood.relationships).await?,
        })
    }

    // -----------------------------------------------------------------------
    // Entity mutations
    // -----------------------------------------------------------------------

    /// Run `request` and read the entity it targets back as of the commit.
    async fn mutate_entity(&self, user: &str, request: MutationRequest) -> Result<EntityRecord, RepositoryError> {
        let guid = request.target().guid;
        let outcome = self.protocol.invoke(user, request).await?;
        self.get_entity(&guid, Some(outcome.tx_time)).await
    }

    async fn mutate_relationship(
        &self,
        user: &str,
        request: MutationRequest,
    ) -> Result<RelationshipRecord, RepositoryError> {
        let guid = request.target().guid;
        let outcome = self.protocol.invoke(user, request).await?;
        self.get_relationship(&guid, Some(outcome.tx_time)).await
    }

    #[instrument(skip(self, draft), fields(type_name = %draft.type_name))]
    pub async fn create_entity(&self, user: &str, draft: NewEntity) -> Result<EntityRecord, RepositoryError> {
        let guid = draft.guid.unwrap_or_else(|| RecordRef::new_entity().guid);
        let request = MutationRequest::CreateEntity {
            guid: guid.clone(),
            type_name: draft.type_name,
            properties: draft.properties,
            classifications: draft.classifications,
            initial_status: draft.initial_status,
        };
        let entity = self.mutate_entity(user, request).await?;
        info!(guid = %guid, "entity created");
        Ok(entity)
    }

    /// Store a stub for an entity homed elsewhere, unless something is
    /// already stored under its GUID.
    pub async fn create_entity_stub(&self, user: &str, proxy: EntityProxy) -> Result<(), RepositoryError> {
        self.protocol
            .invoke(user, MutationRequest::CreateEntityStub { proxy })
            .await
            .map(|_| ())
    }

    pub async fn update_entity_properties(
        &self,
        user: &str,
        guid: &str,
        properties: InstanceProperties,
    ) -> Result<EntityRecord, RepositoryError> {
        self.mutate_entity(
            user,
            MutationRequest::UpdateEntityProperties {
                guid: guid.to_string(),
                properties,
            },
        )
        .await
    }

    pub async fn update_entity_status(
        &self,
        user: &str,
        guid: &str,
        status: Option<InstanceStatus>,
    ) -> Result<EntityRecord, RepositoryError> {
        self.mutate_entity(
            user,
            MutationRequest::UpdateEntityStatus {
                guid: guid.to_string(),
                status,
            },
        )
        .await
    }

    pub async fn delete_entity(&self, user: &str, guid: &str) -> Result<EntityRecord, RepositoryError> {
        self.mutate_entity(user, MutationRequest::DeleteEntity { guid: guid.to_string() })
            .await
    }

    pub async fn restore_entity(&self, user: &str, guid: &str) -> Result<EntityRecord, RepositoryError> {
        self.mutate_entity(user, MutationRequest::RestoreEntity { guid: guid.to_string() })
            .await
    }

    /// Remove a soft-deleted entity and every relationship touching it.
    #[instrument(skip(self))]
    pub async fn purge_entity(&self, user: &str, guid: &str) -> Result<(), RepositoryError> {
        self.purge(user, MutationRequest::PurgeEntity {
            guid: guid.to_string(),
            force: false,
        })
        .await
    }

    /// As [`Self::purge_entity`], without requiring a soft delete first.
    #[instrument(skip(self))]
    pub async fn force_purge_entity(&self, user: &str, guid: &str) -> Result<(), RepositoryError> {
        self.purge(user, MutationRequest::PurgeEntity {
            guid: guid.to_string(),
            force: true,
        })
        .await
    }

    async fn purge(&self, user: &str, request: MutationRequest) -> Result<(), RepositoryError> {
        let target = request.target();
        let outcome = self.protocol.invoke(user, request).await?;
        info!(target = %target, evicted = outcome.writes, tx = %outcome.tx_id, "purged");
        Ok(())
    }

    pub async fn classify_entity(
        &self,
        user: &str,
        guid: &str,
        classification: &str,
        properties: InstanceProperties,
    ) -> Result<EntityRecord, RepositoryError> {
        self.classify(user, guid, classification, properties, ClassifyMode::Add).await
    }

    /// Replace the properties of a classification already on the entity.
    pub async fn update_entity_classification(
        &self,
        user: &str,
        guid: &str,
        classification: &str,
        properties: InstanceProperties,
    ) -> Result<EntityRecord, RepositoryError> {
        self.classify(user, guid, classification, properties, ClassifyMode::Update).await
    }

    async fn classify(
        &self,
        user: &str,
        guid: &str,
        classification: &str,
        properties: InstanceProperties,
        mode: ClassifyMode,
    ) -> Result<EntityRecord, RepositoryError> {
        self.mutate_entity(
            user,
            MutationRequest::ClassifyEntity {
                guid: guid.to_string(),
                classification: classification.to_string(),
                properties,
                mode,
            },
        )
        .await
    }

    pub async fn declassify_entity(
        &self,
        user: &str,
        guid: &str,
        classification: &str,
    ) -> Result<EntityRecord, RepositoryError> {
        self.mutate_entity(
            user,
            MutationRequest::DeclassifyEntity {
                guid: guid.to_string(),
                classification: classification.to_string(),
            },
        )
        .await
    }

    // -----------------------------------------------------------------------
    // Relationship mutations
    // -----------------------------------------------------------------------

    #[instrument(skip(self, draft), fields(type_name = %draft.type_name))]
    pub async fn create_relationship(
        &self,
        user: &str,
        draft: NewRelationship,
    ) -> Result<RelationshipRecord, RepositoryError> {
        let guid = draft.guid.unwrap_or_else(|| RecordRef::new_relationship().guid);
        let request = MutationRequest::CreateRelationship {
            guid: guid.clone(),
            type_name: draft.type_name,
            properties: draft.properties,
            initial_status: draft.initial_status,
            end_one: draft.end_one,
            end_two: draft.end_two,
        };
        let relationship = self.mutate_relationship(user, request).await?;
        info!(guid = %guid, "relationship created");
        Ok(relationship)
    }

    pub async fn update_relationship_properties(
        &self,
        user: &str,
        guid: &str,
        properties: InstanceProperties,
    ) -> Result<RelationshipRecord, RepositoryError> {
        self.mutate_relationship(
            user,
            MutationRequest::UpdateRelationshipProperties {
                guid: guid.to_string(),
                properties,
            },
        )
        .await
    }

    pub async fn update_relationship_status(
        &self,
        user: &str,
        guid: &str,
        status: Option<InstanceStatus>,
    ) -> Result<RelationshipRecord, RepositoryError> {
        self.mutate_relationship(
            user,
            MutationRequest::UpdateRelationshipStatus {
                guid: guid.to_string(),
                status,
            },
        )
        .await
    }

    pub async fn delete_relationship(&self, user: &str, guid: &str) -> Result<RelationshipRecord, RepositoryError> {
        self.mutate_relationship(user, MutationRequest::DeleteRelationship { guid: guid.to_string() })
            .await
    }

    pub async fn restore_relationship(&self, user: &str, guid: &str) -> Result<RelationshipRecord, RepositoryError> {
        self.mutate_relationship(user, MutationRequest::RestoreRelationship { guid: guid.to_string() })
            .await
    }

    #[instrument(skip(self))]
    pub async fn purge_relationship(&self, user: &str, guid: &str) -> Result<(), RepositoryError> {
        self.purge(user, MutationRequest::PurgeRelationship {
            guid: guid.to_string(),
            force: false,
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn force_purge_relationship(&self, user: &str, guid: &str) -> Result<(), RepositoryError> {
        self.purge(user, MutationRequest::PurgeRelationship {
            guid: guid.to_string(),
            force: true,
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Reference copies
    // -----------------------------------------------------------------------

    fn copied(outcome: TxOutcome) {
        debug!(tx = %outcome.tx_id, writes = outcome.writes, "reference copy applied");
    }

    #[instrument(skip(self, entity), fields(guid = %entity.guid))]
    pub async fn save_entity_reference_copy(&self, user: &str, entity: EntityRecord) -> Result<(), RepositoryError> {
        self.protocol.save_entity_reference_copy(user, entity).await.map(Self::copied)
    }

    #[instrument(skip(self))]
    pub async fn purge_entity_reference_copy(
        &self,
        user: &str,
        guid: &str,
        home_collection_id: &str,
    ) -> Result<(), RepositoryError> {
        self.protocol
            .purge_entity_reference_copy(user, guid, home_collection_id)
            .await
            .map(Self::copied)
    }

    #[instrument(skip(self, relationship), fields(guid = %relationship.guid))]
    pub async fn save_relationship_reference_copy(
        &self,
        user: &str,
        relationship: RelationshipRecord,
    ) -> Result<(), RepositoryError> {
        self.protocol
            .save_relationship_reference_copy(user, relationship)
            .await
            .map(Self::copied)
    }

    #[instrument(skip(self))]
    pub async fn purge_relationship_reference_copy(
        &self,
        user: &str,
        guid: &str,
        home_collection_id: &str,
    ) -> Result<(), RepositoryError> {
        self.protocol
            .purge_relationship_reference_copy(user, guid, home_collection_id)
            .await
            .map(Self::copied)
    }

    #[instrument(skip(self, classification), fields(classification = %classification.name))]
    pub async fn save_classification_reference_copy(
        &self,
        user: &str,
        guid: &str,
        classification: Classification,
    ) -> Result<(), RepositoryError> {
        self.protocol
            .save_classification_reference_copy(user, guid, classification)
            .await
            .map(Self::copied)
    }

    #[instrument(skip(self))]
    pub async fn purge_classification_reference_copy(
        &self,
        user: &str,
        guid: &str,
        classification: &str,
        home_collection_id: &str,
    ) -> Result<(), RepositoryError> {
        self.protocol
            .purge_classification_reference_copy(user, guid, classification, home_collection_id)
            .await
            .map(Self::copied)
    }
}
