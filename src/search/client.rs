use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::db::record::RecordId;
use crate::error::AppError;
use crate::search::registry::SearchRegistry;
use crate::search::sync::ChangeSet;

/// The denormalized projection of a record held by the search engine: the
/// record id plus its declared searchable fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    /// Primary key, the record id.
    pub id: RecordId,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Trait for search engine operations, enabling mock testing.
#[async_trait]
pub trait IndexClient: Send + Sync {
    /// Add or replace a document in the `collection` index.
    async fn index(&self, collection: &str, document: &IndexDocument) -> Result<(), AppError>;

    /// Remove a document. Removing an unknown id is not an error.
    async fn delete(&self, collection: &str, id: RecordId) -> Result<(), AppError>;

    /// Return one page (1-based) of matching ids in relevance order, together
    /// with the total number of matches.
    async fn search(
        &self,
        collection: &str,
        query: &str,
        page: u32,
        per_page: u32,
    ) -> Result<(Vec<RecordId>, u64), AppError>;

    /// Restrict matching to the given fields.
    /// Should be called once on startup.
    async fn configure(&self, collection: &str, fields: &[&str]) -> Result<(), AppError>;
}

/// Meilisearch implementation of the IndexClient.
pub struct MeilisearchIndexClient {
    client: meilisearch_sdk::client::Client,
}

/// The only part of a hit we need back: ranking is all the engine decides.
#[derive(Debug, Deserialize)]
struct IndexHit {
    id: RecordId,
}

impl MeilisearchIndexClient {
    /// Create with explicit values.
    pub fn new(url: &str, api_key: Option<impl Into<String>>) -> Result<Self, AppError> {
        let client = meilisearch_sdk::client::Client::new(url, api_key)
            .map_err(|e| AppError::Search(format!("Failed to create Meilisearch client: {e}")))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl IndexClient for MeilisearchIndexClient {
    async fn index(&self, collection: &str, document: &IndexDocument) -> Result<(), AppError> {
        let _task: meilisearch_sdk::task_info::TaskInfo = self
            .client
            .index(collection)
            .add_documents(&[document], Some("id"))
            .await
            .map_err(|e| AppError::Search(format!("Meilisearch index error: {e}")))?;

        Ok(())
    }

    async fn delete(&self, collection: &str, id: RecordId) -> Result<(), AppError> {
        let _task: meilisearch_sdk::task_info::TaskInfo = self
            .client
            .index(collection)
            .delete_document(id)
            .await
            .map_err(|e| AppError::Search(format!("Meilisearch delete error: {e}")))?;

        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: &str,
        page: u32,
        per_page: u32,
    ) -> Result<(Vec<RecordId>, u64), AppError> {
        let results: meilisearch_sdk::search::SearchResults<IndexHit> = self
            .client
            .index(collection)
            .search()
            .with_query(query)
            .with_page(page.max(1) as usize)
            .with_hits_per_page(per_page as usize)
            .execute()
            .await
            .map_err(|e| AppError::Search(format!("Meilisearch search error: {e}")))?;

        // Page-based queries report an exhaustive count.
        let total = results.total_hits.unwrap_or(results.hits.len());

        let ids = results.hits.into_iter().map(|hit| hit.result.id).collect();

        Ok((ids, total as u64))
    }

    async fn configure(&self, collection: &str, fields: &[&str]) -> Result<(), AppError> {
        let _: meilisearch_sdk::task_info::TaskInfo = self
            .client
            .index(collection)
            .set_searchable_attributes(fields.to_vec())
            .await
            .map_err(|e| AppError::Search(format!("Meilisearch config error: {e}")))?;

        Ok(())
    }
}

/// Best-effort front for an optional [`IndexClient`].
///
/// Nothing here ever fails: without a configured client writes are no-ops and
/// queries match nothing, and client errors are logged and swallowed so that
/// indexing problems never fail the request that triggered them.
#[derive(Clone, Default)]
pub struct SearchIndex {
    client: Option<Arc<dyn IndexClient>>,
}

impl SearchIndex {
    pub fn new(client: Arc<dyn IndexClient>) -> Self {
        Self {
            client: Some(client),
        }
    }

    /// An index with no backing engine.
    pub fn disabled() -> Self {
        Self { client: None }
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    pub async fn add(&self, collection: &str, document: &IndexDocument) {
        let Some(client) = &self.client else {
            return;
        };
        if let Err(e) = client.index(collection, document).await {
            tracing::warn!("Failed to index {collection} {}: {e}", document.id);
        }
    }

    pub async fn remove(&self, collection: &str, id: RecordId) {
        let Some(client) = &self.client else {
            return;
        };
        if let Err(e) = client.delete(collection, id).await {
            tracing::warn!("Failed to remove {collection} {id} from index: {e}");
        }
    }

    pub async fn query(
        &self,
        collection: &str,
        query: &str,
        page: u32,
        per_page: u32,
    ) -> (Vec<RecordId>, u64) {
        let Some(client) = &self.client else {
            return (Vec::new(), 0);
        };
        match client.search(collection, query, page, per_page).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("Search on {collection} failed: {e}");
                (Vec::new(), 0)
            }
        }
    }

    /// Push the searchable field lists of every registered type.
    pub async fn configure(&self, registry: &SearchRegistry) {
        let Some(client) = &self.client else {
            return;
        };
        for searchable in registry.iter() {
            if let Err(e) = client.configure(searchable.index, searchable.fields).await {
                tracing::warn!("Failed to configure index {}: {e}", searchable.index);
            }
        }
    }

    /// Replay a committed change set. Operations target distinct documents,
    /// so they are issued in plain sequence.
    pub async fn apply(&self, change_set: ChangeSet) {
        if !self.is_configured() {
            return;
        }
        for indexed in change_set.added.iter().chain(change_set.updated.iter()) {
            self.add(indexed.index, &indexed.document).await;
        }
        for removed in &change_set.deleted {
            self.remove(removed.index, removed.id).await;
        }
    }
}
