use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::db::record::RecordId;
use crate::error::AppError;
use crate::search::client::{IndexClient, IndexDocument};

/// Embedded search engine for local runs and tests.
///
/// Matches across every indexed field. Documents are ranked by how many
/// query terms they contain, then shorter documents first, then by id.
#[derive(Default)]
pub struct MemoryIndexClient {
    indexes: RwLock<HashMap<String, BTreeMap<RecordId, IndexDocument>>>,
}

impl MemoryIndexClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of an index's documents, in id order.
    pub async fn documents(&self, collection: &str) -> Vec<IndexDocument> {
        self.indexes
            .read()
            .await
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default()
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn document_tokens(document: &IndexDocument) -> Vec<String> {
    document
        .fields
        .values()
        .flat_map(|value| match value {
            serde_json::Value::String(s) => tokenize(s),
            serde_json::Value::Array(items) => items
                .iter()
                .filter_map(|item| item.as_str())
                .flat_map(tokenize)
                .collect(),
            serde_json::Value::Null => Vec::new(),
            other => tokenize(&other.to_string()),
        })
        .collect()
}

#[async_trait]
impl IndexClient for MemoryIndexClient {
    async fn index(&self, collection: &str, document: &IndexDocument) -> Result<(), AppError> {
        self.indexes
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(document.id, document.clone());
        Ok(())
    }

    async fn delete(&self, collection: &str, id: RecordId) -> Result<(), AppError> {
        if let Some(docs) = self.indexes.write().await.get_mut(collection) {
            docs.remove(&id);
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: &str,
        page: u32,
        per_page: u32,
    ) -> Result<(Vec<RecordId>, u64), AppError> {
        let terms = tokenize(query);
        if terms.is_empty() {
            return Ok((Vec::new(), 0));
        }

        let indexes = self.indexes.read().await;
        let Some(docs) = indexes.get(collection) else {
            return Ok((Vec::new(), 0));
        };

        let mut scored: Vec<(usize, usize, RecordId)> = docs
            .values()
            .filter_map(|doc| {
                let tokens = document_tokens(doc);
                let hits = tokens.iter().filter(|t| terms.contains(t)).count();
                (hits > 0).then_some((hits, tokens.len(), doc.id))
            })
            .collect();

        scored.sort_by_key(|(hits, len, id)| (Reverse(*hits), *len, *id));

        let total = scored.len() as u64;
        let offset = (page.max(1) as usize - 1) * per_page as usize;
        let ids = scored
            .into_iter()
            .skip(offset)
            .take(per_page as usize)
            .map(|(_, _, id)| id)
            .collect();

        Ok((ids, total))
    }

    async fn configure(&self, _collection: &str, _fields: &[&str]) -> Result<(), AppError> {
        Ok(())
    }
}
