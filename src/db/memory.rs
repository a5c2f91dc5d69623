use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use bson::Document;
use tokio::sync::RwLock;

use crate::db::record::{compare_bson, Query, RecordId, SortOrder};
use crate::db::store::RecordStore;
use crate::db::unit_of_work::{ChangeKind, StagedChange};
use crate::error::AppError;

#[derive(Default)]
struct Tables {
    collections: HashMap<String, BTreeMap<RecordId, Document>>,
    counters: HashMap<String, RecordId>,
}

/// Embedded record store used when no database is configured, and in tests.
///
/// A whole unit of work is applied under one write lock, so commits are
/// atomic with respect to readers.
#[derive(Default)]
pub struct MemoryRecordStore {
    tables: RwLock<Tables>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn next_id(&self, collection: &str) -> Result<RecordId, AppError> {
        let mut tables = self.tables.write().await;
        let highest = tables
            .collections
            .get(collection)
            .and_then(|rows| rows.keys().next_back().copied())
            .unwrap_or(0);

        let counter = tables.counters.entry(collection.to_string()).or_insert(0);
        *counter = (*counter).max(highest) + 1;
        Ok(*counter)
    }

    async fn apply(&self, changes: &[StagedChange]) -> Result<(), AppError> {
        // Validate first so a malformed change leaves the store untouched.
        if let Some(change) = changes
            .iter()
            .find(|c| c.kind != ChangeKind::Deleted && c.body.is_none())
        {
            return Err(AppError::Internal(format!(
                "Staged change for {} {} has no body",
                change.collection, change.id
            )));
        }

        let mut tables = self.tables.write().await;
        for change in changes {
            let rows = tables
                .collections
                .entry(change.collection.to_string())
                .or_default();

            match &change.body {
                Some(body) if change.kind != ChangeKind::Deleted => {
                    rows.insert(change.id, body.clone());
                }
                _ => {
                    rows.remove(&change.id);
                }
            }
        }

        Ok(())
    }

    async fn fetch_by_ids(
        &self,
        collection: &str,
        ids: &[RecordId],
    ) -> Result<Vec<Document>, AppError> {
        let tables = self.tables.read().await;
        let Some(rows) = tables.collections.get(collection) else {
            return Ok(Vec::new());
        };

        Ok(rows
            .iter()
            .filter(|(id, _)| ids.contains(id))
            .map(|(_, doc)| doc.clone())
            .collect())
    }

    async fn find(&self, collection: &str, query: &Query) -> Result<Vec<Document>, AppError> {
        let tables = self.tables.read().await;
        let Some(rows) = tables.collections.get(collection) else {
            return Ok(Vec::new());
        };

        // Rows iterate in id order, so the stable sort keeps id as tie-break.
        let mut matched: Vec<&Document> = rows.values().filter(|doc| query.matches(doc)).collect();

        if let Some((field, order)) = &query.sort {
            matched.sort_by(|a, b| {
                let ordering = match (a.get(field), b.get(field)) {
                    (Some(x), Some(y)) => compare_bson(x, y).unwrap_or(std::cmp::Ordering::Equal),
                    (None, Some(_)) => std::cmp::Ordering::Less,
                    (Some(_), None) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                };
                match order {
                    SortOrder::Ascending => ordering,
                    SortOrder::Descending => ordering.reverse(),
                }
            });
        }

        let limit = match query.limit {
            Some(limit) if limit > 0 => limit as usize,
            _ => usize::MAX,
        };

        Ok(matched
            .into_iter()
            .skip(query.skip as usize)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count(&self, collection: &str, query: &Query) -> Result<u64, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .collections
            .get(collection)
            .map(|rows| rows.values().filter(|doc| query.matches(doc)).count() as u64)
            .unwrap_or(0))
    }
}
