use std::sync::Arc;

use async_trait::async_trait;

use crate::db::record::RecordId;
use crate::db::session::{AfterCommit, CommitInterceptor};
use crate::db::unit_of_work::{ChangeKind, UnitOfWork};
use crate::search::client::{IndexDocument, SearchIndex};
use crate::search::registry::SearchRegistry;

/// A document to upsert into `index`.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedRecord {
    pub index: &'static str,
    pub document: IndexDocument,
}

/// A document to remove from `index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemovedRecord {
    pub index: &'static str,
    pub id: RecordId,
}

/// Searchable changes of one unit of work, captured before it commits.
#[derive(Debug, Default, PartialEq)]
pub struct ChangeSet {
    pub added: Vec<IndexedRecord>,
    pub updated: Vec<IndexedRecord>,
    pub deleted: Vec<RemovedRecord>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

/// Extracts the searchable part of a unit of work.
///
/// Only reads the staged snapshots; records of types missing from the
/// registry are ignored.
#[derive(Clone)]
pub struct ChangeCollector {
    registry: Arc<SearchRegistry>,
}

impl ChangeCollector {
    pub fn new(registry: Arc<SearchRegistry>) -> Self {
        Self { registry }
    }

    pub fn collect(&self, uow: &UnitOfWork) -> ChangeSet {
        let mut change_set = ChangeSet::default();

        for change in uow.changes() {
            let Some(searchable) = self.registry.lookup(change.collection) else {
                continue;
            };

            match (change.kind, &change.body) {
                (ChangeKind::Deleted, _) => change_set.deleted.push(RemovedRecord {
                    index: searchable.index,
                    id: change.id,
                }),
                (ChangeKind::Added, Some(body)) => change_set.added.push(IndexedRecord {
                    index: searchable.index,
                    document: searchable.project(change.id, body),
                }),
                (ChangeKind::Updated, Some(body)) => change_set.updated.push(IndexedRecord {
                    index: searchable.index,
                    document: searchable.project(change.id, body),
                }),
                // The store rejects bodiless upserts, so there is nothing to mirror.
                (_, None) => {}
            }
        }

        change_set
    }
}

/// Commit interceptor that keeps the search index in step with the store.
pub struct IndexSynchronizer {
    collector: ChangeCollector,
    index: SearchIndex,
}

impl IndexSynchronizer {
    pub fn new(registry: Arc<SearchRegistry>, index: SearchIndex) -> Self {
        Self {
            collector: ChangeCollector::new(registry),
            index,
        }
    }
}

struct PendingSync {
    change_set: ChangeSet,
    index: SearchIndex,
}

impl CommitInterceptor for IndexSynchronizer {
    fn before_commit(&self, uow: &UnitOfWork) -> Option<Box<dyn AfterCommit>> {
        if !self.index.is_configured() {
            return None;
        }

        let change_set = self.collector.collect(uow);
        if change_set.is_empty() {
            return None;
        }

        Some(Box::new(PendingSync {
            change_set,
            index: self.index.clone(),
        }))
    }
}

#[async_trait]
impl AfterCommit for PendingSync {
    async fn after_commit(self: Box<Self>) {
        let PendingSync { change_set, index } = *self;
        index.apply(change_set).await;
    }
}
