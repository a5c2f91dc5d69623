use std::sync::Arc;

use async_trait::async_trait;
use bson::Document;

use crate::db::record::{Query, Record, RecordId};
use crate::db::store::RecordStore;
use crate::db::unit_of_work::UnitOfWork;
use crate::error::AppError;

/// Observer invoked by [`Session::commit`] around every store write.
///
/// `before_commit` sees the sealed unit of work (nothing can be staged any
/// more) and may capture whatever it needs. The returned [`AfterCommit`] runs
/// only once the store has confirmed the write; on failure it is dropped
/// without running.
pub trait CommitInterceptor: Send + Sync {
    fn before_commit(&self, uow: &UnitOfWork) -> Option<Box<dyn AfterCommit>>;
}

/// Work captured before a commit, executed after it succeeds.
#[async_trait]
pub trait AfterCommit: Send {
    async fn after_commit(self: Box<Self>);
}

/// Store wrapper that owns the commit lifecycle and typed reads.
#[derive(Clone)]
pub struct Session {
    store: Arc<dyn RecordStore>,
    interceptors: Vec<Arc<dyn CommitInterceptor>>,
}

impl Session {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            interceptors: Vec::new(),
        }
    }

    /// Register an interceptor; interceptors run in registration order.
    pub fn with_interceptor(mut self, interceptor: Arc<dyn CommitInterceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Reserve a fresh id for a record of type `R`.
    pub async fn allocate_id<R: Record>(&self) -> Result<RecordId, AppError> {
        self.store.next_id(R::COLLECTION).await
    }

    /// Commit a unit of work.
    pub async fn commit(&self, uow: UnitOfWork) -> Result<(), AppError> {
        if uow.is_empty() {
            return Ok(());
        }

        let pending: Vec<Box<dyn AfterCommit>> = self
            .interceptors
            .iter()
            .filter_map(|interceptor| interceptor.before_commit(&uow))
            .collect();

        self.store.apply(uow.changes()).await?;
        tracing::debug!("Committed {} change(s)", uow.len());

        for work in pending {
            work.after_commit().await;
        }

        Ok(())
    }

    pub async fn get<R: Record>(&self, id: RecordId) -> Result<Option<R>, AppError> {
        let mut docs = self.store.fetch_by_ids(R::COLLECTION, &[id]).await?;
        docs.pop().map(decode::<R>).transpose()
    }

    /// Fetch the records with the given ids, in store order. Missing ids are
    /// skipped.
    pub async fn fetch_many<R: Record>(&self, ids: &[RecordId]) -> Result<Vec<R>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let docs = self.store.fetch_by_ids(R::COLLECTION, ids).await?;
        docs.into_iter().map(decode::<R>).collect()
    }

    pub async fn find<R: Record>(&self, query: &Query) -> Result<Vec<R>, AppError> {
        let docs = self.store.find(R::COLLECTION, query).await?;
        docs.into_iter().map(decode::<R>).collect()
    }

    pub async fn find_one<R: Record>(&self, query: &Query) -> Result<Option<R>, AppError> {
        let query = query.clone().limit(1);
        Ok(self.find::<R>(&query).await?.into_iter().next())
    }

    pub async fn count<R: Record>(&self, query: &Query) -> Result<u64, AppError> {
        self.store.count(R::COLLECTION, &query.without_paging()).await
    }
}

fn decode<R: Record>(doc: Document) -> Result<R, AppError> {
    bson::from_document(doc)
        .map_err(|e| AppError::Database(format!("Malformed {} record: {e}", R::COLLECTION)))
}
