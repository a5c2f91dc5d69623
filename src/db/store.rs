use async_trait::async_trait;
use bson::Document;

use crate::db::record::{Query, RecordId};
use crate::db::unit_of_work::{ChangeKind, StagedChange};
use crate::error::AppError;

/// Persistence backend for records, addressed as raw BSON documents.
///
/// This trait allows swapping MongoDB for the in-memory store in tests.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Allocate the next integer id for `collection`.
    async fn next_id(&self, collection: &str) -> Result<RecordId, AppError>;

    /// Durably apply a unit of work's changes: all of them or none.
    async fn apply(&self, changes: &[StagedChange]) -> Result<(), AppError>;

    /// Fetch the documents whose `id` is in `ids`. Order is store-defined and
    /// ids with no matching document are skipped.
    async fn fetch_by_ids(
        &self,
        collection: &str,
        ids: &[RecordId],
    ) -> Result<Vec<Document>, AppError>;

    /// List documents matching a query.
    async fn find(&self, collection: &str, query: &Query) -> Result<Vec<Document>, AppError>;

    /// Count documents matching a query's conditions.
    async fn count(&self, collection: &str, query: &Query) -> Result<u64, AppError>;
}

/// MongoDB implementation of the RecordStore.
///
/// Records are upserted by their `id` field; ids are allocated from a
/// `counters` collection holding one sequence per record collection. Each
/// `apply` runs in one multi-document transaction, so the server must be a
/// replica set member or a mongos.
pub struct MongoRecordStore {
    db: mongodb::Database,
}

impl MongoRecordStore {
    pub fn new(db: &mongodb::Database) -> Self {
        Self { db: db.clone() }
    }

    fn collection(&self, name: &str) -> mongodb::Collection<Document> {
        self.db.collection(name)
    }

    /// Create the unique `id` index on every given collection.
    pub async fn ensure_indexes(&self, collections: &[&str]) -> Result<(), AppError> {
        use mongodb::bson::doc;
        use mongodb::options::IndexOptions;
        use mongodb::IndexModel;

        for name in collections {
            let model = IndexModel::builder()
                .keys(doc! { "id": 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build();

            self.collection(name)
                .create_index(model)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        }

        Ok(())
    }

    /// Fail unless the server can run multi-document transactions.
    ///
    /// Commits run inside a transaction, which a standalone `mongod` rejects.
    pub async fn ensure_transactions(&self) -> Result<(), AppError> {
        use mongodb::bson::doc;

        let hello = self
            .db
            .run_command(doc! { "hello": 1 })
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let replica_set = hello.get_str("setName").is_ok();
        let router = hello.get_str("msg").map(|msg| msg == "isdbgrid").unwrap_or(false);
        if replica_set || router {
            Ok(())
        } else {
            Err(AppError::Database(
                "MongoDB must run as a replica set or behind mongos: commits need transactions"
                    .to_string(),
            ))
        }
    }

    async fn write_change(
        &self,
        session: &mut mongodb::ClientSession,
        change: &StagedChange,
    ) -> Result<(), AppError> {
        use mongodb::bson::doc;
        use mongodb::options::ReplaceOptions;

        let collection = self.collection(change.collection);
        let filter = doc! { "id": change.id };

        match (change.kind, &change.body) {
            (ChangeKind::Deleted, _) => {
                collection
                    .delete_one(filter)
                    .session(&mut *session)
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
            }
            (_, Some(body)) => {
                let options = ReplaceOptions::builder().upsert(true).build();
                collection
                    .replace_one(filter, body)
                    .with_options(options)
                    .session(&mut *session)
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
            }
            (_, None) => {
                return Err(AppError::Internal(format!(
                    "Staged change for {} {} has no body",
                    change.collection, change.id
                )));
            }
        }

        Ok(())
    }
}

#[async_trait]
impl RecordStore for MongoRecordStore {
    async fn next_id(&self, collection: &str) -> Result<RecordId, AppError> {
        use mongodb::bson::doc;
        use mongodb::options::{FindOneAndUpdateOptions, ReturnDocument};

        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();

        let counter = self
            .collection("counters")
            .find_one_and_update(doc! { "_id": collection }, doc! { "$inc": { "seq": 1i64 } })
            .with_options(options)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .ok_or_else(|| AppError::Database(format!("No id counter for '{collection}'")))?;

        counter
            .get_i64("seq")
            .map_err(|e| AppError::Database(format!("Malformed id counter: {e}")))
    }

    async fn apply(&self, changes: &[StagedChange]) -> Result<(), AppError> {
        if changes.is_empty() {
            return Ok(());
        }

        let mut session = self
            .db
            .client()
            .start_session()
            .await
            .map_err(|e| AppError::Database(format!("Failed to start session: {e}")))?;
        session
            .start_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to start transaction: {e}")))?;

        for change in changes {
            if let Err(err) = self.write_change(&mut session, change).await {
                if let Err(abort) = session.abort_transaction().await {
                    tracing::warn!("Failed to abort transaction: {}", abort);
                }
                return Err(err);
            }
        }

        session
            .commit_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit transaction: {e}")))
    }

    async fn fetch_by_ids(
        &self,
        collection: &str,
        ids: &[RecordId],
    ) -> Result<Vec<Document>, AppError> {
        use mongodb::bson::doc;
        use mongodb::options::FindOptions;

        let options = FindOptions::builder().projection(doc! { "_id": 0 }).build();

        let cursor = self
            .collection(collection)
            .find(doc! { "id": { "$in": ids.to_vec() } })
            .with_options(options)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        use futures::TryStreamExt;
        cursor
            .try_collect()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn find(&self, collection: &str, query: &Query) -> Result<Vec<Document>, AppError> {
        use mongodb::bson::doc;
        use mongodb::options::FindOptions;

        let options = FindOptions::builder()
            .projection(doc! { "_id": 0 })
            .sort(query.sort_document())
            .skip(query.skip)
            .limit(query.limit)
            .build();

        let cursor = self
            .collection(collection)
            .find(query.filter_document())
            .with_options(options)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        use futures::TryStreamExt;
        cursor
            .try_collect()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn count(&self, collection: &str, query: &Query) -> Result<u64, AppError> {
        self.collection(collection)
            .count_documents(query.filter_document())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
