use bson::Document;

use crate::db::record::{Record, RecordId};
use crate::error::AppError;

/// What a staged change does to its record once committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Updated,
    Deleted,
}

/// One pending record mutation.
///
/// `body` is the serialized snapshot taken at staging time; it is `None` for
/// deletions.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedChange {
    pub collection: &'static str,
    pub id: RecordId,
    pub kind: ChangeKind,
    pub body: Option<Document>,
}

/// The set of record changes that will be committed atomically.
///
/// Holds at most one change per `(collection, id)`: restaging a record merges
/// into the existing change, so added, updated and deleted records are always
/// disjoint.
#[derive(Debug, Default)]
pub struct UnitOfWork {
    changes: Vec<StagedChange>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a newly created record.
    pub fn add<R: Record>(&mut self, record: &R) -> Result<(), AppError> {
        let body = snapshot(record)?;
        self.stage(R::COLLECTION, record.id(), ChangeKind::Added, Some(body));
        Ok(())
    }

    /// Stage a modification of an existing record.
    pub fn update<R: Record>(&mut self, record: &R) -> Result<(), AppError> {
        let body = snapshot(record)?;
        self.stage(R::COLLECTION, record.id(), ChangeKind::Updated, Some(body));
        Ok(())
    }

    /// Stage the removal of the record `id` of type `R`.
    pub fn delete<R: Record>(&mut self, id: RecordId) {
        self.stage(R::COLLECTION, id, ChangeKind::Deleted, None);
    }

    pub fn changes(&self) -> &[StagedChange] {
        &self.changes
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    fn stage(
        &mut self,
        collection: &'static str,
        id: RecordId,
        kind: ChangeKind,
        body: Option<Document>,
    ) {
        let position = self
            .changes
            .iter()
            .position(|c| c.collection == collection && c.id == id);

        let Some(position) = position else {
            self.changes.push(StagedChange {
                collection,
                id,
                kind,
                body,
            });
            return;
        };

        let existing = &mut self.changes[position];
        match (existing.kind, kind) {
            // Never reached the store, so there is nothing to delete.
            (ChangeKind::Added, ChangeKind::Deleted) => {
                self.changes.remove(position);
            }
            (ChangeKind::Added, _) => {
                existing.body = body;
            }
            (ChangeKind::Updated, ChangeKind::Deleted) => {
                existing.kind = ChangeKind::Deleted;
                existing.body = None;
            }
            (ChangeKind::Updated, _) => {
                existing.body = body;
            }
            (ChangeKind::Deleted, ChangeKind::Deleted) => {}
            // Re-creating a record deleted in the same unit replaces it.
            (ChangeKind::Deleted, _) => {
                existing.kind = ChangeKind::Updated;
                existing.body = body;
            }
        }
    }
}

fn snapshot<R: Record>(record: &R) -> Result<Document, AppError> {
    bson::to_document(record).map_err(|e| {
        AppError::Internal(format!(
            "Failed to serialize {} record {}: {e}",
            R::COLLECTION,
            record.id()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Note {
        id: RecordId,
        text: String,
    }

    impl Record for Note {
        const COLLECTION: &'static str = "notes";

        fn id(&self) -> RecordId {
            self.id
        }
    }

    fn note(id: RecordId, text: &str) -> Note {
        Note {
            id,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_stage_distinct_records() {
        let mut uow = UnitOfWork::new();
        uow.add(&note(1, "a")).unwrap();
        uow.update(&note(2, "b")).unwrap();
        uow.delete::<Note>(3);

        let kinds: Vec<_> = uow.changes().iter().map(|c| (c.id, c.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                (1, ChangeKind::Added),
                (2, ChangeKind::Updated),
                (3, ChangeKind::Deleted)
            ]
        );
        assert_eq!(uow.changes()[0].body.as_ref().unwrap().get_str("text").unwrap(), "a");
        assert!(uow.changes()[2].body.is_none());
    }

    #[test]
    fn test_add_then_update_stays_added_with_latest_body() {
        let mut uow = UnitOfWork::new();
        uow.add(&note(1, "draft")).unwrap();
        uow.update(&note(1, "final")).unwrap();

        assert_eq!(uow.len(), 1);
        let change = &uow.changes()[0];
        assert_eq!(change.kind, ChangeKind::Added);
        assert_eq!(change.body.as_ref().unwrap().get_str("text").unwrap(), "final");
    }

    #[test]
    fn test_add_then_delete_cancels_out() {
        let mut uow = UnitOfWork::new();
        uow.add(&note(1, "short-lived")).unwrap();
        uow.delete::<Note>(1);
        assert!(uow.is_empty());
    }

    #[test]
    fn test_update_then_delete_becomes_delete() {
        let mut uow = UnitOfWork::new();
        uow.update(&note(1, "edited")).unwrap();
        uow.delete::<Note>(1);

        assert_eq!(uow.len(), 1);
        assert_eq!(uow.changes()[0].kind, ChangeKind::Deleted);
        assert!(uow.changes()[0].body.is_none());
    }

    #[test]
    fn test_delete_then_add_becomes_update() {
        let mut uow = UnitOfWork::new();
        uow.delete::<Note>(1);
        uow.add(&note(1, "again")).unwrap();

        assert_eq!(uow.len(), 1);
        assert_eq!(uow.changes()[0].kind, ChangeKind::Updated);
    }
}
