use std::collections::BTreeMap;

use bson::Document;

use crate::db::record::RecordId;
use crate::search::client::IndexDocument;
use crate::search::searchable::Searchable;

/// Index layout of one searchable record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchableType {
    pub collection: &'static str,
    pub index: &'static str,
    pub fields: &'static [&'static str],
}

impl SearchableType {
    pub fn of<R: Searchable>() -> Self {
        Self {
            collection: R::COLLECTION,
            index: R::index_name(),
            fields: R::SEARCHABLE_FIELDS,
        }
    }

    /// Project a stored record body onto its declared searchable fields.
    /// Fields absent from the body are left out.
    pub fn project(&self, id: RecordId, body: &Document) -> IndexDocument {
        let fields = self
            .fields
            .iter()
            .filter_map(|field| {
                body.get(*field)
                    .map(|value| (field.to_string(), value.clone().into_relaxed_extjson()))
            })
            .collect();

        IndexDocument { id, fields }
    }
}

/// Which record types are searchable, keyed by collection.
#[derive(Debug, Clone, Default)]
pub struct SearchRegistry {
    entries: BTreeMap<&'static str, SearchableType>,
}

impl SearchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<R: Searchable>(mut self) -> Self {
        self.entries.insert(R::COLLECTION, SearchableType::of::<R>());
        self
    }

    pub fn lookup(&self, collection: &str) -> Option<&SearchableType> {
        self.entries.get(collection)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SearchableType> {
        self.entries.values()
    }
}
