use std::cmp::Ordering;

use bson::{Bson, Document};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Integer identity shared by every persisted record.
pub type RecordId = i64;

/// A persisted entity stored as one document in a named collection.
///
/// Every record carries an integer `id` field; stores address records by
/// `(COLLECTION, id)`.
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Name of the collection this record type lives in.
    const COLLECTION: &'static str;

    fn id(&self) -> RecordId;
}

/// A single filter predicate on a top-level field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(String, Bson),
    Gt(String, Bson),
    /// The field equals one of the listed values.
    In(String, Vec<Bson>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Store-agnostic query: a conjunction of conditions plus ordering and paging.
///
/// Sorting is always tie-broken by `id` ascending so that paging is stable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub conditions: Vec<Condition>,
    pub sort: Option<(String, SortOrder)>,
    pub skip: u64,
    pub limit: Option<i64>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Bson>) -> Self {
        self.conditions
            .push(Condition::Eq(field.to_string(), value.into()));
        self
    }

    pub fn gt(mut self, field: &str, value: impl Into<Bson>) -> Self {
        self.conditions
            .push(Condition::Gt(field.to_string(), value.into()));
        self
    }

    pub fn is_in<V: Into<Bson>>(mut self, field: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.conditions.push(Condition::In(
            field.to_string(),
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn sort_asc(mut self, field: &str) -> Self {
        self.sort = Some((field.to_string(), SortOrder::Ascending));
        self
    }

    pub fn sort_desc(mut self, field: &str) -> Self {
        self.sort = Some((field.to_string(), SortOrder::Descending));
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Restrict to a 1-based page of `per_page` records.
    pub fn page(self, page: u32, per_page: u32) -> Self {
        let page = page.max(1) as u64;
        self.skip((page - 1) * per_page as u64)
            .limit(per_page as i64)
    }

    /// Drop paging, keeping only the filter (used for counts).
    pub fn without_paging(&self) -> Self {
        Self {
            conditions: self.conditions.clone(),
            sort: None,
            skip: 0,
            limit: None,
        }
    }

    /// MongoDB filter document equivalent to the conditions.
    pub fn filter_document(&self) -> Document {
        if self.conditions.is_empty() {
            return Document::new();
        }

        let clauses: Vec<Bson> = self
            .conditions
            .iter()
            .map(|condition| {
                let mut clause = Document::new();
                match condition {
                    Condition::Eq(field, value) => {
                        clause.insert(field.clone(), value.clone());
                    }
                    Condition::Gt(field, value) => {
                        clause.insert(field.clone(), bson::doc! { "$gt": value.clone() });
                    }
                    Condition::In(field, values) => {
                        clause.insert(field.clone(), bson::doc! { "$in": values.clone() });
                    }
                }
                Bson::Document(clause)
            })
            .collect();

        bson::doc! { "$and": clauses }
    }

    /// MongoDB sort document, always ending with `id` ascending.
    pub fn sort_document(&self) -> Document {
        let mut sort = Document::new();
        if let Some((field, order)) = &self.sort {
            let direction = match order {
                SortOrder::Ascending => 1,
                SortOrder::Descending => -1,
            };
            sort.insert(field.clone(), direction);
        }
        if !sort.contains_key("id") {
            sort.insert("id", 1);
        }
        sort
    }

    /// Evaluate the conditions against a document held in memory.
    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions.iter().all(|condition| match condition {
            Condition::Eq(field, value) => doc
                .get(field)
                .is_some_and(|actual| compare_bson(actual, value) == Some(Ordering::Equal)),
            Condition::Gt(field, value) => doc
                .get(field)
                .is_some_and(|actual| compare_bson(actual, value) == Some(Ordering::Greater)),
            Condition::In(field, values) => doc.get(field).is_some_and(|actual| {
                values
                    .iter()
                    .any(|value| compare_bson(actual, value) == Some(Ordering::Equal))
            }),
        })
    }
}

/// Compare two BSON scalars the way a document store would.
///
/// Numbers compare across integer/double representations. Values of
/// unrelated types are incomparable.
pub fn compare_bson(a: &Bson, b: &Bson) -> Option<Ordering> {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => return x.partial_cmp(&y),
        (Some(_), None) | (None, Some(_)) => return None,
        (None, None) => {}
    }

    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        (Bson::Null, Bson::Null) => Some(Ordering::Equal),
        _ if a == b => Some(Ordering::Equal),
        _ => None,
    }
}

fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(*v as f64),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}
