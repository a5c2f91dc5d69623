use std::collections::HashMap;

use crate::db::record::{Query, Record, RecordId};
use crate::db::session::Session;
use crate::error::AppError;
use crate::search::client::SearchIndex;
use crate::search::registry::{SearchRegistry, SearchableType};

const REINDEX_BATCH: i64 = 100;

/// A record type whose declared fields are mirrored into the search index.
pub trait Searchable: Record {
    /// Fields copied into the index document.
    const SEARCHABLE_FIELDS: &'static [&'static str];

    /// Name of the index holding this type's documents.
    fn index_name() -> &'static str {
        Self::COLLECTION
    }
}

/// Full-text search over records of type `R`.
///
/// Returns one page of records in the engine's relevance order together with
/// the engine's total match count. Ids the engine returns that no longer
/// exist in the store are dropped; the remaining records keep their relative
/// order.
pub async fn search<R: Searchable>(
    session: &Session,
    index: &SearchIndex,
    expression: &str,
    page: u32,
    per_page: u32,
) -> Result<(Vec<R>, u64), AppError> {
    let expression = expression.trim();
    if expression.is_empty() || per_page == 0 {
        return Ok((Vec::new(), 0));
    }

    let (ids, total) = index
        .query(R::index_name(), expression, page.max(1), per_page)
        .await;
    if total == 0 || ids.is_empty() {
        return Ok((Vec::new(), total));
    }

    let records = session.fetch_many::<R>(&ids).await?;
    let ordered = order_by_rank(&ids, records);
    if ordered.len() < ids.len() {
        tracing::debug!(
            "Dropped {} stale id(s) from {} search results",
            ids.len() - ordered.len(),
            R::index_name()
        );
    }

    Ok((ordered, total))
}

/// Re-impose the engine's ranking on records fetched in store order.
fn order_by_rank<R: Record>(ranked_ids: &[RecordId], records: Vec<R>) -> Vec<R> {
    let mut rank: HashMap<RecordId, usize> = HashMap::with_capacity(ranked_ids.len());
    for (position, id) in ranked_ids.iter().enumerate() {
        rank.entry(*id).or_insert(position);
    }

    let mut ranked: Vec<(usize, R)> = records
        .into_iter()
        .filter_map(|record| rank.get(&record.id()).map(|position| (*position, record)))
        .collect();
    ranked.sort_by_key(|(position, _)| *position);
    ranked.into_iter().map(|(_, record)| record).collect()
}

/// Rebuild the index documents of every `R` from the store.
///
/// Upserts only, so running it repeatedly converges on the same content.
pub async fn reindex<R: Searchable>(session: &Session, index: &SearchIndex) -> Result<usize, AppError> {
    reindex_type(session, index, &SearchableType::of::<R>()).await
}

/// Rebuild every registered searchable type. Returns the number of documents
/// pushed.
pub async fn reindex_all(
    session: &Session,
    index: &SearchIndex,
    registry: &SearchRegistry,
) -> Result<usize, AppError> {
    let mut total = 0;
    for searchable in registry.iter() {
        total += reindex_type(session, index, searchable).await?;
    }
    Ok(total)
}

async fn reindex_type(
    session: &Session,
    index: &SearchIndex,
    searchable: &SearchableType,
) -> Result<usize, AppError> {
    if !index.is_configured() {
        tracing::debug!("Search index disabled, skipping reindex of {}", searchable.index);
        return Ok(0);
    }

    let mut pushed = 0;
    let mut skip = 0u64;

    loop {
        let query = Query::new()
            .sort_asc("id")
            .skip(skip)
            .limit(REINDEX_BATCH);
        let batch = session.store().find(searchable.collection, &query).await?;
        if batch.is_empty() {
            break;
        }

        for body in &batch {
            let id = body.get_i64("id").map_err(|e| {
                AppError::Database(format!("{} record without id: {e}", searchable.collection))
            })?;
            index.add(searchable.index, &searchable.project(id, body)).await;
            pushed += 1;
        }

        skip += batch.len() as u64;
    }

    tracing::info!("Reindexed {} {} document(s)", pushed, searchable.index);
    Ok(pushed)
}
