use axum::extract::{Query as QueryParams, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::db::models::{Post, PostPage};
use crate::db::session::Session;
use crate::error::AppError;
use crate::search::client::SearchIndex;
use crate::search::registry::SearchRegistry;
use crate::search::searchable::{reindex_all, search};

/// Full-text search over posts, one page in relevance order.
pub async fn process_search(
    session: &Session,
    index: &SearchIndex,
    q: &str,
    page: u32,
    per_page: u32,
) -> Result<PostPage, AppError> {
    let page = page.max(1);
    let (posts, total) = search::<Post>(session, index, q, page, per_page).await?;
    Ok(PostPage::new(posts, total, page, per_page))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    pub page: Option<u32>,
}

/// Axum handler for `GET /api/v1/search`.
pub async fn search_handler(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<SearchParams>,
) -> Result<Json<PostPage>, AppError> {
    let page = process_search(
        &state.session,
        &state.search_index,
        &params.q,
        params.page.unwrap_or(1),
        state.posts_per_page,
    )
    .await?;
    Ok(Json(page))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReindexResponse {
    pub indexed: usize,
}

pub async fn process_reindex(
    session: &Session,
    index: &SearchIndex,
    registry: &SearchRegistry,
) -> Result<ReindexResponse, AppError> {
    let indexed = reindex_all(session, index, registry).await?;
    Ok(ReindexResponse { indexed })
}

/// Axum handler for `POST /api/v1/admin/reindex`.
pub async fn reindex_handler(
    State(state): State<AppState>,
) -> Result<Json<ReindexResponse>, AppError> {
    let response = process_reindex(&state.session, &state.search_index, &state.registry).await?;
    Ok(Json(response))
}
