use axum::extract::{Path, Query as QueryParams, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use crate::app::AppState;
use crate::db::models::{CreatePostRequest, Post, PostPage, UpdatePostRequest, User};
use crate::db::record::{Query, RecordId};
use crate::db::session::Session;
use crate::db::unit_of_work::UnitOfWork;
use crate::error::AppError;

/// Longest accepted post body, in characters.
pub const MAX_POST_LENGTH: usize = 140;

fn validate_body(body: &str) -> Result<&str, AppError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(AppError::BadRequest("Post body cannot be empty".into()));
    }
    if body.chars().count() > MAX_POST_LENGTH {
        return Err(AppError::BadRequest(format!(
            "Post body cannot exceed {MAX_POST_LENGTH} characters"
        )));
    }
    Ok(body)
}

async fn load_post(session: &Session, id: RecordId) -> Result<Post, AppError> {
    session
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Post {id}")))
}

/// Publish a post for an existing user.
pub async fn process_create_post(
    session: &Session,
    request: CreatePostRequest,
) -> Result<Post, AppError> {
    let body = validate_body(&request.body)?;
    if session.get::<User>(request.user_id).await?.is_none() {
        return Err(AppError::NotFound(format!("User {}", request.user_id)));
    }

    let post = Post {
        id: session.allocate_id::<Post>().await?,
        body: body.to_string(),
        timestamp: Utc::now(),
        user_id: request.user_id,
        language: request.language.unwrap_or_default(),
    };

    let mut uow = UnitOfWork::new();
    uow.add(&post)?;
    session.commit(uow).await?;

    Ok(post)
}

pub async fn process_update_post(
    session: &Session,
    id: RecordId,
    request: UpdatePostRequest,
) -> Result<Post, AppError> {
    let body = validate_body(&request.body)?.to_string();
    let mut post = load_post(session, id).await?;
    post.body = body;

    let mut uow = UnitOfWork::new();
    uow.update(&post)?;
    session.commit(uow).await?;

    Ok(post)
}

pub async fn process_delete_post(session: &Session, id: RecordId) -> Result<(), AppError> {
    let post = load_post(session, id).await?;

    let mut uow = UnitOfWork::new();
    uow.delete::<Post>(post.id);
    session.commit(uow).await
}

/// One page of posts, newest first, optionally limited to one author.
pub async fn process_list_posts(
    session: &Session,
    user_id: Option<RecordId>,
    page: u32,
    per_page: u32,
) -> Result<PostPage, AppError> {
    let page = page.max(1);
    let mut query = Query::new().sort_desc("timestamp");
    if let Some(user_id) = user_id {
        query = query.eq("user_id", user_id);
    }

    let total = session.count::<Post>(&query).await?;
    let items = session.find::<Post>(&query.page(page, per_page)).await?;

    Ok(PostPage::new(items, total, page, per_page))
}

#[derive(Debug, Deserialize)]
pub struct ListPostsParams {
    pub page: Option<u32>,
    pub user_id: Option<RecordId>,
}

/// Axum handler for `GET /api/v1/posts`.
pub async fn list_posts_handler(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<ListPostsParams>,
) -> Result<Json<PostPage>, AppError> {
    let page = process_list_posts(
        &state.session,
        params.user_id,
        params.page.unwrap_or(1),
        state.posts_per_page,
    )
    .await?;
    Ok(Json(page))
}

/// Axum handler for `POST /api/v1/posts`.
pub async fn create_post_handler(
    State(state): State<AppState>,
    Json(request): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<Post>), AppError> {
    let post = process_create_post(&state.session, request).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

/// Axum handler for `PUT /api/v1/posts/{id}`.
pub async fn update_post_handler(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
    Json(request): Json<UpdatePostRequest>,
) -> Result<Json<Post>, AppError> {
    Ok(Json(process_update_post(&state.session, id, request).await?))
}

/// Axum handler for `DELETE /api/v1/posts/{id}`.
pub async fn delete_post_handler(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
) -> Result<StatusCode, AppError> {
    process_delete_post(&state.session, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::db::memory::MemoryRecordStore;
    use crate::search::client::SearchIndex;
    use crate::search::memory::MemoryIndexClient;
    use crate::search::registry::SearchRegistry;
    use crate::search::searchable::search;
    use crate::search::sync::IndexSynchronizer;

    async fn session_with_user() -> (Session, SearchIndex) {
        let index = SearchIndex::new(Arc::new(MemoryIndexClient::new()));
        let registry = Arc::new(SearchRegistry::new().register::<Post>());
        let session = Session::new(Arc::new(MemoryRecordStore::new()))
            .with_interceptor(Arc::new(IndexSynchronizer::new(registry, index.clone())));

        let mut uow = UnitOfWork::new();
        uow.add(&User {
            id: 1,
            username: "susan".to_string(),
            email: "susan@example.com".to_string(),
            about_me: None,
        })
        .unwrap();
        session.commit(uow).await.unwrap();

        (session, index)
    }

    fn create(user_id: RecordId, body: &str) -> CreatePostRequest {
        CreatePostRequest {
            user_id,
            body: body.to_string(),
            language: None,
        }
    }

    #[test]
    fn test_body_validation() {
        assert!(validate_body("hello").is_ok());
        assert!(validate_body(&"é".repeat(140)).is_ok());
        assert!(matches!(validate_body("   "), Err(AppError::BadRequest(_))));
        assert!(matches!(validate_body(&"x".repeat(141)), Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_create_requires_author() {
        let (session, _) = session_with_user().await;
        let result = process_create_post(&session, create(7, "hello")).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_mutations_reach_the_index() {
        let (session, index) = session_with_user().await;

        let post = process_create_post(&session, create(1, "hello alpha"))
            .await
            .unwrap();
        let (found, _) = search::<Post>(&session, &index, "alpha", 1, 10).await.unwrap();
        let ids: Vec<_> = found.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![post.id]);

        process_update_post(
            &session,
            post.id,
            UpdatePostRequest {
                body: "hello beta".to_string(),
            },
        )
        .await
        .unwrap();
        let (found, total) = search::<Post>(&session, &index, "alpha", 1, 10).await.unwrap();
        assert!(found.is_empty());
        assert_eq!(total, 0);
        let (found, _) = search::<Post>(&session, &index, "beta", 1, 10).await.unwrap();
        assert_eq!(found[0].body, "hello beta");

        process_delete_post(&session, post.id).await.unwrap();
        let (found, _) = search::<Post>(&session, &index, "beta", 1, 10).await.unwrap();
        assert!(found.is_empty());

        let missing = process_delete_post(&session, post.id).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_newest_first_with_pages() {
        let (session, _) = session_with_user().await;
        let mut uow = UnitOfWork::new();
        uow.add(&User {
            id: 2,
            username: "john".to_string(),
            email: "john@example.com".to_string(),
            about_me: None,
        })
        .unwrap();
        let now = Utc::now();
        for id in 1..=5 {
            uow.add(&Post {
                id,
                body: format!("post {id}"),
                timestamp: now + chrono::Duration::seconds(id),
                user_id: if id == 5 { 2 } else { 1 },
                language: String::new(),
            })
            .unwrap();
        }
        session.commit(uow).await.unwrap();

        let first = process_list_posts(&session, None, 1, 2).await.unwrap();
        let ids: Vec<_> = first.items.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![5, 4]);
        assert_eq!(first.total, 5);
        assert_eq!(first.next_page, Some(2));
        assert_eq!(first.prev_page, None);

        let last = process_list_posts(&session, None, 3, 2).await.unwrap();
        assert_eq!(last.items.len(), 1);
        assert_eq!(last.next_page, None);

        let susan = process_list_posts(&session, Some(1), 0, 10).await.unwrap();
        let ids: Vec<_> = susan.items.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![4, 3, 2, 1]);
        assert_eq!(susan.page, 1);
    }
}
