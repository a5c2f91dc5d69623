use axum::extract::{Path, Query as QueryParams, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::users::process_get_user;
use crate::app::AppState;
use crate::db::models::{Follow, Post, PostPage};
use crate::db::record::{Query, RecordId};
use crate::db::session::Session;
use crate::db::unit_of_work::UnitOfWork;
use crate::error::AppError;

async fn find_follow(
    session: &Session,
    follower_id: RecordId,
    followed_id: RecordId,
) -> Result<Option<Follow>, AppError> {
    session
        .find_one::<Follow>(
            &Query::new()
                .eq("follower_id", follower_id)
                .eq("followed_id", followed_id),
        )
        .await
}

/// Both users must exist and be distinct.
async fn check_pair(
    session: &Session,
    follower_id: RecordId,
    followed_id: RecordId,
) -> Result<(), AppError> {
    process_get_user(session, follower_id).await?;
    process_get_user(session, followed_id).await?;
    if follower_id == followed_id {
        return Err(AppError::BadRequest("Users cannot follow themselves".into()));
    }
    Ok(())
}

/// Start following `followed_id`. Following someone twice is a no-op.
pub async fn process_follow(
    session: &Session,
    follower_id: RecordId,
    followed_id: RecordId,
) -> Result<(), AppError> {
    check_pair(session, follower_id, followed_id).await?;
    if find_follow(session, follower_id, followed_id).await?.is_some() {
        return Ok(());
    }

    let follow = Follow {
        id: session.allocate_id::<Follow>().await?,
        follower_id,
        followed_id,
    };

    let mut uow = UnitOfWork::new();
    uow.add(&follow)?;
    session.commit(uow).await?;

    tracing::debug!("User {} now follows {}", follower_id, followed_id);
    Ok(())
}

/// Stop following `followed_id`. Unfollowing someone not followed is a no-op.
pub async fn process_unfollow(
    session: &Session,
    follower_id: RecordId,
    followed_id: RecordId,
) -> Result<(), AppError> {
    check_pair(session, follower_id, followed_id).await?;
    let Some(follow) = find_follow(session, follower_id, followed_id).await? else {
        return Ok(());
    };

    let mut uow = UnitOfWork::new();
    uow.delete::<Follow>(follow.id);
    session.commit(uow).await
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowCounts {
    pub followers: u64,
    pub following: u64,
}

pub async fn process_follow_counts(
    session: &Session,
    user_id: RecordId,
) -> Result<FollowCounts, AppError> {
    process_get_user(session, user_id).await?;
    Ok(FollowCounts {
        followers: session
            .count::<Follow>(&Query::new().eq("followed_id", user_id))
            .await?,
        following: session
            .count::<Follow>(&Query::new().eq("follower_id", user_id))
            .await?,
    })
}

/// The user's timeline: their own posts and those of everyone they follow,
/// newest first.
pub async fn process_timeline(
    session: &Session,
    user_id: RecordId,
    page: u32,
    per_page: u32,
) -> Result<PostPage, AppError> {
    process_get_user(session, user_id).await?;

    let mut authors: Vec<RecordId> = session
        .find::<Follow>(&Query::new().eq("follower_id", user_id))
        .await?
        .into_iter()
        .map(|follow| follow.followed_id)
        .collect();
    authors.push(user_id);

    let page = page.max(1);
    let query = Query::new()
        .is_in("user_id", authors)
        .sort_desc("timestamp");
    let total = session.count::<Post>(&query).await?;
    let items = session.find::<Post>(&query.page(page, per_page)).await?;

    Ok(PostPage::new(items, total, page, per_page))
}

/// Axum handler for `POST /api/v1/users/{id}/follow/{target}`.
pub async fn follow_handler(
    State(state): State<AppState>,
    Path((id, target)): Path<(RecordId, RecordId)>,
) -> Result<StatusCode, AppError> {
    process_follow(&state.session, id, target).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Axum handler for `DELETE /api/v1/users/{id}/follow/{target}`.
pub async fn unfollow_handler(
    State(state): State<AppState>,
    Path((id, target)): Path<(RecordId, RecordId)>,
) -> Result<StatusCode, AppError> {
    process_unfollow(&state.session, id, target).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn follow_counts_handler(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
) -> Result<Json<FollowCounts>, AppError> {
    Ok(Json(process_follow_counts(&state.session, id).await?))
}

#[derive(Debug, Deserialize)]
pub struct TimelineParams {
    pub page: Option<u32>,
}

/// Axum handler for `GET /api/v1/users/{id}/timeline`.
pub async fn timeline_handler(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
    QueryParams(params): QueryParams<TimelineParams>,
) -> Result<Json<PostPage>, AppError> {
    let page = process_timeline(
        &state.session,
        id,
        params.page.unwrap_or(1),
        state.posts_per_page,
    )
    .await?;
    Ok(Json(page))
}
