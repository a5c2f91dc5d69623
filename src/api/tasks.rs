use axum::extract::{Path, Query as QueryParams, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::db::models::{Task, TaskProgress, User};
use crate::db::record::RecordId;
use crate::db::session::Session;
use crate::error::AppError;
use crate::notifications::notifications_since;
use crate::tasks::progress::{launch_task, tasks_in_progress};
use crate::tasks::queue::{JobMeta, JobQueue, JobRequest};

async fn require_user(session: &Session, user_id: RecordId) -> Result<User, AppError> {
    session
        .get(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {user_id}")))
}

/// Start an export of the user's posts.
pub async fn process_export_posts(
    session: &Session,
    queue: &dyn JobQueue,
    user_id: RecordId,
) -> Result<Task, AppError> {
    require_user(session, user_id).await?;
    launch_task(session, queue, user_id, JobRequest::ExportPosts { user_id }).await
}

pub async fn process_list_tasks(
    session: &Session,
    meta: &dyn JobMeta,
    user_id: RecordId,
) -> Result<Vec<TaskProgress>, AppError> {
    require_user(session, user_id).await?;
    tasks_in_progress(session, meta, user_id).await
}

/// A notification as exposed over HTTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationResponse {
    pub name: String,
    pub data: serde_json::Value,
    /// Unix milliseconds.
    pub timestamp: i64,
}

/// Notifications newer than `since` (Unix milliseconds), oldest first.
pub async fn process_notifications(
    session: &Session,
    user_id: RecordId,
    since: i64,
) -> Result<Vec<NotificationResponse>, AppError> {
    let since = Utc
        .timestamp_millis_opt(since)
        .single()
        .ok_or_else(|| AppError::BadRequest(format!("Invalid timestamp {since}")))?;

    let notifications = notifications_since(session, user_id, since).await?;
    Ok(notifications
        .into_iter()
        .map(|n| NotificationResponse {
            data: n.payload(),
            timestamp: n.timestamp.timestamp_millis(),
            name: n.name,
        })
        .collect())
}

/// Axum handler for `POST /api/v1/users/{id}/export`.
pub async fn export_posts_handler(
    State(state): State<AppState>,
    Path(user_id): Path<RecordId>,
) -> Result<(StatusCode, Json<Task>), AppError> {
    let task = process_export_posts(&state.session, state.job_queue.as_ref(), user_id).await?;
    Ok((StatusCode::ACCEPTED, Json(task)))
}

/// Axum handler for `GET /api/v1/users/{id}/tasks`.
pub async fn list_tasks_handler(
    State(state): State<AppState>,
    Path(user_id): Path<RecordId>,
) -> Result<Json<Vec<TaskProgress>>, AppError> {
    let tasks = process_list_tasks(&state.session, state.job_meta.as_ref(), user_id).await?;
    Ok(Json(tasks))
}

#[derive(Debug, Deserialize)]
pub struct NotificationParams {
    #[serde(default)]
    pub since: i64,
}

/// Axum handler for `GET /api/v1/users/{id}/notifications`.
pub async fn notifications_handler(
    State(state): State<AppState>,
    Path(user_id): Path<RecordId>,
    QueryParams(params): QueryParams<NotificationParams>,
) -> Result<Json<Vec<NotificationResponse>>, AppError> {
    let notifications = process_notifications(&state.session, user_id, params.since).await?;
    Ok(Json(notifications))
}
