use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::app::AppState;
use crate::db::models::{CreateUserRequest, UpdateUserRequest, User};
use crate::db::record::{Query, RecordId};
use crate::db::session::Session;
use crate::db::unit_of_work::UnitOfWork;
use crate::error::AppError;

/// Longest accepted profile text, in characters.
pub const MAX_ABOUT_ME_LENGTH: usize = 140;

/// Whether a user other than `except` already uses `value` for `field`.
async fn held_by_other(
    session: &Session,
    field: &str,
    value: &str,
    except: Option<RecordId>,
) -> Result<bool, AppError> {
    let holder = session
        .find_one::<User>(&Query::new().eq(field, value))
        .await?;
    Ok(holder.is_some_and(|user| Some(user.id) != except))
}

/// Register a user. Usernames and emails must be non-empty and unique.
pub async fn process_create_user(
    session: &Session,
    request: CreateUserRequest,
) -> Result<User, AppError> {
    let username = request.username.trim();
    let email = request.email.trim();
    if username.is_empty() {
        return Err(AppError::BadRequest("Username cannot be empty".into()));
    }
    if email.is_empty() {
        return Err(AppError::BadRequest("Email cannot be empty".into()));
    }

    if held_by_other(session, "username", username, None).await? {
        return Err(AppError::Conflict(format!("Username '{username}' is taken")));
    }
    if held_by_other(session, "email", email, None).await? {
        return Err(AppError::Conflict(format!("Email '{email}' is already registered")));
    }

    let user = User {
        id: session.allocate_id::<User>().await?,
        username: username.to_string(),
        email: email.to_string(),
        about_me: request.about_me,
    };

    let mut uow = UnitOfWork::new();
    uow.add(&user)?;
    session.commit(uow).await?;

    Ok(user)
}

pub async fn process_get_user(session: &Session, id: RecordId) -> Result<User, AppError> {
    session
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {id}")))
}

/// Edit a profile. A new username must stay unique; an empty `about_me`
/// clears it.
pub async fn process_update_user(
    session: &Session,
    id: RecordId,
    request: UpdateUserRequest,
) -> Result<User, AppError> {
    let mut user = process_get_user(session, id).await?;

    if let Some(username) = request.username {
        let username = username.trim();
        if username.is_empty() {
            return Err(AppError::BadRequest("Username cannot be empty".into()));
        }
        if held_by_other(session, "username", username, Some(id)).await? {
            return Err(AppError::Conflict(format!("Username '{username}' is taken")));
        }
        user.username = username.to_string();
    }

    if let Some(about_me) = request.about_me {
        let about_me = about_me.trim();
        if about_me.chars().count() > MAX_ABOUT_ME_LENGTH {
            return Err(AppError::BadRequest(format!(
                "About me cannot exceed {MAX_ABOUT_ME_LENGTH} characters"
            )));
        }
        user.about_me = (!about_me.is_empty()).then(|| about_me.to_string());
    }

    let mut uow = UnitOfWork::new();
    uow.update(&user)?;
    session.commit(uow).await?;

    Ok(user)
}

/// Axum handler for `POST /api/v1/users`.
pub async fn create_user_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let user = process_create_user(&state.session, request).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Axum handler for `GET /api/v1/users/{id}`.
pub async fn get_user_handler(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
) -> Result<Json<User>, AppError> {
    Ok(Json(process_get_user(&state.session, id).await?))
}

/// Axum handler for `PUT /api/v1/users/{id}`.
pub async fn update_user_handler(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<User>, AppError> {
    Ok(Json(process_update_user(&state.session, id, request).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::db::memory::MemoryRecordStore;

    fn request(username: &str, email: &str) -> CreateUserRequest {
        CreateUserRequest {
            username: username.to_string(),
            email: email.to_string(),
            about_me: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_fetch_user() {
        let session = Session::new(Arc::new(MemoryRecordStore::new()));
        let user = process_create_user(&session, request(" susan ", "susan@example.com"))
            .await
            .unwrap();
        assert_eq!(user.username, "susan");

        let fetched = process_get_user(&session, user.id).await.unwrap();
        assert_eq!(fetched, user);
    }

    #[tokio::test]
    async fn test_rejects_empty_fields() {
        let session = Session::new(Arc::new(MemoryRecordStore::new()));
        let result = process_create_user(&session, request("", "a@example.com")).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));

        let result = process_create_user(&session, request("john", "  ")).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_rejects_duplicates() {
        let session = Session::new(Arc::new(MemoryRecordStore::new()));
        process_create_user(&session, request("susan", "susan@example.com"))
            .await
            .unwrap();

        let same_name = process_create_user(&session, request("susan", "other@example.com")).await;
        assert!(matches!(same_name, Err(AppError::Conflict(_))));

        let same_email = process_create_user(&session, request("sue", "susan@example.com")).await;
        assert!(matches!(same_email, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_update_profile() {
        let session = Session::new(Arc::new(MemoryRecordStore::new()));
        let susan = process_create_user(&session, request("susan", "susan@example.com"))
            .await
            .unwrap();
        process_create_user(&session, request("john", "john@example.com"))
            .await
            .unwrap();

        // Keeping one's own name is not a conflict.
        let updated = process_update_user(
            &session,
            susan.id,
            UpdateUserRequest {
                username: Some("susan".to_string()),
                about_me: Some(" I like cats ".to_string()),
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.about_me.as_deref(), Some("I like cats"));

        let taken = process_update_user(
            &session,
            susan.id,
            UpdateUserRequest {
                username: Some("john".to_string()),
                about_me: None,
            },
        )
        .await;
        assert!(matches!(taken, Err(AppError::Conflict(_))));

        let renamed = process_update_user(
            &session,
            susan.id,
            UpdateUserRequest {
                username: Some("sue".to_string()),
                about_me: Some(String::new()),
            },
        )
        .await
        .unwrap();
        assert_eq!(renamed.username, "sue");
        assert_eq!(renamed.about_me, None);
        assert_eq!(process_get_user(&session, susan.id).await.unwrap(), renamed);
    }

    #[tokio::test]
    async fn test_update_rejects_invalid_fields() {
        let session = Session::new(Arc::new(MemoryRecordStore::new()));
        let susan = process_create_user(&session, request("susan", "susan@example.com"))
            .await
            .unwrap();

        let blank = UpdateUserRequest {
            username: Some("  ".to_string()),
            about_me: None,
        };
        let result = process_update_user(&session, susan.id, blank).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));

        let long = UpdateUserRequest {
            username: None,
            about_me: Some("x".repeat(141)),
        };
        let result = process_update_user(&session, susan.id, long).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));

        let missing = process_update_user(&session, 99, UpdateUserRequest::default()).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_missing_user() {
        let session = Session::new(Arc::new(MemoryRecordStore::new()));
        let result = process_get_user(&session, 99).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
