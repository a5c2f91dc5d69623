use chrono::{DateTime, Utc};

use crate::db::models::Notification;
use crate::db::record::{Query, RecordId};
use crate::db::session::Session;
use crate::db::unit_of_work::UnitOfWork;
use crate::error::AppError;

/// Stage a notification for `user_id`, replacing any earlier notification
/// with the same name so that only the latest value is kept.
pub async fn add_notification(
    session: &Session,
    uow: &mut UnitOfWork,
    user_id: RecordId,
    name: &str,
    payload: serde_json::Value,
) -> Result<Notification, AppError> {
    let previous: Vec<Notification> = session
        .find(&Query::new().eq("user_id", user_id).eq("name", name))
        .await?;
    for notification in &previous {
        uow.delete::<Notification>(notification.id);
    }

    let notification = Notification {
        id: session.allocate_id::<Notification>().await?,
        name: name.to_string(),
        user_id,
        timestamp: Utc::now(),
        payload_json: payload.to_string(),
    };
    uow.add(&notification)?;

    Ok(notification)
}

/// The user's notifications strictly newer than `since`, oldest first.
pub async fn notifications_since(
    session: &Session,
    user_id: RecordId,
    since: DateTime<Utc>,
) -> Result<Vec<Notification>, AppError> {
    session
        .find(
            &Query::new()
                .eq("user_id", user_id)
                .gt("timestamp", since.timestamp_millis())
                .sort_asc("timestamp"),
        )
        .await
}
