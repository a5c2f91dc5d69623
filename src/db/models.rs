use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::record::{Record, RecordId};
use crate::search::searchable::Searchable;

/// Every collection holding records, for index setup.
pub const RECORD_COLLECTIONS: &[&str] = &[
    User::COLLECTION,
    Post::COLLECTION,
    Follow::COLLECTION,
    Notification::COLLECTION,
    Task::COLLECTION,
];

/// A registered account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: RecordId,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub about_me: Option<String>,
}

impl Record for User {
    const COLLECTION: &'static str = "users";

    fn id(&self) -> RecordId {
        self.id
    }
}

/// A short message published by a user. Its body is full-text indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: RecordId,
    pub body: String,
    /// Publication time, stored as Unix milliseconds.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub user_id: RecordId,
    /// Language code of the body, empty when unknown.
    #[serde(default)]
    pub language: String,
}

impl Record for Post {
    const COLLECTION: &'static str = "posts";

    fn id(&self) -> RecordId {
        self.id
    }
}

impl Searchable for Post {
    const SEARCHABLE_FIELDS: &'static [&'static str] = &["body"];
}

/// One user following another. Unique per `(follower_id, followed_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Follow {
    pub id: RecordId,
    pub follower_id: RecordId,
    pub followed_id: RecordId,
}

impl Record for Follow {
    const COLLECTION: &'static str = "follows";

    fn id(&self) -> RecordId {
        self.id
    }
}

/// A user-visible event pushed to a user, e.g. background task progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: RecordId,
    pub name: String,
    pub user_id: RecordId,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// JSON-encoded payload.
    pub payload_json: String,
}

impl Notification {
    pub fn payload(&self) -> serde_json::Value {
        serde_json::from_str(&self.payload_json).unwrap_or(serde_json::Value::Null)
    }
}

impl Record for Notification {
    const COLLECTION: &'static str = "notifications";

    fn id(&self) -> RecordId {
        self.id
    }
}

/// A background job launched on behalf of a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: RecordId,
    /// Identifier of the job in the job queue.
    pub job_id: String,
    pub name: String,
    pub description: String,
    pub user_id: RecordId,
    #[serde(default)]
    pub complete: bool,
}

impl Record for Task {
    const COLLECTION: &'static str = "tasks";

    fn id(&self) -> RecordId {
        self.id
    }
}

/// The request payload for creating a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub about_me: Option<String>,
}

/// The request payload for editing a profile. Absent fields are left as is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub about_me: Option<String>,
}

/// The request payload for publishing a post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePostRequest {
    pub user_id: RecordId,
    pub body: String,
    #[serde(default)]
    pub language: Option<String>,
}

/// The request payload for editing a post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePostRequest {
    pub body: String,
}

/// One page of posts, as returned by listing and search endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostPage {
    pub items: Vec<Post>,
    pub total: u64,
    pub page: u32,
    pub next_page: Option<u32>,
    pub prev_page: Option<u32>,
}

impl PostPage {
    pub fn new(items: Vec<Post>, total: u64, page: u32, per_page: u32) -> Self {
        let page = page.max(1);
        let has_next = (page as u64) * (per_page as u64) < total;
        Self {
            items,
            total,
            page,
            next_page: has_next.then_some(page + 1),
            prev_page: (page > 1).then_some(page - 1),
        }
    }
}

/// A task that has not completed yet, with its live progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskProgress {
    pub job_id: String,
    pub name: String,
    pub description: String,
    pub progress: f64,
}
