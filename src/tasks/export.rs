use std::sync::Arc;

use async_trait::async_trait;
use chrono::SecondsFormat;
use serde::Serialize;

use crate::db::models::{Post, User};
use crate::db::record::{Query, RecordId};
use crate::db::session::Session;
use crate::email::mailer::{Attachment, Email, Mailer};
use crate::error::AppError;
use crate::tasks::progress::set_task_progress;
use crate::tasks::queue::{JobContext, JobHandler, JobRequest};

#[derive(Debug, Serialize)]
struct ExportedPost<'a> {
    body: &'a str,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct PostArchive<'a> {
    posts: Vec<ExportedPost<'a>>,
}

/// Email `user_id` an archive of their posts, reporting progress as it goes.
///
/// Failures are logged, never returned: the task always ends at 100.
pub async fn export_posts(
    session: &Session,
    mailer: &dyn Mailer,
    sender: &str,
    ctx: &JobContext,
    user_id: RecordId,
) {
    if let Err(e) = run_export(session, mailer, sender, ctx, user_id).await {
        tracing::error!("Export of posts for user {} failed: {e}", user_id);
    }

    if let Err(e) = set_task_progress(session, ctx, 100.0).await {
        tracing::error!("Failed to complete task {}: {e}", ctx.job_id);
    }
}

async fn run_export(
    session: &Session,
    mailer: &dyn Mailer,
    sender: &str,
    ctx: &JobContext,
    user_id: RecordId,
) -> Result<(), AppError> {
    let user: User = session
        .get(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {user_id}")))?;

    set_task_progress(session, ctx, 0.0).await?;

    let posts: Vec<Post> = session
        .find(&Query::new().eq("user_id", user_id).sort_asc("timestamp"))
        .await?;

    let total = posts.len();
    let mut archive = PostArchive {
        posts: Vec::with_capacity(total),
    };
    for (i, post) in posts.iter().enumerate() {
        archive.posts.push(ExportedPost {
            body: &post.body,
            timestamp: post.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        });
        set_task_progress(session, ctx, 100.0 * (i + 1) as f64 / total as f64).await?;
    }

    let content = serde_json::to_vec_pretty(&archive)
        .map_err(|e| AppError::Internal(format!("Failed to serialize posts: {e}")))?;

    mailer
        .send(Email {
            subject: "[Microblog] Your blog posts".to_string(),
            sender: sender.to_string(),
            recipients: vec![user.email],
            text_body: format!(
                "Dear {},\n\nPlease find attached the archive of your posts that you requested.\n",
                user.username
            ),
            html_body: format!(
                "<p>Dear {},</p><p>Please find attached the archive of your posts that you requested.</p>",
                user.username
            ),
            attachments: vec![Attachment {
                filename: "posts.json".to_string(),
                content_type: "application/json".to_string(),
                content,
            }],
        })
        .await?;

    tracing::info!("Exported {} post(s) for user {}", total, user_id);
    Ok(())
}

/// Job handler running the microblog's background jobs.
pub struct TaskWorker {
    session: Session,
    mailer: Arc<dyn Mailer>,
    sender: String,
}

impl TaskWorker {
    pub fn new(session: Session, mailer: Arc<dyn Mailer>, sender: impl Into<String>) -> Self {
        Self {
            session,
            mailer,
            sender: sender.into(),
        }
    }
}

#[async_trait]
impl JobHandler for TaskWorker {
    async fn run(&self, ctx: JobContext, request: JobRequest) {
        match request {
            JobRequest::ExportPosts { user_id } => {
                export_posts(&self.session, self.mailer.as_ref(), &self.sender, &ctx, user_id).await
            }
        }
    }
}
