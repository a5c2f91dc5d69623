use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::db::record::RecordId;
use crate::error::AppError;

/// A unit of background work, as handed to the job queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobRequest {
    ExportPosts { user_id: RecordId },
}

impl JobRequest {
    /// Task name; a user runs at most one incomplete task per name.
    pub fn name(&self) -> &'static str {
        match self {
            JobRequest::ExportPosts { .. } => "export_posts",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            JobRequest::ExportPosts { .. } => "Exporting posts...",
        }
    }
}

/// Metadata sink of the job runner.
#[async_trait]
pub trait JobMeta: Send + Sync {
    async fn save_progress(&self, job_id: &str, progress: f64) -> Result<(), AppError>;
    async fn progress(&self, job_id: &str) -> Result<Option<f64>, AppError>;
}

/// Job metadata kept in process memory.
#[derive(Default)]
pub struct MemoryJobMeta {
    progress: RwLock<HashMap<String, f64>>,
}

impl MemoryJobMeta {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobMeta for MemoryJobMeta {
    async fn save_progress(&self, job_id: &str, progress: f64) -> Result<(), AppError> {
        self.progress
            .write()
            .await
            .insert(job_id.to_string(), progress);
        Ok(())
    }

    async fn progress(&self, job_id: &str) -> Result<Option<f64>, AppError> {
        Ok(self.progress.read().await.get(job_id).copied())
    }
}

/// What a running job sees of its own execution.
#[derive(Clone)]
pub struct JobContext {
    pub job_id: String,
    pub meta: Arc<dyn JobMeta>,
}

/// Executes job requests. Failures are the handler's to report.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, ctx: JobContext, request: JobRequest);
}

/// Trait for submitting background jobs, enabling mock testing.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job_id: &str, request: JobRequest) -> Result<(), AppError>;
}

/// Runs every job on its own tokio task inside the current process.
pub struct LocalJobQueue {
    handler: Arc<dyn JobHandler>,
    meta: Arc<dyn JobMeta>,
}

impl LocalJobQueue {
    pub fn new(handler: Arc<dyn JobHandler>, meta: Arc<dyn JobMeta>) -> Self {
        Self { handler, meta }
    }
}

#[async_trait]
impl JobQueue for LocalJobQueue {
    async fn enqueue(&self, job_id: &str, request: JobRequest) -> Result<(), AppError> {
        let ctx = JobContext {
            job_id: job_id.to_string(),
            meta: self.meta.clone(),
        };
        let handler = self.handler.clone();

        tracing::info!("Starting job {} ({})", job_id, request.name());
        tokio::spawn(async move {
            let job_id = ctx.job_id.clone();
            handler.run(ctx, request).await;
            tracing::info!("Job {} finished", job_id);
        });

        Ok(())
    }
}
