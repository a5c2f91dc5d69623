use crate::db::models::{Task, TaskProgress};
use crate::db::record::{Query, RecordId};
use crate::db::session::Session;
use crate::db::unit_of_work::UnitOfWork;
use crate::error::AppError;
use crate::notifications::add_notification;
use crate::tasks::queue::{JobContext, JobMeta, JobQueue, JobRequest};

/// Name of the notification carrying task progress.
pub const TASK_PROGRESS: &str = "task_progress";

/// Record a task for `user_id` and submit its job.
///
/// The task record is committed before the job is enqueued, so the job can
/// always find it.
pub async fn launch_task(
    session: &Session,
    queue: &dyn JobQueue,
    user_id: RecordId,
    request: JobRequest,
) -> Result<Task, AppError> {
    let name = request.name();
    if task_in_progress(session, user_id, name).await?.is_some() {
        return Err(AppError::Conflict(format!(
            "A {name} task is already in progress"
        )));
    }

    let task = Task {
        id: session.allocate_id::<Task>().await?,
        job_id: uuid::Uuid::new_v4().to_string(),
        name: name.to_string(),
        description: request.description().to_string(),
        user_id,
        complete: false,
    };

    let mut uow = UnitOfWork::new();
    uow.add(&task)?;
    session.commit(uow).await?;

    queue.enqueue(&task.job_id, request).await?;
    tracing::info!("Launched {} task {} for user {}", name, task.job_id, user_id);

    Ok(task)
}

/// Report the progress of the running job.
///
/// Saves it in the job metadata, replaces the owner's `task_progress`
/// notification and marks the task complete once progress reaches 100.
pub async fn set_task_progress(
    session: &Session,
    ctx: &JobContext,
    progress: f64,
) -> Result<(), AppError> {
    ctx.meta.save_progress(&ctx.job_id, progress).await?;

    let mut task = session
        .find_one::<Task>(&Query::new().eq("job_id", ctx.job_id.as_str()))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Task for job {}", ctx.job_id)))?;

    let mut uow = UnitOfWork::new();
    add_notification(
        session,
        &mut uow,
        task.user_id,
        TASK_PROGRESS,
        serde_json::json!({ "task_id": ctx.job_id, "progress": progress }),
    )
    .await?;

    if progress >= 100.0 && !task.complete {
        task.complete = true;
        uow.update(&task)?;
    }

    session.commit(uow).await
}

/// The user's incomplete tasks with their current progress.
pub async fn tasks_in_progress(
    session: &Session,
    meta: &dyn JobMeta,
    user_id: RecordId,
) -> Result<Vec<TaskProgress>, AppError> {
    let tasks: Vec<Task> = session
        .find(
            &Query::new()
                .eq("user_id", user_id)
                .eq("complete", false)
                .sort_asc("id"),
        )
        .await?;

    let mut in_progress = Vec::with_capacity(tasks.len());
    for task in tasks {
        let progress = meta.progress(&task.job_id).await?.unwrap_or(0.0);
        in_progress.push(TaskProgress {
            job_id: task.job_id,
            name: task.name,
            description: task.description,
            progress,
        });
    }
    Ok(in_progress)
}

/// The user's incomplete task called `name`, if any.
pub async fn task_in_progress(
    session: &Session,
    user_id: RecordId,
    name: &str,
) -> Result<Option<Task>, AppError> {
    session
        .find_one(
            &Query::new()
                .eq("user_id", user_id)
                .eq("name", name)
                .eq("complete", false),
        )
        .await
}
