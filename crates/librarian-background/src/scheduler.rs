//! Runs every configured task on its own interval, forever.
//!
//! Grounded on `original_source/librarian_background/__init__.py`'s
//! `background()` loop (`SafeScheduler.every(...).seconds.do(...)` plus
//! `run_pending`); translated into one `tokio::time::interval` per task
//! running in its own spawned future rather than a single polling loop,
//! which is the idiom the rest of this workspace uses for concurrent I/O.

use std::sync::Arc;
use std::time::Duration;

use librarian_core::config::TaskSchedule;
use tokio::task::JoinHandle;

use crate::{Task, TaskContext};

/// Spawn every enabled task and return its handle. Dropping or aborting the
/// returned handles stops the corresponding task; the scheduler itself holds
/// no other state.
pub fn spawn_all(
    ctx: Arc<TaskContext>,
    entries: Vec<(Box<dyn Task>, TaskSchedule)>,
) -> Vec<JoinHandle<()>> {
    entries
        .into_iter()
        .filter(|(_, schedule)| schedule.enabled)
        .map(|(task, schedule)| spawn_one(ctx.clone(), task, schedule))
        .collect()
}

fn spawn_one(ctx: Arc<TaskContext>, task: Box<dyn Task>, schedule: TaskSchedule) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(schedule.every_seconds));
        let soft_timeout = Duration::from_secs(schedule.soft_timeout_seconds);

        loop {
            ticker.tick().await;
            let name = task.name().to_string();
            let started_at = std::time::Instant::now();
            let deadline = started_at + soft_timeout;

            // The task is expected to check `deadline` between items and
            // return early on its own; this outer timeout only catches a
            // task that hangs entirely (e.g. a stuck network call) rather
            // than enforcing the soft timeout itself, which would risk
            // aborting mid-item.
            let run = tokio::time::timeout(soft_timeout * 3, task.run(&ctx, deadline)).await;
            match run {
                Ok(Ok(true)) => {
                    tracing::debug!(task = %name, elapsed_ms = started_at.elapsed().as_millis() as u64, "task completed")
                }
                Ok(Ok(false)) => {
                    tracing::debug!(task = %name, "task yielded before finishing its backlog")
                }
                Ok(Err(err)) => {
                    tracing::error!(task = %name, error = %err, "task run failed");
                    if let Err(db_err) = ctx
                        .db
                        .raise_error(
                            librarian_core::types::ErrorSeverity::Error,
                            librarian_core::types::ErrorCategory::Programming,
                            &format!("task '{name}' failed: {err}"),
                        )
                        .await
                    {
                        tracing::error!(task = %name, error = %db_err, "failed to record task error");
                    }
                }
                Err(_) => {
                    tracing::warn!(task = %name, "task hung well past its soft timeout and was abandoned for this tick");
                }
            }

            if task.is_cancelled() {
                tracing::info!(task = %name, "task cancelled itself permanently, stopping its schedule");
                break;
            }
        }
    })
}
