//! The `Task` contract, translated from `original_source/librarian_background/
//! task.py`'s `Task.on_call`.

use std::time::Instant;

use async_trait::async_trait;
use librarian_core::error::Result;

use crate::TaskContext;

/// A unit of periodic background work. A task that loops over more than a
/// handful of rows must check `deadline` between items (not mid-item) and
/// stop early, returning `Ok(false)`, once it's past: the scheduler's own
/// hard timeout around `run` is only a backstop for a task that hangs
/// entirely, not the mechanism a well-behaved task relies on.
#[async_trait]
pub trait Task: Send + Sync {
    fn name(&self) -> &str;

    /// Returns `Ok(true)` if every eligible row was processed, `Ok(false)` if
    /// the task stopped early (past `deadline`, or a task-specific skip), and
    /// `Err` only for failures that should be logged as a diagnostic `Error`
    /// row rather than silently retried.
    async fn run(&self, ctx: &TaskContext, deadline: Instant) -> Result<bool>;

    /// Has this task decided it will never usefully run again (e.g. its
    /// configured store no longer exists)? The scheduler stops rescheduling
    /// a task once this turns `true` rather than re-running it every tick.
    /// Default: never self-cancels.
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Is `deadline` already behind us?
pub fn past_deadline(deadline: Instant) -> bool {
    Instant::now() >= deadline
}
