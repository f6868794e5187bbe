//! Bulk repository operation engine.
//!
//! The [`Orchestrator`] turns a repository list into a queue of [`task::Task`]s,
//! drains it with a [`pool::WorkerPool`], and folds each [`outcome::RepoOutcome`]
//! into a [`outcome::RunSummary`]. Every apply goes through the
//! [`retry::RetryWrapper`], which debits the shared [`limiter::RateLimiter`]
//! before each attempt.

pub mod limiter;
pub mod outcome;
pub mod pool;
pub mod retry;
pub mod task;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::actions::Action;
use crate::error::{AppError, Result};
use crate::platform::types::Repository;

use limiter::RateLimiter;
use outcome::{RepoOutcome, RunSummary};
use pool::WorkerPool;
use retry::{RetryPolicy, RetryWrapper};
use task::{build_tasks, RepoFilter};

/// Per-run settings supplied by the CLI layer.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub workers: usize,
    pub dry_run: bool,
    pub fail_fast: bool,
    pub filter: RepoFilter,
    pub retry: RetryPolicy,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            dry_run: false,
            fail_fast: false,
            filter: RepoFilter::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Owns a run: queue construction, the worker pool, and result aggregation.
pub struct Orchestrator {
    limiter: Arc<RateLimiter>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(limiter: Arc<RateLimiter>, cancel: CancellationToken) -> Self {
        Self { limiter, cancel }
    }

    /// Apply `action` to every allowed repository and summarize the results.
    ///
    /// Per-repository errors never escape; only invalid run configuration is
    /// returned as an error.
    pub async fn run_batch<F>(
        &self,
        repos: &[Repository],
        action: Arc<dyn Action>,
        config: &BatchConfig,
        mut on_outcome: F,
    ) -> Result<RunSummary>
    where
        F: FnMut(&RepoOutcome),
    {
        if config.workers == 0 {
            return Err(AppError::Config("worker count must be at least 1".to_string()));
        }
        config.retry.validate()?;

        let tasks = build_tasks(repos, &action, &config.filter);
        let task_count = tasks.len();

        tracing::info!(
            action = action.name(),
            repos = repos.len(),
            tasks = task_count,
            workers = config.workers,
            dry_run = config.dry_run,
            "Starting batch"
        );

        // Fail-fast cancels only this run; operator interrupts arrive through the parent.
        let run_cancel = self.cancel.child_token();
        let wrapper = Arc::new(RetryWrapper::new(
            config.retry.clone(),
            Arc::clone(&self.limiter),
            run_cancel.clone(),
            config.dry_run,
        ));

        let mut summary = RunSummary::new(action.name(), config.dry_run);
        let outcomes = WorkerPool::new(config.workers, config.fail_fast)
            .run(tasks, wrapper, run_cancel, |outcome| on_outcome(outcome))
            .await;

        for outcome in outcomes {
            summary.record(outcome);
        }
        summary.finalize();

        if summary.total() != task_count {
            return Err(AppError::Internal(format!(
                "expected {task_count} outcomes, collected {}",
                summary.total()
            )));
        }

        tracing::info!(
            applied = summary.counts.applied,
            skipped = summary.counts.skipped,
            failed = summary.counts.failed,
            previewed = summary.counts.previewed,
            "Batch complete"
        );

        Ok(summary)
    }
}
