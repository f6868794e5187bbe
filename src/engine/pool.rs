use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::engine::outcome::{Outcome, RepoOutcome};
use crate::engine::retry::RetryWrapper;
use crate::engine::task::Task;
use crate::error::AppError;

/// Fixed-size pool of workers draining one shared queue.
pub struct WorkerPool {
    workers: usize,
    fail_fast: bool,
}

impl WorkerPool {
    pub fn new(workers: usize, fail_fast: bool) -> Self {
        Self {
            workers: workers.max(1),
            fail_fast,
        }
    }

    /// Run every task exactly once and return the outcomes in completion order.
    ///
    /// `on_outcome` is called as each outcome arrives. Once `cancel` fires,
    /// queued tasks are drained as cancelled outcomes; in-flight calls finish.
    pub async fn run<F>(
        &self,
        tasks: Vec<Task>,
        wrapper: Arc<RetryWrapper>,
        cancel: CancellationToken,
        mut on_outcome: F,
    ) -> Vec<RepoOutcome>
    where
        F: FnMut(&RepoOutcome),
    {
        let total = tasks.len();
        let queue = Arc::new(Mutex::new(tasks.into_iter().collect::<VecDeque<Task>>()));
        let (tx, mut rx) = mpsc::unbounded_channel::<RepoOutcome>();

        let worker_count = self.workers.min(total.max(1));
        let mut handles = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            handles.push(tokio::spawn(worker_loop(
                worker_id,
                Arc::clone(&queue),
                Arc::clone(&wrapper),
                cancel.clone(),
                self.fail_fast,
                tx.clone(),
            )));
        }
        drop(tx);

        let mut outcomes = Vec::with_capacity(total);
        while let Some(outcome) = rx.recv().await {
            on_outcome(&outcome);
            outcomes.push(outcome);
        }

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Worker task aborted");
            }
        }

        // A worker that died unexpectedly may have left tasks behind.
        let leftover: Vec<Task> = queue.lock().await.drain(..).collect();
        for task in leftover {
            let outcome = RepoOutcome {
                index: task.index,
                repo: task.repo,
                outcome: Outcome::cancelled(),
                attempts: 0,
                elapsed_ms: 0,
            };
            on_outcome(&outcome);
            outcomes.push(outcome);
        }

        outcomes
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<Mutex<VecDeque<Task>>>,
    wrapper: Arc<RetryWrapper>,
    cancel: CancellationToken,
    fail_fast: bool,
    tx: mpsc::UnboundedSender<RepoOutcome>,
) {
    tracing::debug!(worker = worker_id, "Worker started");

    loop {
        let task = queue.lock().await.pop_front();
        let Some(task) = task else {
            break;
        };

        let started = Instant::now();
        let (outcome, attempts) = if cancel.is_cancelled() {
            (Outcome::cancelled(), 0)
        } else {
            tracing::debug!(worker = worker_id, task = %task.description(), "Processing task");
            run_isolated(&task, Arc::clone(&wrapper)).await
        };

        if fail_fast && outcome.is_failed() && !outcome.is_cancelled() {
            tracing::warn!(repo = %task.repo, "Failure with fail-fast enabled, cancelling run");
            cancel.cancel();
        }

        let record = RepoOutcome {
            index: task.index,
            repo: task.repo,
            outcome,
            attempts,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        if tx.send(record).is_err() {
            break;
        }
    }

    tracing::debug!(worker = worker_id, "Worker finished");
}

/// Invoke the task on its own tokio task so a panicking action only fails its repository.
async fn run_isolated(task: &Task, wrapper: Arc<RetryWrapper>) -> (Outcome, u32) {
    let action = Arc::clone(&task.action);
    let repo = task.repo.clone();

    match tokio::spawn(async move { wrapper.invoke(action.as_ref(), &repo).await }).await {
        Ok(result) => result,
        Err(e) => {
            let reason = if e.is_panic() {
                panic_message(e.into_panic())
            } else {
                e.to_string()
            };
            tracing::error!(repo = %task.repo, reason = %reason, "Action crashed");
            (
                Outcome::failed(&AppError::Internal(format!("action crashed: {reason}"))),
                1,
            )
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
