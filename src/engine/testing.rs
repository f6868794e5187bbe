//! Scripted action used by the engine tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::actions::Action;
use crate::error::{AppError, ErrorClass, Result};
use crate::platform::types::Repository;

#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    Succeed,
    /// Fail with the given class `n` times, then succeed.
    FailTimes(u32, ErrorClass),
    Always(ErrorClass),
    Panic,
    /// Succeed after sleeping.
    Slow(Duration),
}

pub struct ScriptedAction {
    script: HashMap<String, Behavior>,
    attempts: Mutex<HashMap<String, u32>>,
    apply_calls: AtomicUsize,
    describe_calls: AtomicUsize,
}

impl ScriptedAction {
    pub fn new() -> Self {
        Self {
            script: HashMap::new(),
            attempts: Mutex::new(HashMap::new()),
            apply_calls: AtomicUsize::new(0),
            describe_calls: AtomicUsize::new(0),
        }
    }

    pub fn with(mut self, repo: &str, behavior: Behavior) -> Self {
        self.script.insert(repo.to_string(), behavior);
        self
    }

    pub fn apply_calls(&self) -> usize {
        self.apply_calls.load(Ordering::SeqCst)
    }

    pub fn describe_calls(&self) -> usize {
        self.describe_calls.load(Ordering::SeqCst)
    }
}

pub fn error_of(class: ErrorClass) -> AppError {
    match class {
        ErrorClass::RateLimitTimeout => AppError::RateLimitTimeout("scripted".to_string()),
        ErrorClass::Auth => AppError::Auth("scripted".to_string()),
        ErrorClass::NotFound => AppError::NotFound("scripted".to_string()),
        ErrorClass::RateLimited => AppError::RateLimited {
            message: "scripted".to_string(),
            retry_after: None,
        },
        ErrorClass::Transient => AppError::Transient("scripted".to_string()),
        ErrorClass::Validation => AppError::Validation("scripted".to_string()),
        ErrorClass::Cancelled => AppError::PoolCancelled,
        ErrorClass::Internal => AppError::Internal("scripted".to_string()),
    }
}

#[async_trait]
impl Action for ScriptedAction {
    fn name(&self) -> &str {
        "scripted"
    }

    fn describe(&self, repo: &Repository) -> String {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        format!("would touch {repo}")
    }

    async fn apply(&self, repo: &Repository) -> Result<String> {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        let key = repo.full_name();
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let counter = attempts.entry(key.clone()).or_insert(0);
            *counter += 1;
            *counter
        };

        match self.script.get(&key).copied().unwrap_or(Behavior::Succeed) {
            Behavior::Succeed => Ok(format!("touched {repo}")),
            Behavior::FailTimes(n, class) if attempt <= n => Err(error_of(class)),
            Behavior::FailTimes(..) => Ok(format!("touched {repo} on attempt {attempt}")),
            Behavior::Always(class) => Err(error_of(class)),
            Behavior::Panic => panic!("scripted panic for {repo}"),
            Behavior::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(format!("touched {repo} slowly"))
            }
        }
    }
}
