use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::actions::Action;
use crate::engine::limiter::RateLimiter;
use crate::engine::outcome::Outcome;
use crate::error::{AppError, ErrorClass, Result};
use crate::platform::types::Repository;

/// What to do when a repository lacks the target or a prerequisite feature.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotFoundPolicy {
    #[default]
    Skip,
    Fail,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub jitter: bool,
    pub retryable: Vec<ErrorClass>,
    pub not_found: NotFoundPolicy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            jitter: true,
            retryable: vec![
                ErrorClass::RateLimited,
                ErrorClass::Transient,
                ErrorClass::RateLimitTimeout,
            ],
            not_found: NotFoundPolicy::Skip,
        }
    }
}

impl RetryPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(AppError::Config(
                "engine.max_attempts must be at least 1".to_string(),
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(AppError::Config(format!(
                "engine.backoff_multiplier must be >= 1.0, got {}",
                self.multiplier
            )));
        }
        if let Some(class) = self
            .retryable
            .iter()
            .find(|c| matches!(c, ErrorClass::Cancelled | ErrorClass::NotFound))
        {
            return Err(AppError::Config(format!("{class:?} errors cannot be retried")));
        }
        Ok(())
    }

    pub fn is_retryable(&self, class: ErrorClass) -> bool {
        self.retryable.contains(&class)
    }

    /// Backoff before the attempt following `attempt` (1-based), without jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let millis = self.base_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Backoff with optional equal jitter: uniformly between half and the full delay.
    pub fn jittered_delay_for(&self, attempt: u32) -> Duration {
        let delay = self.delay_for(attempt);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let half = delay / 2;
        let extra = rand::thread_rng().gen_range(0..=(delay - half).as_millis() as u64);
        half + Duration::from_millis(extra)
    }
}

/// Runs one action against one repository with quota, retry and backoff handling.
///
/// Actions are written as if every call succeeds or fails once; this wrapper is
/// the only place that retries.
pub struct RetryWrapper {
    policy: RetryPolicy,
    limiter: Arc<RateLimiter>,
    cancel: CancellationToken,
    dry_run: bool,
}

impl RetryWrapper {
    pub fn new(
        policy: RetryPolicy,
        limiter: Arc<RateLimiter>,
        cancel: CancellationToken,
        dry_run: bool,
    ) -> Self {
        Self {
            policy,
            limiter,
            cancel,
            dry_run,
        }
    }

    /// Returns the outcome and the number of attempts used.
    pub async fn invoke(&self, action: &dyn Action, repo: &Repository) -> (Outcome, u32) {
        if self.dry_run {
            let description = action.describe(repo);
            return (Outcome::DryRunPreview { description }, 1);
        }

        let mut attempt = 0;
        loop {
            if self.cancel.is_cancelled() {
                return (Outcome::cancelled(), attempt);
            }
            attempt += 1;

            let acquired = tokio::select! {
                result = self.limiter.acquire(action.cost()) => result,
                _ = self.cancel.cancelled() => Err(AppError::PoolCancelled),
            };
            let result = match acquired {
                Ok(()) => action.apply(repo).await,
                Err(e) => Err(e),
            };

            let error = match result {
                Ok(detail) => return (Outcome::Applied { detail }, attempt),
                Err(e) => e,
            };

            let class = error.class();
            match class {
                ErrorClass::Cancelled => return (Outcome::cancelled(), attempt),
                ErrorClass::NotFound => {
                    let outcome = match self.policy.not_found {
                        NotFoundPolicy::Skip => Outcome::Skipped {
                            reason: error.to_string(),
                        },
                        NotFoundPolicy::Fail => Outcome::failed(&error),
                    };
                    return (outcome, attempt);
                }
                _ if !self.policy.is_retryable(class) => {
                    tracing::warn!(
                        repo = %repo,
                        action = action.name(),
                        error = %error,
                        "Terminal error, not retrying"
                    );
                    return (Outcome::failed(&error), attempt);
                }
                _ => {}
            }

            if attempt >= self.policy.max_attempts {
                tracing::warn!(
                    repo = %repo,
                    action = action.name(),
                    attempts = attempt,
                    error = %error,
                    "Retries exhausted"
                );
                return (Outcome::failed(&error), attempt);
            }

            let delay = match &error {
                AppError::RateLimited {
                    retry_after: Some(hint),
                    ..
                } => *hint,
                _ => self.policy.jittered_delay_for(attempt),
            };

            tracing::warn!(
                repo = %repo,
                action = action.name(),
                attempt,
                error = %error,
                retry_in_ms = delay.as_millis() as u64,
                "Retrying after retryable error"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.cancel.cancelled() => return (Outcome::cancelled(), attempt),
            }
        }
    }
}
