use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::platform::types::RateLimitInfo;

/// Length of the primary quota window when the API has not told us otherwise.
const PRIMARY_WINDOW: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone)]
pub struct LimiterSettings {
    pub primary_limit: u64,
    pub wait_timeout: Duration,
    pub secondary_cooldown: Duration,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            primary_limit: 5000,
            wait_timeout: Duration::from_secs(15 * 60),
            secondary_cooldown: Duration::from_secs(60),
        }
    }
}

/// Process-wide view of the remote API quota.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateBudget {
    pub limit: u64,
    pub remaining: u64,
    /// When the primary window resets. `None` until the API reports it.
    pub reset_at: Option<Instant>,
    /// Secondary-limit cooldown; blocks every caller until it passes.
    pub cooldown_until: Option<Instant>,
    /// Set when a response reports zero remaining quota; blocks every request
    /// until the reported reset.
    pub exhausted_until: Option<Instant>,
}

impl RateBudget {
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            remaining: limit,
            reset_at: None,
            cooldown_until: None,
            exhausted_until: None,
        }
    }

    /// The instant an active cooldown or reported exhaustion ends, if any.
    fn blocked_until(&mut self, now: Instant) -> Option<Instant> {
        if self.cooldown_until.is_some_and(|until| until <= now) {
            self.cooldown_until = None;
        }
        if self.exhausted_until.is_some_and(|until| until <= now) {
            self.exhausted_until = None;
        }
        match (self.cooldown_until, self.exhausted_until) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    fn check_open(&mut self, now: Instant) -> std::result::Result<(), Instant> {
        match self.blocked_until(now) {
            Some(until) => Err(until),
            None => Ok(()),
        }
    }

    /// Debit `cost` units, or return the instant at which to try again.
    fn try_debit(&mut self, cost: u64, now: Instant) -> std::result::Result<(), Instant> {
        self.check_open(now)?;

        // A single call can never need more than a whole window.
        let cost = cost.min(self.limit);

        if self.remaining >= cost {
            self.remaining -= cost;
            return Ok(());
        }

        match self.reset_at {
            Some(reset) if reset > now => Err(reset),
            _ => {
                // Window rolled over: assume a fresh quota until a response says otherwise.
                self.remaining = self.limit - cost;
                self.reset_at = Some(now + PRIMARY_WINDOW);
                Ok(())
            }
        }
    }
}

/// Shared rate limiter and backoff controller.
///
/// Callers debit an optimistic local estimate through [`RateLimiter::acquire`];
/// every API response then reports the authoritative numbers through
/// [`RateLimiter::report`], which always overrides the local estimate.
pub struct RateLimiter {
    budget: Mutex<RateBudget>,
    changed: Notify,
    settings: LimiterSettings,
    cancel: CancellationToken,
}

impl RateLimiter {
    pub fn new(settings: LimiterSettings, cancel: CancellationToken) -> Self {
        let budget = RateBudget::new(settings.primary_limit);
        Self::with_budget(budget, settings, cancel)
    }

    pub fn with_budget(
        budget: RateBudget,
        settings: LimiterSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            budget: Mutex::new(budget),
            changed: Notify::new(),
            settings,
            cancel,
        }
    }

    /// Block until `cost` units of quota are available, then debit them.
    ///
    /// Fails with `RateLimitTimeout` once the configured wait timeout elapses,
    /// or `PoolCancelled` if the run is cancelled while waiting.
    pub async fn acquire(&self, cost: u64) -> Result<()> {
        self.wait_until(cost, |budget, now| budget.try_debit(cost, now))
            .await
    }

    /// Gate for a single request: wait out a secondary-limit cooldown or a
    /// quota a response reported as exhausted. Debits nothing.
    pub async fn wait_for_quota(&self) -> Result<()> {
        self.wait_until(0, |budget, now| budget.check_open(now)).await
    }

    async fn wait_until<F>(&self, cost: u64, mut ready: F) -> Result<()>
    where
        F: FnMut(&mut RateBudget, Instant) -> std::result::Result<(), Instant>,
    {
        let started = Instant::now();
        let deadline = started + self.settings.wait_timeout;

        loop {
            // Register for wakeups before inspecting state so a concurrent report is not missed.
            let notified = self.changed.notified();

            let now = Instant::now();
            let outcome = {
                let mut budget = self.budget.lock().await;
                ready(&mut *budget, now)
            };
            let retry_at = match outcome {
                Ok(()) => {
                    if now > started {
                        tracing::debug!(
                            cost,
                            waited_ms = (now - started).as_millis() as u64,
                            "Acquired API quota after waiting"
                        );
                    }
                    return Ok(());
                }
                Err(at) => at,
            };

            if now >= deadline {
                return Err(AppError::RateLimitTimeout(format!(
                    "no quota for {cost} call(s) within {}s",
                    self.settings.wait_timeout.as_secs()
                )));
            }

            tracing::debug!(
                cost,
                wait_ms = (retry_at - now).as_millis() as u64,
                "Waiting for API quota"
            );

            tokio::select! {
                _ = sleep_until(retry_at.min(deadline)) => {}
                _ = notified => {}
                _ = self.cancel.cancelled() => return Err(AppError::PoolCancelled),
            }
        }
    }

    /// Apply the quota numbers reported by an API response.
    pub async fn report(&self, info: &RateLimitInfo) {
        if info.is_empty() {
            return;
        }

        let now = Instant::now();
        {
            let mut budget = self.budget.lock().await;

            if let Some(limit) = info.limit {
                budget.limit = limit;
            }
            if let Some(remaining) = info.remaining {
                if remaining != budget.remaining {
                    tracing::trace!(
                        local = budget.remaining,
                        reported = remaining,
                        "Correcting local quota estimate"
                    );
                }
                budget.remaining = remaining;
            }
            if let Some(epoch) = info.reset_epoch {
                budget.reset_at = Some(instant_from_epoch(epoch, now));
            }
            match info.remaining {
                Some(0) => {
                    let until = budget.reset_at.unwrap_or(now + PRIMARY_WINDOW);
                    budget.exhausted_until = Some(until);
                    tracing::warn!(
                        wait_secs = until.saturating_duration_since(now).as_secs(),
                        "Primary rate limit exhausted, pausing requests until reset"
                    );
                }
                Some(_) => budget.exhausted_until = None,
                None => {}
            }

            if info.secondary || info.retry_after.is_some() {
                let cooldown = info.retry_after.unwrap_or(self.settings.secondary_cooldown);
                let until = now + cooldown;
                if budget.cooldown_until.map_or(true, |existing| until > existing) {
                    budget.cooldown_until = Some(until);
                }
                tracing::warn!(
                    cooldown_secs = cooldown.as_secs(),
                    "Secondary rate limit hit, pausing all workers"
                );
            }
        }

        self.changed.notify_waiters();
    }

    /// Snapshot of the current budget.
    pub async fn budget(&self) -> RateBudget {
        self.budget.lock().await.clone()
    }
}

/// Convert a unix reset timestamp into a monotonic instant.
fn instant_from_epoch(epoch: i64, now: Instant) -> Instant {
    let delta = epoch - chrono::Utc::now().timestamp();
    if delta <= 0 {
        now
    } else {
        now + Duration::from_secs(delta as u64)
    }
}
