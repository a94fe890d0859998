//! Shared rate limiting for outbound collaborator calls.
//!
//! A gate combines a token bucket, a concurrency bound and a cool-down
//! window shared by every caller. A rate-limit signal from the remote side
//! pushes the window out, so all later calls through the same gate wait
//! before trying again instead of hammering the provider.

use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::RateLimitConfig;
use crate::error::PipelineError;

const MAX_BACKOFF: Duration = Duration::from_secs(120);
const MAX_RETRY_AFTER: Duration = Duration::from_secs(600);

pub struct RateGate {
    name: String,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    permits: Semaphore,
    cooldown_until: Mutex<Option<Instant>>,
    backoff: Mutex<ExponentialBackoff>,
    retries: u32,
    timeout: Duration,
}

impl RateGate {
    #[must_use]
    pub fn new(name: &str, config: &RateLimitConfig) -> Arc<Self> {
        let rps = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_second(rps).allow_burst(rps);

        Arc::new(Self {
            name: name.to_string(),
            limiter: RateLimiter::direct(quota),
            permits: Semaphore::new(config.max_concurrent.max(1)),
            cooldown_until: Mutex::new(None),
            backoff: Mutex::new(new_backoff(Duration::from_secs(
                config.initial_backoff_seconds.max(1),
            ))),
            retries: config.retries,
            timeout: Duration::from_secs(config.request_timeout_seconds.max(1)),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs `operation` under the gate, retrying transient failures.
    ///
    /// Every attempt waits for the shared cool-down, a token and a permit,
    /// and is cut off after the configured timeout. Once retries run out the
    /// last transient error is returned for the caller to absorb.
    pub async fn run<T, F, Fut>(&self, operation: F) -> Result<T, PipelineError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.wait_for_cooldown().await;
            self.limiter.until_ready().await;

            let result = {
                let _permit = self
                    .permits
                    .acquire()
                    .await
                    .map_err(|e| PipelineError::transient(&self.name, e.to_string()))?;
                match tokio::time::timeout(self.timeout, operation()).await {
                    Ok(result) => result,
                    Err(_) => Err(PipelineError::transient(&self.name, "request timed out")),
                }
            };

            match result {
                Ok(value) => {
                    self.backoff.lock().await.reset();
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt <= self.retries => {
                    let delay = self.push_cooldown(e.retry_after()).await;
                    warn!(
                        service = %self.name,
                        attempt,
                        error = %e,
                        retry_in_ms = delay.as_millis(),
                        "Call failed, backing off"
                    );
                }
                Err(e) => {
                    if e.is_retryable() {
                        // Later callers still honour the window even though this one stops.
                        self.push_cooldown(e.retry_after()).await;
                        warn!(service = %self.name, attempts = attempt, error = %e, "Giving up after retries");
                    }
                    return Err(e);
                }
            }
        }
    }

    async fn wait_for_cooldown(&self) {
        let until = *self.cooldown_until.lock().await;
        if let Some(until) = until
            && until > Instant::now()
        {
            debug!(service = %self.name, "Waiting out cool-down window");
            tokio::time::sleep_until(until).await;
        }
    }

    /// Extends the shared window and returns the wait applied.
    ///
    /// A cool-down named by the provider wins over the next backoff step.
    /// The window only ever moves forward.
    async fn push_cooldown(&self, requested: Option<Duration>) -> Duration {
        let delay = match requested {
            Some(wait) => wait.min(MAX_RETRY_AFTER),
            None => self
                .backoff
                .lock()
                .await
                .next_backoff()
                .unwrap_or(MAX_BACKOFF),
        };
        let mut until = self.cooldown_until.lock().await;
        let candidate = Instant::now() + delay;
        if until.is_none_or(|current| current < candidate) {
            *until = Some(candidate);
        }
        delay
    }
}

fn new_backoff(initial: Duration) -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: initial,
        max_interval: MAX_BACKOFF,
        multiplier: 2.0,
        randomization_factor: 0.0,
        max_elapsed_time: None,
        ..Default::default()
    }
}
