use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Health checker trait for services
#[async_trait]
pub trait HealthChecker: Send + Sync {
    /// Check if the service is healthy
    async fn check(&self) -> Result<bool>;

    /// Per-attempt timeout
    fn timeout(&self) -> Duration;
}

/// Exponential retry delays: `initial`, doubling, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(250),
            max: Duration::from_secs(5),
        }
    }
}

impl Backoff {
    pub fn delays(self) -> impl Iterator<Item = Duration> {
        std::iter::successors(Some(self.initial), move |delay| {
            Some(std::cmp::min(delay.saturating_mul(2), self.max))
        })
    }
}

/// Poll `checker` until it reports healthy.
///
/// Returns `false` only when `cancel` fires first; there is no attempt
/// limit, callers bound the wait themselves.
pub async fn poll_until_healthy<C: HealthChecker + ?Sized>(
    checker: &C,
    backoff: Backoff,
    cancel: &CancellationToken,
) -> bool {
    for delay in backoff.delays() {
        let healthy = tokio::select! {
            result = checker.check() => matches!(result, Ok(true)),
            _ = cancel.cancelled() => return false,
        };
        if healthy {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => return false,
        }
    }
    false
}
