//! Per-tool token buckets.

use crate::tools::ToolError;
use crate::{Error, Result};
use governor::{
    DefaultDirectRateLimiter, Quota, RateLimiter as Governor,
    clock::{Clock, DefaultClock},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Token bucket shape: burst capacity and steady refill rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitSpec {
    pub capacity: u32,
    pub refill_per_sec: f64,
}

impl RateLimitSpec {
    pub fn new(capacity: u32, refill_per_sec: f64) -> Self {
        Self {
            capacity,
            refill_per_sec,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::Config("rate limit capacity must be at least 1".into()));
        }
        if !self.refill_per_sec.is_finite() || self.refill_per_sec <= 0.0 {
            return Err(Error::Config(
                "rate limit refill_per_sec must be a positive number".into(),
            ));
        }
        self.period().map(|_| ())
    }

    /// Time to refill one token.
    fn period(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(1.0 / self.refill_per_sec).map_err(|_| {
            Error::Config(format!(
                "rate limit refill_per_sec {} is too small",
                self.refill_per_sec
            ))
        })
    }

    fn quota(&self) -> Result<Quota> {
        self.validate()?;
        let period = self.period()?;
        let burst = NonZeroU32::new(self.capacity)
            .ok_or_else(|| Error::Config("rate limit capacity must be at least 1".into()))?;
        let quota = Quota::with_period(period)
            .ok_or_else(|| Error::Config("rate limit refill period rounds to zero".into()))?;
        Ok(quota.allow_burst(burst))
    }
}

/// Admission control for one tool, shared by every caller of that tool.
pub struct RateLimiter {
    tool: String,
    limiter: DefaultDirectRateLimiter,
}

impl RateLimiter {
    pub fn new(tool: impl Into<String>, spec: RateLimitSpec) -> Result<Self> {
        Ok(Self {
            tool: tool.into(),
            limiter: Governor::direct(spec.quota()?),
        })
    }

    /// Take a token now, or report how long until one is available.
    pub fn try_acquire(&self) -> std::result::Result<(), Duration> {
        self.limiter
            .check()
            .map_err(|not_until| not_until.wait_time_from(DefaultClock::default().now()))
    }

    /// Take a token, waiting at most `max_wait` for the bucket to refill.
    ///
    /// Fails with `RateLimited` when the wait would be longer, and with
    /// `Cancelled` if the run is cancelled while waiting.
    pub async fn acquire(
        &self,
        max_wait: Duration,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), ToolError> {
        let mut waited = Duration::ZERO;
        loop {
            let wait = match self.try_acquire() {
                Ok(()) => return Ok(()),
                Err(wait) => wait,
            };

            if waited + wait > max_wait {
                return Err(ToolError::RateLimited(format!(
                    "{} has no capacity for another {}ms",
                    self.tool,
                    wait.as_millis()
                )));
            }

            debug!(tool = %self.tool, wait_ms = wait.as_millis() as u64, "waiting for rate limit");
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(ToolError::Cancelled(format!(
                        "cancelled while waiting for {} rate limit",
                        self.tool
                    )));
                }
                _ = tokio::time::sleep(wait) => {}
            }
            waited += wait;
        }
    }
}

/// Buckets keyed by tool name, created on first use.
///
/// One pool lives in the runtime, so a tool registered at several depths
/// still draws from a single bucket.
pub struct RateLimiters {
    default_spec: Option<RateLimitSpec>,
    buckets: Mutex<HashMap<String, Arc<RateLimiter>>>,
}

impl RateLimiters {
    pub fn new(default_spec: Option<RateLimitSpec>) -> Self {
        Self {
            default_spec,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// The bucket for `tool`, or `None` when neither the tool nor the
    /// configuration asks for rate limiting.
    pub fn limiter_for(
        &self,
        tool: &str,
        spec: Option<RateLimitSpec>,
    ) -> Result<Option<Arc<RateLimiter>>> {
        let Some(spec) = spec.or(self.default_spec) else {
            return Ok(None);
        };

        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(limiter) = buckets.get(tool) {
            return Ok(Some(Arc::clone(limiter)));
        }
        let limiter = Arc::new(RateLimiter::new(tool, spec)?);
        buckets.insert(tool.to_string(), Arc::clone(&limiter));
        Ok(Some(limiter))
    }
}
