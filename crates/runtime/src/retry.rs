//! Retry with exponential backoff and jitter.

use crate::tools::ToolError;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts including the first one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Fraction of each delay that is randomized, in `[0, 1]`.
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
            jitter: 0.5,
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(Error::Config("retry.jitter must be within [0, 1]".into()));
        }
        Ok(())
    }
}

/// Retries transient tool failures; everything else returns immediately.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// Delay to sleep after failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let delay = self
            .config
            .base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.config.max_delay_ms);

        let spread = delay as f64 * self.config.jitter.clamp(0.0, 1.0);
        let jittered = delay as f64 - spread * rand::random::<f64>();
        Duration::from_millis(jittered.max(0.0) as u64)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `op` receives the 1-based attempt number. The last error is returned
    /// on exhaustion. Backoff sleeps end early with `Cancelled` if `cancel`
    /// fires.
    pub async fn run<T, F, Fut>(
        &self,
        tool: &str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> std::result::Result<T, ToolError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = std::result::Result<T, ToolError>>,
    {
        let mut attempt = 1;
        loop {
            let error = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !error.is_transient() || attempt >= self.max_attempts() {
                return Err(error);
            }

            let delay = self.backoff(attempt);
            warn!(
                tool,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "transient tool failure, retrying"
            );
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(ToolError::Cancelled(format!("cancelled while retrying {tool}")));
                }
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}
