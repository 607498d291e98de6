//! Process-wide runtime configuration.

use crate::rate_limit::RateLimitSpec;
use crate::retry::RetryConfig;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Limits and policies shared by every run of an [`AgentRuntime`](crate::AgentRuntime).
///
/// Set once at start-up; every field has a default so a partial TOML table
/// deserializes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Rounds one invocation may take before failing with `RoundLimitExceeded`.
    pub max_rounds: u32,
    /// Deepest allowed nesting of sub-agent invocations (the top level is 0).
    pub max_depth: u32,
    /// Ceiling on tokens in + out for a whole run, descendants included.
    pub token_budget: Option<u64>,
    /// Bucket applied to tools that do not declare their own.
    pub rate_limit: Option<RateLimitSpec>,
    /// Longest a caller waits for a rate-limit token before the attempt fails.
    pub rate_limit_wait_ms: u64,
    pub retry: RetryConfig,
    /// Read-only calls of one round that may run at the same time.
    pub max_concurrency: usize,
    /// Time in-flight calls get to unwind after cancellation.
    pub grace_period_ms: u64,
    /// Capacity of the streaming event channel.
    pub event_buffer: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_rounds: 16,
            max_depth: 3,
            token_budget: None,
            rate_limit: None,
            rate_limit_wait_ms: 1_000,
            retry: RetryConfig::default(),
            max_concurrency: 8,
            grace_period_ms: 2_000,
            event_buffer: 64,
        }
    }
}

impl RuntimeConfig {
    /// Reject settings the runtime cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.max_rounds == 0 {
            return Err(Error::Config("max_rounds must be at least 1".into()));
        }
        if self.max_concurrency == 0 {
            return Err(Error::Config("max_concurrency must be at least 1".into()));
        }
        if self.event_buffer == 0 {
            return Err(Error::Config("event_buffer must be at least 1".into()));
        }
        if let Some(spec) = &self.rate_limit {
            spec.validate()?;
        }
        self.retry.validate()
    }

    pub fn rate_limit_wait(&self) -> Duration {
        Duration::from_millis(self.rate_limit_wait_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RuntimeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_depth, 3);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: RuntimeConfig = serde_json::from_str(
            r#"{"max_rounds": 4, "rate_limit": {"capacity": 2, "refill_per_sec": 0.5}}"#,
        )
        .unwrap();
        assert_eq!(config.max_rounds, 4);
        assert_eq!(config.max_depth, 3);
        assert_eq!(config.rate_limit, Some(RateLimitSpec::new(2, 0.5)));
    }

    #[test]
    fn rejects_zero_rounds() {
        let config = RuntimeConfig {
            max_rounds: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn rejects_bad_bucket() {
        let config = RuntimeConfig {
            rate_limit: Some(RateLimitSpec::new(0, 1.0)),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_refill_too_slow_to_represent() {
        let config = RuntimeConfig {
            rate_limit: Some(RateLimitSpec::new(1, 1e-30)),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
