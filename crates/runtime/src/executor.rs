//! Validation, admission control and retries around a single tool call.

use crate::config::RuntimeConfig;
use crate::model::{ToolCall, ToolResult};
use crate::rate_limit::RateLimiters;
use crate::retry::RetryPolicy;
use crate::tools::{RegisteredTool, ToolContext, ToolError};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Runs tool calls and folds every outcome into a [`ToolResult`].
///
/// Owned by the runtime, so rate-limit buckets are shared by every
/// invocation at every depth.
pub struct ToolExecutor {
    retry: RetryPolicy,
    limiters: RateLimiters,
    admission_wait: Duration,
    grace: Duration,
}

impl ToolExecutor {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            retry: RetryPolicy::new(config.retry),
            limiters: RateLimiters::new(config.rate_limit),
            admission_wait: config.rate_limit_wait(),
            grace: config.grace_period(),
        }
    }

    /// Execute one call. Never fails: errors become failure results.
    pub async fn execute(&self, tool: &RegisteredTool, call: &ToolCall, ctx: ToolContext) -> ToolResult {
        match self.run(tool, call, ctx).await {
            Ok(output) => ToolResult::success(&call.id, output),
            Err(error) => {
                debug!(tool = %call.name, call_id = %call.id, kind = error.kind(), %error, "tool call failed");
                ToolResult::failure(&call.id, error)
            }
        }
    }

    async fn run(&self, tool: &RegisteredTool, call: &ToolCall, ctx: ToolContext) -> Result<Value, ToolError> {
        tool.validate(&call.input)?;

        let limiter = self
            .limiters
            .limiter_for(&call.name, tool.tool().rate_limit())
            .map_err(|e| ToolError::Execution(e.to_string()))?;

        // Counted once, on first admission; retries are not extra calls.
        let counted = AtomicBool::new(false);
        let cancel = ctx.invocation().cancellation().clone();
        self.retry
            .run(&call.name, &cancel, |attempt| {
                let limiter = limiter.clone();
                let ctx = ctx.clone();
                let cancel = cancel.clone();
                let counted = &counted;
                async move {
                    if let Some(limiter) = &limiter {
                        limiter.acquire(self.admission_wait, &cancel).await?;
                    }
                    if !counted.swap(true, Ordering::Relaxed) {
                        ctx.invocation()
                            .record(0, 0, 1)
                            .map_err(|e| ToolError::Aborted(e.to_string()))?;
                    }
                    debug!(tool = %call.name, call_id = %call.id, attempt, "invoking tool");
                    self.invoke(tool, call, ctx).await
                }
            })
            .await
    }

    /// Run the handler; after cancellation it gets the grace period to finish.
    async fn invoke(&self, tool: &RegisteredTool, call: &ToolCall, ctx: ToolContext) -> Result<Value, ToolError> {
        let cancel = ctx.invocation().cancellation().clone();
        let mut handler = tool.tool().call(call.input.clone(), ctx);

        tokio::select! {
            biased;
            result = &mut handler => result,
            _ = cancel.cancelled() => {
                match tokio::time::timeout(self.grace, &mut handler).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(tool = %call.name, call_id = %call.id, "tool did not finish within grace period");
                        Err(ToolError::Cancelled(format!(
                            "{} interrupted after {}ms grace period",
                            call.name,
                            self.grace.as_millis()
                        )))
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for ToolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolExecutor")
            .field("retry", &self.retry)
            .field("admission_wait", &self.admission_wait)
            .field("grace", &self.grace)
            .finish_non_exhaustive()
    }
}
