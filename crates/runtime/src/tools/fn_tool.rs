use super::{Concurrency, Tool, ToolContext, ToolError, ToolFuture};
use crate::model::ToolSpec;
use crate::rate_limit::RateLimitSpec;
use serde_json::Value;
use std::future::Future;

/// A tool backed by an async closure.
///
/// ```ignore
/// let echo = FnTool::new("echo", "Echo the input", json!({"type": "object"}), |input, _ctx| async move {
///     Ok(input)
/// })
/// .read_only();
/// ```
pub struct FnTool<F> {
    spec: ToolSpec,
    concurrency: Concurrency,
    rate_limit: Option<RateLimitSpec>,
    handler: F,
}

impl<F, Fut> FnTool<F>
where
    F: Fn(Value, ToolContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
{
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Value,
        handler: F,
    ) -> Self {
        Self {
            spec: ToolSpec::new(name, description, schema),
            concurrency: Concurrency::Mutating,
            rate_limit: None,
            handler,
        }
    }

    /// Mark the tool safe to run concurrently with other read-only calls.
    pub fn read_only(mut self) -> Self {
        self.concurrency = Concurrency::ReadOnly;
        self
    }

    pub fn with_rate_limit(mut self, spec: RateLimitSpec) -> Self {
        self.rate_limit = Some(spec);
        self
    }
}

impl<F, Fut> Tool for FnTool<F>
where
    F: Fn(Value, ToolContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
{
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    fn concurrency(&self) -> Concurrency {
        self.concurrency
    }

    fn rate_limit(&self) -> Option<RateLimitSpec> {
        self.rate_limit
    }

    fn call(&self, input: Value, ctx: ToolContext) -> ToolFuture<'_> {
        Box::pin((self.handler)(input, ctx))
    }
}
