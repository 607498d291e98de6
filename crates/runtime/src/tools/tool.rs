//! The tool contract.

use crate::invocation::Invocation;
use crate::model::ToolSpec;
use crate::rate_limit::RateLimitSpec;
use crate::runtime::AgentRuntime;
use crate::tools::ToolError;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by [`Tool::call`].
///
/// Boxed rather than `impl Future` so tools can live behind `dyn Tool`.
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + 'a>>;

/// Whether calls of a tool may overlap within one round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Concurrency {
    /// Idempotent and free of side effects; may run alongside other read-only calls.
    ReadOnly,
    /// Runs alone, in the order the model requested it.
    #[default]
    Mutating,
}

/// A named capability an agent can call.
///
/// Handlers return data or a [`ToolError`]; neither unwinds the agent loop.
pub trait Tool: Send + Sync {
    fn spec(&self) -> &ToolSpec;

    fn concurrency(&self) -> Concurrency {
        Concurrency::Mutating
    }

    /// Bucket for this tool; `None` falls back to the runtime default.
    fn rate_limit(&self) -> Option<RateLimitSpec> {
        None
    }

    fn call(&self, input: Value, ctx: ToolContext) -> ToolFuture<'_>;
}

/// What a handler sees of the run that called it.
#[derive(Clone)]
pub struct ToolContext {
    call_id: String,
    invocation: Invocation,
    runtime: AgentRuntime,
}

impl ToolContext {
    pub(crate) fn new(call_id: impl Into<String>, invocation: Invocation, runtime: AgentRuntime) -> Self {
        Self {
            call_id: call_id.into(),
            invocation,
            runtime,
        }
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    /// The invocation that dispatched this call.
    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    pub fn runtime(&self) -> &AgentRuntime {
        &self.runtime
    }

    pub fn is_cancelled(&self) -> bool {
        self.invocation.is_cancelled()
    }

    /// Record tokens the handler consumed on its own, e.g. through a
    /// summarizing model call.
    ///
    /// Crossing the run's budget aborts the run and fails with `Aborted`.
    pub fn report_usage(&self, tokens_in: u64, tokens_out: u64) -> Result<(), ToolError> {
        self.invocation
            .record(tokens_in, tokens_out, 0)
            .map(|_| ())
            .map_err(|e| ToolError::Aborted(e.to_string()))
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("call_id", &self.call_id)
            .field("depth", &self.invocation.depth())
            .finish_non_exhaustive()
    }
}
