//! Nested agents exposed as tools.

use crate::agent::Agent;
use crate::model::{Backend, ToolSpec};
use crate::tools::{Concurrency, Tool, ToolContext, ToolError, ToolFuture};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::warn;

/// A tool that runs a nested agent on a delegated task.
///
/// The child invocation is one level deeper than the caller and shares its
/// usage tracker and cancellation signal. The tool takes `{"task": string}`
/// and returns the child's final answer as a string.
pub struct SubAgentInvoker<B> {
    agent: Arc<Agent<B>>,
    spec: ToolSpec,
    concurrency: Concurrency,
}

impl<B: Backend> SubAgentInvoker<B> {
    pub fn new(agent: Arc<Agent<B>>) -> Self {
        let spec = ToolSpec::new(
            agent.name(),
            agent.description(),
            json!({
                "type": "object",
                "properties": {
                    "task": {
                        "type": "string",
                        "description": "The task to delegate"
                    }
                },
                "required": ["task"]
            }),
        );
        Self {
            agent,
            spec,
            concurrency: Concurrency::Mutating,
        }
    }

    /// Allow several delegations to this agent in one round to run at once.
    pub fn read_only(mut self) -> Self {
        self.concurrency = Concurrency::ReadOnly;
        self
    }

    pub fn agent(&self) -> &Arc<Agent<B>> {
        &self.agent
    }

    async fn delegate(&self, input: Value, ctx: ToolContext) -> Result<Value, ToolError> {
        let max_depth = ctx.runtime().config().max_depth;
        let child = ctx.invocation().child(max_depth).inspect_err(|e| {
            warn!(agent = self.agent.name(), %e, "refusing nested invocation");
        })?;

        let task = input
            .get("task")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::Schema("task must be a string".into()))?;

        match ctx.runtime().run(&self.agent, task, &child).await {
            Ok(output) => Ok(Value::String(output.answer)),
            Err(error) if error.is_fatal() => {
                child.abort(error.clone());
                Err(ToolError::Aborted(error.to_string()))
            }
            Err(error) => Err(ToolError::Execution(format!(
                "sub-agent {} failed: {error}",
                self.agent.name()
            ))),
        }
    }
}

impl<B: Backend + 'static> Tool for SubAgentInvoker<B> {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    fn concurrency(&self) -> Concurrency {
        self.concurrency
    }

    fn call(&self, input: Value, ctx: ToolContext) -> ToolFuture<'_> {
        Box::pin(self.delegate(input, ctx))
    }
}
