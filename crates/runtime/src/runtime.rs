//! The agent loop.

use crate::agent::Agent;
use crate::config::RuntimeConfig;
use crate::executor::ToolExecutor;
use crate::invocation::Invocation;
use crate::model::{Backend, Message, ModelRequest, ToolCall, ToolResult};
use crate::session::RunEvent;
use crate::tools::{Concurrency, ToolContext, ToolError, ToolRegistry};
use crate::usage::UsageSnapshot;
use crate::{Error, Result};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A completed invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutput {
    pub answer: String,
    pub rounds: u32,
    /// Full conversation, ending with the final assistant message.
    pub messages: Vec<Message>,
    /// Run-wide usage when this invocation finished, descendants included.
    pub usage: UsageSnapshot,
}

struct Shared {
    config: RuntimeConfig,
    executor: ToolExecutor,
}

/// Drives agents through request/response rounds.
///
/// Cheap to clone; clones share configuration and rate-limit buckets.
#[derive(Clone)]
pub struct AgentRuntime {
    shared: Arc<Shared>,
}

impl AgentRuntime {
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        config.validate()?;
        let executor = ToolExecutor::new(&config);
        Ok(Self {
            shared: Arc::new(Shared { config, executor }),
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.shared.config
    }

    /// A new top-level invocation with its own usage and cancellation scope.
    pub fn root_invocation(&self) -> Invocation {
        Invocation::root(self.shared.config.token_budget)
    }

    /// Run `agent` as a top-level invocation without an event consumer.
    pub async fn execute<B: Backend>(&self, agent: &Agent<B>, input: &str) -> Result<RunOutput> {
        let invocation = self.root_invocation();
        self.run(agent, input, &invocation).await
    }

    /// Run `agent` on `input` within `invocation` until it answers or fails.
    pub async fn run<B: Backend>(
        &self,
        agent: &Agent<B>,
        input: &str,
        invocation: &Invocation,
    ) -> Result<RunOutput> {
        let max_rounds = self.shared.config.max_rounds;
        let specs = agent.tools().specs();
        let mut messages = vec![Message::user(input)];
        let mut rounds = 0;

        info!(agent = agent.name(), depth = invocation.depth(), "invocation started");

        loop {
            invocation.check()?;
            if rounds >= max_rounds {
                let error = Error::RoundLimitExceeded { max_rounds };
                invocation.abort(error.clone());
                return Err(error);
            }
            rounds += 1;
            debug!(agent = agent.name(), depth = invocation.depth(), round = rounds, "model round");

            let request = ModelRequest {
                system: agent.system_prompt(),
                messages: &messages,
                tools: &specs,
            };
            let response = tokio::select! {
                biased;
                _ = invocation.cancellation().cancelled() => {
                    return Err(invocation.abort_cause().cloned().unwrap_or(Error::Cancelled));
                }
                response = agent.model().call(request) => response?,
            };

            invocation.record(response.usage.input_tokens, response.usage.output_tokens, 0)?;

            let text = response.message.text();
            let calls = response.message.tool_calls();
            messages.push(response.message);

            if calls.is_empty() {
                let usage = invocation.usage();
                info!(
                    agent = agent.name(),
                    depth = invocation.depth(),
                    rounds,
                    tokens_in = usage.tokens_in,
                    tokens_out = usage.tokens_out,
                    tool_calls = usage.tool_calls,
                    "invocation finished"
                );
                return Ok(RunOutput {
                    answer: text,
                    rounds,
                    messages,
                    usage,
                });
            }

            if !text.is_empty() {
                invocation.emit(RunEvent::TextDelta { text }).await;
            }

            let results = self.dispatch_round(agent, &calls, invocation).await;
            if !results.is_empty() {
                messages.push(Message::tool_results(results));
            }
        }
    }

    /// Dispatch one round of calls and return results in issue order.
    ///
    /// Calls skipped because the run stopped get no result.
    async fn dispatch_round<B: Backend>(
        &self,
        agent: &Agent<B>,
        calls: &[ToolCall],
        invocation: &Invocation,
    ) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());

        for step in plan_steps(agent.tools(), calls) {
            let outcomes = match step {
                Step::Sequential(call) => vec![self.dispatch(agent, call, invocation).await],
                Step::Concurrent(batch) => {
                    let pending: Vec<_> = batch
                        .into_iter()
                        .map(|call| self.dispatch(agent, call, invocation))
                        .collect();
                    stream::iter(pending)
                        .buffered(self.shared.config.max_concurrency)
                        .collect::<Vec<_>>()
                        .await
                }
            };

            let mut stopped = false;
            for outcome in outcomes {
                match outcome {
                    Some(result) => {
                        invocation
                            .emit(RunEvent::ToolCallFinished {
                                call_id: result.tool_call_id.clone(),
                                outcome: result.outcome.clone(),
                            })
                            .await;
                        results.push(result);
                    }
                    None => stopped = true,
                }
            }
            if stopped {
                break;
            }
        }

        results
    }

    async fn dispatch<B: Backend>(
        &self,
        agent: &Agent<B>,
        call: &ToolCall,
        invocation: &Invocation,
    ) -> Option<ToolResult> {
        if invocation.check().is_err() {
            debug!(tool = %call.name, call_id = %call.id, "run stopped, call not dispatched");
            return None;
        }

        invocation
            .emit(RunEvent::ToolCallStarted {
                call_id: call.id.clone(),
                tool_name: call.name.clone(),
                args: call.input.clone(),
            })
            .await;

        let result = match agent.tools().lookup(&call.name) {
            Ok(tool) => {
                let ctx = ToolContext::new(&call.id, invocation.clone(), self.clone());
                self.shared.executor.execute(tool, call, ctx).await
            }
            Err(_) => {
                warn!(agent = agent.name(), tool = %call.name, "model requested unknown tool");
                ToolResult::failure(&call.id, ToolError::NotFound(call.name.clone()))
            }
        };
        Some(result)
    }
}

impl std::fmt::Debug for AgentRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRuntime")
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, PartialEq)]
enum Step<'a> {
    Sequential(&'a ToolCall),
    Concurrent(Vec<&'a ToolCall>),
}

/// Group a round's calls: consecutive read-only calls form one concurrent
/// batch, every mutating call is a step of its own.
///
/// Unknown tools count as read-only; they resolve to `NotFound` without
/// side effects.
fn plan_steps<'a>(tools: &ToolRegistry, calls: &'a [ToolCall]) -> Vec<Step<'a>> {
    let mut steps = Vec::new();
    let mut batch = Vec::new();

    for call in calls {
        let read_only = tools
            .lookup(&call.name)
            .map_or(true, |t| t.tool().concurrency() == Concurrency::ReadOnly);
        if read_only {
            batch.push(call);
            continue;
        }
        if !batch.is_empty() {
            steps.push(Step::Concurrent(std::mem::take(&mut batch)));
        }
        steps.push(Step::Sequential(call));
    }
    if !batch.is_empty() {
        steps.push(Step::Concurrent(batch));
    }

    steps
}
