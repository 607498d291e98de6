//! Tiller runtime: agents that call tools, including other agents.
//!
//! A primary agent talks to a model in rounds. Each round the model either
//! answers or asks for tool calls; the runtime executes those calls and feeds
//! the results back. A tool may itself be a nested agent, so one top-level
//! run becomes a tree of invocations that share a usage budget and a
//! cancellation signal.
//!
//! # Overview
//!
//! - [`Backend`]: the model oracle. [`AnthropicBackend`] is one adapter.
//! - [`Tool`] / [`ToolRegistry`]: named, schema-validated capabilities.
//!   [`FnTool`] wraps an async closure.
//! - [`Agent`]: system prompt, model and tool registry.
//! - [`AgentRuntime`]: the round loop, with schema validation, rate limits,
//!   retries and bounded fan-out applied to every call.
//! - [`SubAgentInvoker`]: exposes an [`Agent`] as a tool one level deeper.
//! - [`StreamingSession`]: a top-level run with an ordered [`RunEvent`] feed
//!   and consumer-side cancellation.
//!
//! Tool failures are data: they come back to the model as failed
//! [`ToolResult`]s. Only run-level errors ([`Error`]) end a run.
//!
//! # Example
//!
//! ```ignore
//! use runtime::{Agent, AgentRuntime, AnthropicBackend, FnTool, RuntimeConfig, StreamingSession, ToolRegistry};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> runtime::Result<()> {
//! let model = Arc::new(AnthropicBackend::builder("sk-ant-...", "claude-sonnet-4-20250514").build());
//!
//! let clock = FnTool::new("current_time", "Current UTC time", json!({"type": "object"}), |_, _| async {
//!     Ok(json!("2025-01-01T00:00:00Z"))
//! })
//! .read_only();
//!
//! let mut tools = ToolRegistry::new();
//! tools.register(Arc::new(clock))?;
//!
//! let agent = Arc::new(Agent::builder("primary", model).tools(tools).build());
//! let runtime = AgentRuntime::new(RuntimeConfig::default())?;
//!
//! let mut session = StreamingSession::start(&runtime, agent, "What time is it?");
//! while let Some(event) = session.next_event().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

mod agent;
mod config;
mod error;
mod executor;
mod invocation;
pub mod model;
mod providers;
mod rate_limit;
mod retry;
mod runtime;
mod session;
mod subagent;
pub mod tools;
mod usage;

pub use agent::{Agent, AgentBuilder};
pub use config::RuntimeConfig;
pub use error::{Error, Result};
pub use executor::ToolExecutor;
pub use invocation::Invocation;
pub use model::{
    Backend, Message, ModelError, ModelRequest, ModelResponse, Part, Role, ToolCall, ToolOutcome,
    ToolResult, ToolSpec, Usage,
};
pub use providers::{AnthropicBackend, AnthropicBackendBuilder};
pub use rate_limit::{RateLimitSpec, RateLimiter, RateLimiters};
pub use retry::{RetryConfig, RetryPolicy};
pub use runtime::{AgentRuntime, RunOutput};
pub use session::{RunEvent, StreamingSession};
pub use subagent::SubAgentInvoker;
pub use tools::{
    Concurrency, FnTool, RegisteredTool, RegistryError, Tool, ToolContext, ToolError, ToolFuture,
    ToolRegistry,
};
pub use usage::{UsageSnapshot, UsageTracker};
