#![allow(dead_code)]

use runtime::{
    Agent, AgentRuntime, Backend, Message, ModelError, ModelRequest, ModelResponse, Part, Role,
    RuntimeConfig, Tool, ToolCall, ToolRegistry, ToolResult, Usage,
};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A backend that replays canned responses, then answers with a fallback.
pub struct ScriptedBackend {
    responses: Mutex<VecDeque<Result<ModelResponse, ModelError>>>,
    seen: Mutex<Vec<Vec<Message>>>,
    requests: AtomicUsize,
    fallback: String,
}

impl ScriptedBackend {
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            seen: Mutex::new(Vec::new()),
            requests: AtomicUsize::new(0),
            fallback: fallback.into(),
        }
    }

    pub fn then(self, message: Message) -> Self {
        self.then_with_usage(message, 0, 0)
    }

    pub fn then_with_usage(self, message: Message, input_tokens: u64, output_tokens: u64) -> Self {
        self.responses.lock().unwrap().push_back(Ok(ModelResponse {
            message,
            usage: Usage {
                input_tokens,
                output_tokens,
            },
        }));
        self
    }

    pub fn then_error(self, error: ModelError) -> Self {
        self.responses.lock().unwrap().push_back(Err(error));
        self
    }

    /// Number of model rounds served.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Conversation as sent on each request.
    pub fn seen(&self) -> Vec<Vec<Message>> {
        self.seen.lock().unwrap().clone()
    }

    /// Tool results in the latest conversation the backend was shown.
    pub fn tool_results(&self) -> Vec<ToolResult> {
        let seen = self.seen();
        let Some(last) = seen.last() else {
            return Vec::new();
        };
        tool_results(last)
    }
}

impl Backend for ScriptedBackend {
    async fn call(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(request.messages.to_vec());

        let next = self.responses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| {
            Ok(ModelResponse {
                message: Message::assistant(self.fallback.clone()),
                usage: Usage::default(),
            })
        })
    }
}

/// An assistant message requesting `calls`, given as (id, tool, input).
pub fn calls(calls: &[(&str, &str, Value)]) -> Message {
    Message::from_parts(
        Role::Assistant,
        calls
            .iter()
            .map(|(id, name, input)| Part::ToolCall(ToolCall::new(*id, *name, input.clone())))
            .collect(),
    )
}

pub fn tool_results(messages: &[Message]) -> Vec<ToolResult> {
    messages
        .iter()
        .flat_map(|m| &m.parts)
        .filter_map(|part| match part {
            Part::ToolResult(result) => Some(result.clone()),
            _ => None,
        })
        .collect()
}

pub fn tool(tool: impl Tool + 'static) -> Arc<dyn Tool> {
    Arc::new(tool)
}

pub fn agent(
    name: &str,
    backend: Arc<ScriptedBackend>,
    tools: Vec<Arc<dyn Tool>>,
) -> Arc<Agent<ScriptedBackend>> {
    let mut registry = ToolRegistry::new();
    for tool in tools {
        registry.register(tool).unwrap();
    }
    Arc::new(
        Agent::builder(name, backend)
            .description(format!("{name} agent"))
            .tools(registry)
            .build(),
    )
}

/// Defaults with millisecond-scale retry delays.
pub fn fast_config() -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 5;
    config
}

pub fn runtime(config: RuntimeConfig) -> AgentRuntime {
    AgentRuntime::new(config).unwrap()
}

/// Tracks how many calls are in flight and the most ever observed.
#[derive(Default)]
pub struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
    total: AtomicUsize,
}

impl InFlight {
    pub fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::SeqCst);
    }

    pub fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}
