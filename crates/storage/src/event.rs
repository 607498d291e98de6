//! Event types for the run log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A unique identifier for a top-level run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of event that occurred during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    /// A top-level run started.
    RunStart { agent: String, input: String },
    /// The model produced text.
    TextDelta { text: String },
    /// A tool call was dispatched.
    ToolCallStarted {
        call_id: String,
        tool_name: String,
        args: Value,
    },
    /// A dispatched tool call resolved.
    ToolCallFinished { call_id: String, outcome: Value },
    /// The run produced its final answer.
    FinalAnswer { content: String },
    /// The run terminated with an error.
    Error { kind: String, message: String },
    /// The run ended; carries the final usage.
    RunEnd {
        tokens_in: u64,
        tokens_out: u64,
        tool_calls: u64,
    },
}

impl EventKind {
    /// Stable name used for filtering.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RunStart { .. } => "run_start",
            Self::TextDelta { .. } => "text_delta",
            Self::ToolCallStarted { .. } => "tool_call_started",
            Self::ToolCallFinished { .. } => "tool_call_finished",
            Self::FinalAnswer { .. } => "final_answer",
            Self::Error { .. } => "error",
            Self::RunEnd { .. } => "run_end",
        }
    }
}

/// An event in the run log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub run_id: RunId,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

impl Event {
    pub fn new(run_id: RunId, kind: EventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id,
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn run_start(run_id: RunId, agent: impl Into<String>, input: impl Into<String>) -> Self {
        Self::new(
            run_id,
            EventKind::RunStart {
                agent: agent.into(),
                input: input.into(),
            },
        )
    }
}
