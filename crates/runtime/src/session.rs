//! Streaming sessions: one top-level run with an ordered event feed.

use crate::agent::Agent;
use crate::invocation::Invocation;
use crate::model::{Backend, ToolOutcome};
use crate::runtime::AgentRuntime;
use crate::usage::{UsageSnapshot, UsageTracker};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use storage::{EventKind, RunId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info_span};

/// Progress of a run, in the order it happened.
///
/// A session ends with exactly one `FinalAnswer` or `Error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum RunEvent {
    TextDelta {
        text: String,
    },
    ToolCallStarted {
        call_id: String,
        tool_name: String,
        args: Value,
    },
    ToolCallFinished {
        call_id: String,
        outcome: ToolOutcome,
    },
    FinalAnswer {
        content: String,
    },
    Error {
        kind: String,
        message: String,
    },
}

impl RunEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::FinalAnswer { .. } | Self::Error { .. })
    }
}

impl From<&RunEvent> for EventKind {
    fn from(event: &RunEvent) -> Self {
        match event {
            RunEvent::TextDelta { text } => EventKind::TextDelta { text: text.clone() },
            RunEvent::ToolCallStarted {
                call_id,
                tool_name,
                args,
            } => EventKind::ToolCallStarted {
                call_id: call_id.clone(),
                tool_name: tool_name.clone(),
                args: args.clone(),
            },
            RunEvent::ToolCallFinished { call_id, outcome } => EventKind::ToolCallFinished {
                call_id: call_id.clone(),
                outcome: serde_json::to_value(outcome).unwrap_or_default(),
            },
            RunEvent::FinalAnswer { content } => EventKind::FinalAnswer {
                content: content.clone(),
            },
            RunEvent::Error { kind, message } => EventKind::Error {
                kind: kind.clone(),
                message: message.clone(),
            },
        }
    }
}

/// A running top-level invocation.
///
/// Dropping the session cancels the run.
pub struct StreamingSession {
    run_id: RunId,
    events: mpsc::Receiver<RunEvent>,
    cancel: CancellationToken,
    usage: Arc<UsageTracker>,
    finished: bool,
    task: JoinHandle<()>,
}

impl StreamingSession {
    /// Start `agent` on `input` in the background.
    ///
    /// Must be called within a Tokio runtime.
    pub fn start<B: Backend + 'static>(
        runtime: &AgentRuntime,
        agent: Arc<Agent<B>>,
        input: impl Into<String>,
    ) -> Self {
        let run_id = RunId::new();
        let input = input.into();
        let (tx, events) = mpsc::channel(runtime.config().event_buffer);
        let invocation = Invocation::with_events(runtime.config().token_budget, tx.clone());
        let cancel = invocation.cancellation().clone();
        let usage = Arc::clone(invocation.tracker());

        let span = info_span!("run", %run_id, agent = agent.name());
        let runtime = runtime.clone();
        let run = tokio::spawn(
            async move { runtime.run(&agent, &input, &invocation).await }.instrument(span),
        );

        let task = tokio::spawn(async move {
            let terminal = match run.await {
                Ok(Ok(output)) => RunEvent::FinalAnswer {
                    content: output.answer,
                },
                Ok(Err(e)) => RunEvent::Error {
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                },
                Err(e) => {
                    error!(%run_id, error = %e, "run task failed");
                    RunEvent::Error {
                        kind: "internal".to_string(),
                        message: e.to_string(),
                    }
                }
            };
            let _ = tx.send(terminal).await;
        });

        Self {
            run_id,
            events,
            cancel,
            usage,
            finished: false,
            task,
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// The next event, or `None` once the terminal event has been delivered.
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        if self.finished {
            return None;
        }
        let event = self.events.recv().await?;
        self.finished = event.is_terminal();
        Some(event)
    }

    /// Ask the run to stop. Events keep flowing until the terminal one.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A handle that cancels this run from elsewhere, e.g. a signal handler.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Live usage of the run, nested invocations included.
    pub fn usage(&self) -> UsageSnapshot {
        self.usage.snapshot()
    }

    /// Consume the session as a stream of events.
    ///
    /// The run is not cancelled when the stream is dropped.
    pub fn into_stream(mut self) -> ReceiverStream<RunEvent> {
        let (_, placeholder) = mpsc::channel(1);
        let events = std::mem::replace(&mut self.events, placeholder);
        self.finished = true;
        ReceiverStream::new(events)
    }
}

impl Drop for StreamingSession {
    fn drop(&mut self) {
        if !self.finished && !self.task.is_finished() {
            self.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for StreamingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingSession")
            .field("run_id", &self.run_id)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolError;
    use serde_json::json;

    #[test]
    fn events_serialize_in_stream_schema() {
        let event = RunEvent::ToolCallStarted {
            call_id: "c1".into(),
            tool_name: "search".into(),
            args: json!({"query": "rust"}),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "tool_call_started");
        assert_eq!(json["callId"], "c1");
        assert_eq!(json["toolName"], "search");
        assert!(json.get("tool_name").is_none());
        assert_eq!(serde_json::from_value::<RunEvent>(json).unwrap(), event);

        let event = RunEvent::ToolCallFinished {
            call_id: "c1".into(),
            outcome: ToolOutcome::Success { output: json!("hit") },
        };
        assert_eq!(serde_json::to_value(&event).unwrap()["callId"], "c1");

        let event = RunEvent::Error {
            kind: "cancelled".into(),
            message: "run cancelled".into(),
        };
        assert_eq!(serde_json::to_value(&event).unwrap()["type"], "error");
        assert!(event.is_terminal());
    }

    #[test]
    fn finished_event_maps_to_log_kind() {
        let event = RunEvent::ToolCallFinished {
            call_id: "c1".into(),
            outcome: ToolOutcome::Failure {
                error: ToolError::RateLimited("search".into()),
            },
        };
        let EventKind::ToolCallFinished { call_id, outcome } = EventKind::from(&event) else {
            panic!("wrong kind");
        };
        assert_eq!(call_id, "c1");
        assert_eq!(outcome["status"], "failure");
        assert_eq!(outcome["error"]["kind"], "rate_limited");
    }
}
