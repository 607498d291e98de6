//! SQLite-backed event log for Tiller runs.
//!
//! Every top-level run streams progress events (text, tool calls, tool
//! results, the final answer or error). This crate persists them so a run can
//! be inspected after the fact.
//!
//! # Core Concepts
//!
//! - [`EventStore`] wraps a SQLite database; append events and query runs.
//! - [`Event`] is one recorded event: id, run id, timestamp, [`EventKind`].
//! - [`RunId`] identifies one top-level run (including all nested agent
//!   invocations beneath it).
//!
//! # Example
//!
//! ```no_run
//! use storage::{Event, EventKind, EventStore, RunId};
//!
//! let store = EventStore::open("events.db")?;
//! let run_id = RunId::new();
//! store.append(&Event::run_start(run_id, "primary", "Summarize the inbox"))?;
//! store.append(&Event::new(run_id, EventKind::FinalAnswer { content: "Done".into() }))?;
//!
//! for summary in store.list_runs()? {
//!     println!("{}: {} tool calls", summary.id, summary.tool_calls);
//! }
//! # Ok::<(), storage::Error>(())
//! ```

mod error;
mod event;
mod store;

pub use error::{Error, Result};
pub use event::{Event, EventKind, RunId};
pub use store::{EventStore, RunOutcome, RunSummary};
