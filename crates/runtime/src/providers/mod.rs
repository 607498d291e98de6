//! Model provider adapters.
//!
//! Each provider implements [`Backend`](crate::Backend) for its API.

mod anthropic;

pub use anthropic::{AnthropicBackend, AnthropicBackendBuilder};
