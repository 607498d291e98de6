use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tool-local failures.
///
/// These never unwind the agent loop: the executor folds them into a
/// [`ToolResult`](crate::ToolResult) and the model decides what to do next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
#[non_exhaustive]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("invalid arguments: {0}")]
    #[serde(rename = "schema_error")]
    Schema(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("network failure: {0}")]
    #[serde(rename = "network_error")]
    Network(String),
    #[error("timeout after {0}ms")]
    Timeout(u64),
    #[error("nested depth {depth} exceeds maximum {max}")]
    DepthExceeded { depth: u32, max: u32 },
    #[error("execution failed: {0}")]
    #[serde(rename = "execution_error")]
    Execution(String),
    #[error("cancelled: {0}")]
    Cancelled(String),
    #[error("run aborted: {0}")]
    Aborted(String),
}

impl ToolError {
    /// Stable kind name, identical to the serialized tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Schema(_) => "schema_error",
            Self::RateLimited(_) => "rate_limited",
            Self::Network(_) => "network_error",
            Self::Timeout(_) => "timeout",
            Self::DepthExceeded { .. } => "depth_exceeded",
            Self::Execution(_) => "execution_error",
            Self::Cancelled(_) => "cancelled",
            Self::Aborted(_) => "aborted",
        }
    }

    /// Whether a retry may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_) | Self::Network(_) | Self::Timeout(_)
        )
    }
}

/// Errors from building a [`ToolRegistry`](crate::ToolRegistry).
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum RegistryError {
    #[error("duplicate tool: {0}")]
    DuplicateTool(String),
    #[error("invalid schema for tool {name}: {reason}")]
    InvalidSchema { name: String, reason: String },
    #[error("tool not found: {0}")]
    NotFound(String),
}
