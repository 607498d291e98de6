use crate::model::ModelError;
use crate::tools::RegistryError;
use thiserror::Error;

/// Run-level failures.
///
/// Unlike [`ToolError`](crate::ToolError), these end the invocation that
/// raised them. The fatal ones also end every other invocation of the run.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("round limit of {max_rounds} exceeded")]
    RoundLimitExceeded { max_rounds: u32 },

    #[error("token budget exceeded: {used} of {budget}")]
    BudgetExceeded { used: u64, budget: u64 },

    #[error("run cancelled")]
    Cancelled,

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    /// Stable snake_case name used in events and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RoundLimitExceeded { .. } => "round_limit_exceeded",
            Self::BudgetExceeded { .. } => "budget_exceeded",
            Self::Cancelled => "cancelled",
            Self::Model(_) => "model_error",
            Self::Registry(_) => "registry_error",
            Self::Config(_) => "config_error",
        }
    }

    /// Whether the error terminates the whole run rather than one invocation.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::RoundLimitExceeded { .. } | Self::BudgetExceeded { .. } | Self::Cancelled
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
