//! Runtime error types.

use crate::interrupt::InputKind;
use crate::stages::Stage;

/// Errors raised while executing or transitioning a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Extraction or reasoning service failed.
    #[error("Provider error: {0}")]
    Provider(#[from] tabsplit_llm::ProviderError),

    /// A stage ran before the field it depends on was populated.
    #[error("{stage} requires `{field}`, which is not set")]
    MissingState {
        /// Stage whose precondition failed.
        stage: Stage,
        /// Missing session field.
        field: &'static str,
    },

    /// No decodable image was found in the latest message.
    #[error("No receipt image found in the latest message")]
    MissingImage,

    /// Resume input does not match the pending interrupt.
    #[error("Run is waiting for {expected} input, got {got}")]
    UnexpectedInput {
        /// Kind the pending interrupt expects.
        expected: InputKind,
        /// Kind that was supplied.
        got: InputKind,
    },

    /// Run is executing a stage, not waiting for input.
    #[error("Run {0} is not waiting for input")]
    NotAwaitingInput(String),

    /// Run has already completed or failed.
    #[error("Run {run_id} has already {outcome}")]
    RunFinished {
        /// Run ID.
        run_id: String,
        /// `"completed"` or `"failed"`.
        outcome: &'static str,
    },

    /// No checkpoint exists for the run.
    #[error("Run not found: {0}")]
    RunNotFound(String),

    /// Another caller is advancing the same run.
    #[error("Run busy: {0}")]
    RunBusy(String),

    /// Concurrent execution limit reached.
    #[error("Server busy: {current}/{max} runs executing")]
    ServerBusy {
        /// Runs currently executing.
        current: usize,
        /// Configured limit.
        max: usize,
    },

    /// Operation was cancelled via the run's cancellation token.
    #[error("Operation cancelled")]
    Cancelled,

    /// Checkpoint store failure.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Internal / unexpected error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RuntimeError {
    /// Whether the caller can reasonably try again.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Provider(e) => e.is_retryable(),
            Self::UnexpectedInput { .. }
            | Self::RunBusy(_)
            | Self::ServerBusy { .. }
            | Self::Cancelled => true,
            Self::MissingState { .. }
            | Self::MissingImage
            | Self::NotAwaitingInput(_)
            | Self::RunFinished { .. }
            | Self::RunNotFound(_)
            | Self::Checkpoint(_)
            | Self::Internal(_) => false,
        }
    }

    /// Error category string for event emission.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Provider(e) => match e {
                tabsplit_llm::ProviderError::Cancelled => "cancelled",
                _ => "provider",
            },
            Self::MissingState { .. } => "missing_state",
            Self::MissingImage => "missing_image",
            Self::UnexpectedInput { .. } => "unexpected_input",
            Self::NotAwaitingInput(_) => "not_awaiting_input",
            Self::RunFinished { .. } => "run_finished",
            Self::RunNotFound(_) => "run_not_found",
            Self::RunBusy(_) => "run_busy",
            Self::ServerBusy { .. } => "server_busy",
            Self::Cancelled => "cancelled",
            Self::Checkpoint(_) => "checkpoint",
            Self::Internal(_) => "internal",
        }
    }
}

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;
