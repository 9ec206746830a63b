use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    /// The instance is stopped; the call was refused before touching the
    /// scheduler. Reactivate with `start()`.
    #[error("Agent is stopped")]
    Stopped,

    #[error("Unknown operation '{0}'")]
    UnknownOperation(String),

    /// The initialization hook failed, aborting activation. The instance
    /// stays stopped; no operation can be dispatched until a fresh,
    /// successful `start()`.
    #[error("Initialization failed: {0}")]
    InitFailed(#[source] anyhow::Error),

    /// The scheduler thread or its runtime could not be set up.
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Activation timed out after {0:?}")]
    StartTimeout(Duration),

    /// A dispatched operation panicked. The scheduler thread survives and
    /// subsequent calls still succeed.
    #[error("Operation panicked: {0}")]
    Panicked(String),

    #[error("Lock error: {0}")]
    LockError(String),

    /// Failure raised by the operation's own body, propagated unchanged.
    #[error(transparent)]
    Operation(#[from] anyhow::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;

impl<T> From<std::sync::PoisonError<T>> for AgentError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}
