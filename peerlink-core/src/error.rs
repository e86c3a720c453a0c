//! Errors surfaced by session entry points.

use crate::platform::PlatformError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("session not initialized")]
    NotInitialized,
    #[error("session already finalized")]
    Finalized,
    #[error("command queue full ({capacity} pending)")]
    QueueFull { capacity: usize },
    #[error("a connect request is already in progress")]
    OperationInProgress,
    #[error("channel unavailable: {0}")]
    Channel(#[from] PlatformError),
}

impl SessionError {
    /// Status code used by the C ABI. Always negative.
    pub fn code(&self) -> i32 {
        match self {
            SessionError::NotInitialized => -2,
            SessionError::Finalized => -3,
            SessionError::QueueFull { .. } => -4,
            SessionError::OperationInProgress => -5,
            SessionError::Channel(_) => -6,
        }
    }
}
