//! Queue error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("pop error: {0}")]
    Pop(String),

    #[error("push error: {0}")]
    Push(String),
}
