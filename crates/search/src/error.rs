//! Search backend error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("cluster health check failed: {0}")]
    Unhealthy(String),

    #[error("index write rejected (status {status}): {body}")]
    Rejected { status: u16, body: String },
}

impl SearchError {
    /// Whether a retry can plausibly succeed.
    ///
    /// Transport failures and server-side errors are worth retrying; a
    /// 4xx rejection means the backend understood the request and said
    /// no, so retrying the same document cannot help.
    pub fn is_retryable(&self) -> bool {
        match self {
            SearchError::Connection(_) | SearchError::Unhealthy(_) => true,
            SearchError::Rejected { status, .. } => *status >= 500,
        }
    }
}
