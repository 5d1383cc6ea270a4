//! Process startup: open both backend handles and fail fast if either
//! one is unreachable.

use thiserror::Error;
use tracing::info;

use logship_core::Config;
use logship_queue::{QueueConsumer, QueueError, RedisConsumer};
use logship_search::{HttpSearchClient, SearchClient, SearchError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("queue backend unavailable: {0}")]
    Queue(#[from] QueueError),

    #[error("search backend unavailable: {0}")]
    Search(#[from] SearchError),
}

/// Open the two long-lived backend handles and probe each one.
///
/// No retry here: an unreachable backend at startup is an operator
/// problem, and restarting the process is the recovery path. The
/// ingestion loop is never entered when this fails.
pub async fn connect(
    config: &Config,
) -> Result<(RedisConsumer, HttpSearchClient), StartupError> {
    let mut queue = RedisConsumer::connect(config).await?;
    let search = HttpSearchClient::connect(config)?;
    probe(&mut queue, &search).await?;
    Ok((queue, search))
}

/// Health-check both backends, queue first.
pub async fn probe<Q, S>(queue: &mut Q, search: &S) -> Result<(), StartupError>
where
    Q: QueueConsumer,
    S: SearchClient,
{
    queue.ping().await?;
    info!("queue backend reachable");
    search.cluster_health().await?;
    Ok(())
}

// ── Tests ───────────────────────────────────────────────────────────
