//! Redis consumer implementation.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Client, ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use tracing::{debug, info};

use logship_core::Config;

use crate::consumer::{QueueConsumer, RawMessage};
use crate::error::QueueError;

/// Upper bound on connection establishment, so a dead network path fails
/// instead of hanging.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-request response timeout. Must exceed `BLOCK_SLICE_SECS`.
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// BLPOP is issued in bounded slices and re-armed on expiry, so the task
/// never parks in a single unbounded await.
const BLOCK_SLICE_SECS: u64 = 5;

/// Redis-backed queue consumer.
///
/// Watches a priority-ordered list of queue keys with BLPOP. Redis scans
/// the keys in argument order, so when several queues have pending items
/// the first configured namespace always wins.
pub struct RedisConsumer {
    conn: MultiplexedConnection,
    namespaces: Vec<String>,
}

impl RedisConsumer {
    /// Open a connection from project config.
    pub async fn connect(config: &Config) -> Result<Self, QueueError> {
        let info = ConnectionInfo {
            addr: ConnectionAddr::Tcp(config.queue_hostname.clone(), config.queue_port),
            redis: RedisConnectionInfo {
                db: config.queue_db,
                ..Default::default()
            },
        };

        let client = Client::open(info)
            .map_err(|e| QueueError::Connection(format!("invalid Redis target: {e}")))?;

        let conn = client
            .get_multiplexed_async_connection_with_timeouts(RESPONSE_TIMEOUT, CONNECT_TIMEOUT)
            .await
            .map_err(|e| QueueError::Connection(format!("Redis connect failed: {e}")))?;

        info!(
            host = %config.queue_hostname,
            port = config.queue_port,
            db = config.queue_db,
            namespaces = ?config.queue_namespaces,
            "Redis consumer initialized"
        );

        Ok(Self {
            conn,
            namespaces: config.queue_namespaces.clone(),
        })
    }
}

#[async_trait]
impl QueueConsumer for RedisConsumer {
    async fn blocking_pop(&mut self) -> Result<RawMessage, QueueError> {
        loop {
            let popped: Option<(String, String)> = redis::cmd("BLPOP")
                .arg(&self.namespaces)
                .arg(BLOCK_SLICE_SECS)
                .query_async(&mut self.conn)
                .await
                .map_err(|e| QueueError::Pop(format!("BLPOP failed: {e}")))?;

            match popped {
                Some((namespace, payload)) => {
                    debug!(%namespace, bytes = payload.len(), "popped message");
                    return Ok(RawMessage { namespace, payload });
                }
                // Slice expired with all queues empty; re-arm.
                None => continue,
            }
        }
    }

    async fn ping(&mut self) -> Result<(), QueueError> {
        let _: String = redis::cmd("PING")
            .query_async(&mut self.conn)
            .await
            .map_err(|e| QueueError::Connection(format!("PING failed: {e}")))?;
        Ok(())
    }

    async fn dead_letter(&mut self, queue: &str, payload: &str) -> Result<(), QueueError> {
        let _: i64 = redis::cmd("RPUSH")
            .arg(queue)
            .arg(payload)
            .query_async(&mut self.conn)
            .await
            .map_err(|e| QueueError::Push(format!("RPUSH to {queue} failed: {e}")))?;
        Ok(())
    }
}
