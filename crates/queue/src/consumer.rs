//! Queue consumer trait and types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// A raw message popped from a queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessage {
    /// Name of the queue the message was popped from.
    pub namespace: String,
    /// Raw message payload (expected to be a JSON document).
    pub payload: String,
}

/// Trait for queue consumer backends.
///
/// Implementations handle the specifics of blocking consumption from a
/// particular queue provider. The shipper loop only ever talks to this
/// trait, so it can be driven by fakes in tests.
#[async_trait]
pub trait QueueConsumer: Send {
    /// Block until one of the watched queues has an item, then pop it.
    ///
    /// Popping removes the item from its queue; there is no redelivery
    /// path. When several queues have pending items, ties are broken by
    /// the configured namespace order (first listed wins).
    async fn blocking_pop(&mut self) -> Result<RawMessage, QueueError>;

    /// Liveness probe. Used once at startup as a fail-fast check.
    async fn ping(&mut self) -> Result<(), QueueError>;

    /// Push a payload onto a fallback queue for later inspection.
    async fn dead_letter(&mut self, queue: &str, payload: &str) -> Result<(), QueueError>;
}
