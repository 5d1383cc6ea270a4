pub mod consumer;
pub mod error;
pub mod redis;

pub use consumer::{QueueConsumer, RawMessage};
pub use error::QueueError;
pub use self::redis::RedisConsumer;
