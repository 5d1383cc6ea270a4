pub mod client;
pub mod error;
pub mod router;

pub use client::{HttpSearchClient, SearchClient};
pub use error::SearchError;
