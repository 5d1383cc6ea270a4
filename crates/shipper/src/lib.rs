//! Shipper runtime: startup checks and the ingestion loop.
//!
//! This crate provides:
//! - `startup::connect`: open and probe both backend handles, fail fast
//! - `ingest::Shipper`: the dequeue/decode/route/index loop

pub mod ingest;
pub mod startup;

pub use ingest::Shipper;
pub use startup::StartupError;
