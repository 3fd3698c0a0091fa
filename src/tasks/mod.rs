//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Janitor: sweeps a bounded number of expired entries from each shard

mod janitor;

pub use janitor::{sweep_shards, ExpirySweep, Janitor, DEFAULT_SWEEP_BUDGET};
