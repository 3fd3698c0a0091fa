//! Persistence Module
//!
//! Crash-safe snapshots of the cache contents.

mod serializer;
mod snapshot;

pub use serializer::{Serializer, StringSerializer, U64Serializer};
pub use snapshot::{LoadReport, SnapshotManager, SNAPSHOT_MAGIC, SNAPSHOT_VERSION};
