//! Database layer for ideflow
//!
//! The only persisted state of the pipeline is the archive identifier cache,
//! stored in SQLite with:
//! - Schema migrations
//! - Repository methods for cache lookup and refresh

pub mod repo;
pub mod schema;

pub use repo::{CachedIdentifiers, Database};
