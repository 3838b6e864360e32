//! # ideflow-core
//!
//! Core library for ideflow - offline processing of IDE interaction archives.
//!
//! This library provides:
//! - Domain types for raw IDE events, user groups, and intervals
//! - Archive discovery and streaming JSONL reading
//! - Identifier extraction with a SQLite cache
//! - Grouping of archives into users, time-ordered merging, and cleanup
//! - Interval transformers that turn event streams into activity intervals
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! Data flows through three layers:
//! - **Layer 0 (Raw):** Archives on disk, one JSON event per line (immutable)
//! - **Layer 1 (Merged):** One cleaned, time-ordered event stream per user group
//! - **Layer 2 (Derived):** Intervals computed from the merged streams (regenerable)
//!
//! ## Example
//!
//! ```rust,no_run
//! use ideflow_core::{Config, Database, Pipeline};
//! use std::path::Path;
//!
//! let config = Config::load().expect("failed to load config");
//!
//! let db = Database::open(&Config::cache_path()).expect("failed to open cache");
//! db.migrate().expect("failed to run migrations");
//!
//! let report = Pipeline::new(config)
//!     .with_cache(&db)
//!     .run(Path::new("/data/archives"), |group| {
//!         println!("{}: {} intervals", group.label(), group.intervals.len());
//!     })
//!     .expect("pipeline failed");
//! println!("{} groups", report.groups_formed);
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
pub use pipeline::{GroupResult, Pipeline, PipelineReport, ProgressObserver, TracingObserver};
pub use types::*;

// Public modules
pub mod archive;
pub mod cleanup;
pub mod config;
pub mod db;
pub mod error;
pub mod format;
pub mod grouping;
pub mod intervals;
pub mod logging;
pub mod merge;
pub mod pipeline;
pub mod types;
