//! # db-sync
//!
//! Differential table synchronization between two MySQL-compatible servers.
//!
//! The engine compares the primary-key sets of every table on the *source*
//! and *target* sides, classifies each key as source-only, common or
//! target-only, and applies the difference to the target:
//!
//! - **Copy** inserts source-only rows.
//! - **Sync** additionally deletes target-only rows.
//! - **Update** (orthogonal) refreshes common rows whose server-side content
//!   hashes diverge.
//!
//! Tables are processed by a pool of workers, each owning its own pair of
//! database sessions. A dry-run switch executes the full comparison workload
//! without mutating the target.
//!
//! ## Example
//!
//! ```rust,no_run
//! use db_sync::{EndpointConfig, Mode, SyncOptions, SyncRunner};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), db_sync::SyncError> {
//!     let options = SyncOptions {
//!         mode: Mode::Sync,
//!         update: true,
//!         ..SyncOptions::default()
//!     };
//!     let source = EndpointConfig {
//!         host: "db-a".into(),
//!         port: 3306,
//!         user: "sync".into(),
//!         password: "...".into(),
//!         schema: "app".into(),
//!     };
//!     let target = EndpointConfig { host: "db-b".into(), ..source.clone() };
//!
//!     let report = SyncRunner::new(options, source, target)?.run(None).await?;
//!     println!("{}", report.to_json()?);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod db;
pub mod diff;
pub mod error;
pub mod pipeline;

// Re-exports for convenient access
pub use crate::config::{EndpointConfig, Mode, SyncOptions, SystemResources};
pub use crate::core::{ColumnDescriptor, Field, KeyTable, Row, RowBatch, TableMetadata, TypeTag};
pub use crate::db::TableConnection;
pub use crate::diff::{compare_keys, DiffCounts};
pub use crate::error::{Result, SyncError};
pub use crate::pipeline::{RunStatus, SyncManager, SyncReport, SyncRunner, TableJob};
