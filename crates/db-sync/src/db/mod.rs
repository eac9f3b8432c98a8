//! Database access: SQL shapes, per-worker sessions, metadata catalog.

pub mod catalog;
pub mod session;
pub mod sql;

pub use session::TableConnection;
