//! Error types for the synchronization library.

use thiserror::Error;

/// Main error type for synchronization operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration error (missing coordinates, invalid bulk sizes, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Driver-level failure (connection, prepare, execute, bind).
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    /// Two fields with diverging type tags were compared.
    #[error("Type mismatch on table {table}: {detail}")]
    TypeMismatch { table: String, detail: String },

    /// Column count or per-column descriptor divergence between the sides.
    #[error("Metadata mismatch: {0}")]
    MetadataMismatch(String),

    /// A requested table is missing on one of the sides.
    #[error("Table check failed: {0}")]
    TableCheck(String),

    /// A worker could not establish or initialize its session pair.
    #[error("Worker initialization failed: {0}")]
    WorkerInit(String),

    /// Signal handler installation failed.
    #[error("Signal handler error: {0}")]
    Signal(String),

    /// Execution failed for a specific table.
    #[error("Sync failed for table `{table}`: {message}")]
    Table { table: String, message: String },

    /// IO error (reserved for report output).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error (run report).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The stop flag was flipped (SIGINT, SIGTERM, SIGQUIT).
    #[error("Synchronization cancelled")]
    Cancelled,
}

impl SyncError {
    /// Create a Table error.
    pub fn table(table: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::Table {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a TypeMismatch error.
    pub fn type_mismatch(table: impl Into<String>, detail: impl Into<String>) -> Self {
        SyncError::TypeMismatch {
            table: table.into(),
            detail: detail.into(),
        }
    }

    /// Process exit code for this error.
    ///
    /// 0 is success; 1-9 argument/configuration errors; 10-22 connection and
    /// metadata load errors; 30-31 table and column checks; 40 worker init;
    /// 50 signal installation; 100 execution failure; 130 cancelled.
    pub fn exit_code(&self) -> u8 {
        match self {
            SyncError::Config(_) => 3,
            SyncError::Db(_) => 10,
            SyncError::Io(_) | SyncError::Json(_) => 7,
            SyncError::TableCheck(_) => 30,
            SyncError::MetadataMismatch(_) => 31,
            SyncError::WorkerInit(_) => 40,
            SyncError::Signal(_) => 50,
            SyncError::TypeMismatch { .. } | SyncError::Table { .. } => 100,
            SyncError::Cancelled => 130,
        }
    }

    /// Format error with full details including the source chain.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for synchronization operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(SyncError::Config("x".into()).exit_code(), 3);
        assert_eq!(SyncError::TableCheck("x".into()).exit_code(), 30);
        assert_eq!(SyncError::MetadataMismatch("x".into()).exit_code(), 31);
        assert_eq!(SyncError::WorkerInit("x".into()).exit_code(), 40);
        assert_eq!(SyncError::Signal("x".into()).exit_code(), 50);
        assert_eq!(SyncError::table("t", "boom").exit_code(), 100);
        assert_eq!(SyncError::Cancelled.exit_code(), 130);
    }

    #[test]
    fn test_table_error_message() {
        let err = SyncError::table("users", "insert failed");
        assert_eq!(err.to_string(), "Sync failed for table `users`: insert failed");
    }

    #[test]
    fn test_format_detailed_without_source() {
        let err = SyncError::Cancelled;
        assert!(err.format_detailed().starts_with("Error: Synchronization cancelled"));
    }
}
