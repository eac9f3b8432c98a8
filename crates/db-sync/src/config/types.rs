//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use sysinfo::System;
use tracing::info;

/// Default page size for primary-key scans.
pub const DEFAULT_PK_BULK: usize = 50_000;

/// Default window size for content-compare selects.
pub const DEFAULT_COMPARE_BULK: usize = 5_000;

/// Default batch size for write chunks.
pub const DEFAULT_MODIFY_BULK: usize = 500;

/// System resource information used for the worker-count default.
#[derive(Debug, Clone)]
pub struct SystemResources {
    /// Total RAM in bytes.
    pub total_memory_bytes: u64,
    /// Number of CPU cores.
    pub cpu_cores: usize,
}

impl SystemResources {
    /// Detect system resources.
    /// Uses targeted refresh to avoid expensive parsing of processes and disks.
    pub fn detect() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu_all();

        Self {
            total_memory_bytes: sys.total_memory(),
            cpu_cores: sys.cpus().len().max(1),
        }
    }

    /// Log detected system resources.
    pub fn log(&self) {
        info!(
            "System resources: {:.1} GB RAM, {} CPU cores",
            self.total_memory_bytes as f64 / (1024.0 * 1024.0 * 1024.0),
            self.cpu_cores
        );
    }
}

/// Top-level synchronization mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Insert source-only rows into the target.
    Copy,
    /// Copy plus deletion of target-only rows.
    Sync,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Copy => write!(f, "copy"),
            Mode::Sync => write!(f, "sync"),
        }
    }
}

/// Connection coordinates for one side.
#[derive(Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 3306).
    pub port: u16,

    /// Username.
    pub user: String,

    /// Password.
    pub password: String,

    /// Schema to synchronize.
    pub schema: String,
}

impl fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .finish()
    }
}

impl EndpointConfig {
    /// Short display form without credentials.
    pub fn address(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.schema)
    }
}

/// Behavior switches and tuning knobs, immutable for the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Copy or Sync.
    pub mode: Mode,

    /// Refresh common rows whose non-key columns diverge.
    pub update: bool,

    /// Execute the full comparison workload without mutating the target.
    pub dry_run: bool,

    /// Issue `SET SESSION SQL_LOG_BIN=0` on target sessions.
    pub disable_binlog: bool,

    /// Log failed mutations and keep going instead of aborting the table.
    pub no_fail: bool,

    /// Page size for primary-key scans.
    pub pk_bulk: usize,

    /// Window size for content-compare selects.
    pub compare_bulk: usize,

    /// Batch size for write chunks (one chunk = one transaction).
    pub modify_bulk: usize,

    /// Tables to process; empty means every base table of the source schema.
    pub tables: Vec<String>,

    /// Worker count; 0 resolves to the number of CPU cores.
    pub jobs: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            mode: Mode::Copy,
            update: false,
            dry_run: false,
            disable_binlog: false,
            no_fail: false,
            pk_bulk: DEFAULT_PK_BULK,
            compare_bulk: DEFAULT_COMPARE_BULK,
            modify_bulk: DEFAULT_MODIFY_BULK,
            tables: Vec::new(),
            jobs: 0,
        }
    }
}

impl SyncOptions {
    /// Effective worker count for the given number of tables.
    ///
    /// Never more workers than tables; a zero `jobs` setting resolves to the
    /// detected core count.
    pub fn effective_jobs(&self, table_count: usize) -> usize {
        let configured = if self.jobs == 0 {
            let resources = SystemResources::detect();
            resources.log();
            resources.cpu_cores
        } else {
            self.jobs
        };
        configured.min(table_count).max(1)
    }
}

impl fmt::Display for SyncOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[mode: {}] [update: {}] [dry-run: {}] [no-fail: {}] [disable-binlog: {}] \
             [pk-bulk: {}] [compare-bulk: {}] [modify-bulk: {}]",
            self.mode,
            self.update,
            self.dry_run,
            self.no_fail,
            self.disable_binlog,
            self.pk_bulk,
            self.compare_bulk,
            self.modify_bulk,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> EndpointConfig {
        EndpointConfig {
            host: "db.example.com".to_string(),
            port: 3306,
            user: "sync".to_string(),
            password: "secret".to_string(),
            schema: "app".to_string(),
        }
    }

    #[test]
    fn test_debug_redacts_password() {
        let rendered = format!("{:?}", endpoint());
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn test_endpoint_address() {
        assert_eq!(endpoint().address(), "db.example.com:3306/app");
    }

    #[test]
    fn test_effective_jobs_bounded_by_tables() {
        let opts = SyncOptions {
            jobs: 8,
            ..SyncOptions::default()
        };
        assert_eq!(opts.effective_jobs(3), 3);
        assert_eq!(opts.effective_jobs(100), 8);
    }

    #[test]
    fn test_effective_jobs_zero_resolves_to_cores() {
        let opts = SyncOptions::default();
        assert!(opts.effective_jobs(64) >= 1);
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(Mode::Copy.to_string(), "copy");
        assert_eq!(Mode::Sync.to_string(), "sync");
    }
}
