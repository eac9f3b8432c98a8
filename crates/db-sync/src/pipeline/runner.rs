//! Run entry point: checks, worker fan-out, final report.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::config::{self, EndpointConfig, Mode, SyncOptions};
use crate::db::session::TableConnection;
use crate::error::{Result, SyncError};
use crate::pipeline::job::TableJob;
use crate::pipeline::manager::SyncManager;

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
    Cancelled,
}

/// Summary of one synchronization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    /// Final status.
    pub status: RunStatus,

    /// Mode the run executed in.
    pub mode: Mode,

    /// Whether target mutations were suppressed.
    pub dry_run: bool,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Tables selected for processing.
    pub tables_total: usize,

    /// Tables fully processed.
    pub tables_synced: usize,

    /// Tables that failed.
    pub tables_failed: usize,

    /// Names of the failed tables.
    pub failed_tables: Vec<String>,

    /// Rows read and written across all workers.
    pub rows_touched: u64,

    /// Average throughput over the whole run.
    pub rows_per_second: u64,
}

impl SyncReport {
    /// Render as pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Process exit code implied by the terminal status.
    pub fn exit_code(&self) -> u8 {
        match self.status {
            RunStatus::Completed => 0,
            RunStatus::Failed => 100,
            RunStatus::Cancelled => 130,
        }
    }
}

#[derive(Debug, Default)]
struct WorkerOutcome {
    synced: usize,
    failed: Vec<String>,
}

/// Orchestrates one run: checks both sides, spawns the worker pool, joins
/// it and aggregates the report.
pub struct SyncRunner {
    options: SyncOptions,
    source: EndpointConfig,
    target: EndpointConfig,
}

impl SyncRunner {
    /// Validate the configuration and build a runner.
    pub fn new(
        options: SyncOptions,
        source: EndpointConfig,
        target: EndpointConfig,
    ) -> Result<Self> {
        config::validate(&options, &source, &target)?;
        Ok(SyncRunner {
            options,
            source,
            target,
        })
    }

    /// Execute the run. `cancel` flips to true when a stop signal arrives.
    pub async fn run(self, cancel: Option<watch::Receiver<bool>>) -> Result<SyncReport> {
        let started_at = Utc::now();
        let started = Instant::now();
        info!("starting {}", self.options);
        info!(
            "source {} -> target {}",
            self.source.address(),
            self.target.address()
        );

        let mut manager = SyncManager::new(
            self.options.clone(),
            self.source.clone(),
            self.target.clone(),
        );

        // Admin sessions: table lists, metadata, checks. Dropped before the
        // workers open their own session pairs.
        {
            let mut source = TableConnection::open("source", &self.source).await?;
            let mut target = TableConnection::open("target", &self.target).await?;

            let source_tables = source.load_tables().await?;
            let target_tables = target.load_tables().await?;
            manager.check_tables(&source_tables, &target_tables)?;

            let pending = manager.pending_tables();
            let source_meta = source.load_metadata(&pending).await?;
            source.log_table_info(&source_meta);
            let target_meta = target.load_metadata(&pending).await?;
            target.log_table_info(&target_meta);
            manager.check_metadata(source_meta, target_meta)?;
        }

        let tables_total = manager.table_count();
        let jobs = self.options.effective_jobs(tables_total);
        info!("processing {} tables with {} workers", tables_total, jobs);

        let manager = Arc::new(manager);
        let cancel_requested = Arc::new(AtomicBool::new(false));

        if let Some(mut rx) = cancel {
            let manager = manager.clone();
            let cancel_requested = cancel_requested.clone();
            tokio::spawn(async move {
                while rx.changed().await.is_ok() {
                    if *rx.borrow() {
                        cancel_requested.store(true, Ordering::SeqCst);
                        manager.stop();
                        break;
                    }
                }
            });
        }

        let mut handles = Vec::with_capacity(jobs);
        for id in 0..jobs {
            handles.push(tokio::spawn(worker(id, manager.clone())));
        }

        let mut synced = 0;
        let mut failed_tables = Vec::new();
        let mut init_error = None;
        for joined in futures::future::join_all(handles).await {
            match joined {
                Ok(Ok(outcome)) => {
                    synced += outcome.synced;
                    failed_tables.extend(outcome.failed);
                }
                Ok(Err(e)) => {
                    manager.stop();
                    if init_error.is_none() {
                        init_error = Some(e);
                    }
                }
                Err(join_error) => {
                    manager.stop();
                    error!("worker task aborted: {}", join_error);
                    if init_error.is_none() {
                        init_error = Some(SyncError::WorkerInit(join_error.to_string()));
                    }
                }
            }
        }
        if let Some(e) = init_error {
            return Err(e);
        }

        failed_tables.sort();
        let completed_at = Utc::now();
        let duration = started.elapsed().as_secs_f64();
        let rows_touched = manager.rw_count();
        let status = if cancel_requested.load(Ordering::SeqCst) {
            RunStatus::Cancelled
        } else if failed_tables.is_empty() {
            RunStatus::Completed
        } else {
            RunStatus::Failed
        };

        let report = SyncReport {
            status,
            mode: self.options.mode,
            dry_run: self.options.dry_run,
            started_at,
            completed_at,
            duration_seconds: duration,
            tables_total,
            tables_synced: synced,
            tables_failed: failed_tables.len(),
            failed_tables,
            rows_touched,
            rows_per_second: if duration > 0.0 {
                (rows_touched as f64 / duration) as u64
            } else {
                rows_touched
            },
        };
        info!(
            "run {:?}: {}/{} tables, {} rows touched in {:.2}s",
            report.status, report.tables_synced, report.tables_total, report.rows_touched, duration
        );
        Ok(report)
    }
}

/// One worker: its own session pair, pulling table names until the queue
/// drains or the stop flag flips.
async fn worker(id: usize, manager: Arc<SyncManager>) -> Result<WorkerOutcome> {
    let mut source = TableConnection::open("source", manager.source_endpoint())
        .await
        .map_err(|e| SyncError::WorkerInit(format!("worker {id} source session: {e}")))?;
    let mut target = TableConnection::open("target", manager.target_endpoint())
        .await
        .map_err(|e| SyncError::WorkerInit(format!("worker {id} target session: {e}")))?;
    target
        .init_write_session(manager.options().disable_binlog)
        .await
        .map_err(|e| SyncError::WorkerInit(format!("worker {id} session settings: {e}")))?;

    let mut outcome = WorkerOutcome::default();
    while let Some(table) = manager.take_table() {
        debug!("worker {} processing `{}`", id, table);
        let mut job = TableJob::new(&manager, &mut source, &mut target);
        match job.run(&table).await {
            Ok(()) => outcome.synced += 1,
            Err(SyncError::Cancelled) => {
                debug!("worker {} stop requested", id);
                break;
            }
            Err(e) => {
                error!("`{}` failed: {}", table, e);
                outcome.failed.push(table);
                if !manager.options().no_fail {
                    manager.stop();
                    break;
                }
            }
        }
    }
    debug!(
        "worker {} done [synced: {}] [failed: {}]",
        id,
        outcome.synced,
        outcome.failed.len()
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(status: RunStatus) -> SyncReport {
        SyncReport {
            status,
            mode: Mode::Copy,
            dry_run: false,
            started_at: Utc::now(),
            completed_at: Utc::now(),
            duration_seconds: 1.0,
            tables_total: 1,
            tables_synced: 1,
            tables_failed: 0,
            failed_tables: Vec::new(),
            rows_touched: 10,
            rows_per_second: 10,
        }
    }

    #[test]
    fn test_report_exit_codes() {
        assert_eq!(report(RunStatus::Completed).exit_code(), 0);
        assert_eq!(report(RunStatus::Failed).exit_code(), 100);
        assert_eq!(report(RunStatus::Cancelled).exit_code(), 130);
    }

    #[test]
    fn test_report_serializes() {
        let json = report(RunStatus::Completed).to_json().unwrap();
        assert!(json.contains("\"status\": \"completed\""));
        assert!(json.contains("\"rows_touched\": 10"));
    }

    #[test]
    fn test_runner_rejects_invalid_config() {
        let endpoint = EndpointConfig {
            host: "h".to_string(),
            port: 3306,
            user: "u".to_string(),
            password: String::new(),
            schema: "s".to_string(),
        };
        let err = SyncRunner::new(SyncOptions::default(), endpoint.clone(), endpoint)
            .err()
            .expect("same endpoint must be rejected");
        assert!(matches!(err, SyncError::Config(_)));
    }
}
