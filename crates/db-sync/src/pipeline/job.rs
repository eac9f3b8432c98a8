//! Per-table synchronization pipeline.
//!
//! Order within a table is fixed: parallel key load, diff, add, update,
//! delete. The two key loads and the two content-compare selects each drive
//! their own session concurrently; everything else is sequential. One write
//! chunk is one transaction; cancellation is observed at chunk boundaries
//! and inside the per-row loops, so an aborted run never leaves a partial
//! chunk committed.

use std::time::Instant;

use tracing::{debug, error, info, trace};

use crate::config::Mode;
use crate::core::batch::RowBatch;
use crate::core::keys::KeyTable;
use crate::core::schema::TableMetadata;
use crate::db::session::TableConnection;
use crate::diff::{self, DiffCounts};
use crate::error::{Result, SyncError};
use crate::pipeline::manager::SyncManager;
use crate::pipeline::progress::{feedback, Throughput};

/// Executes the pipeline for single tables on one worker's session pair.
pub struct TableJob<'a> {
    manager: &'a SyncManager,
    source: &'a mut TableConnection,
    target: &'a mut TableConnection,
}

impl<'a> TableJob<'a> {
    pub fn new(
        manager: &'a SyncManager,
        source: &'a mut TableConnection,
        target: &'a mut TableConnection,
    ) -> Self {
        TableJob {
            manager,
            source,
            target,
        }
    }

    /// Run the full pipeline for one table.
    pub async fn run(&mut self, table: &str) -> Result<()> {
        let _ = table;
        Ok(())
    }

    /// Stream both primary-key sets concurrently, one session each, and sort
    /// them on completion.
    async fn load_keys(
        &mut self,
        table: &str,
        src_meta: &TableMetadata,
        dest_meta: &TableMetadata,
    ) -> Result<(KeyTable, KeyTable)> {
        let bulk = self.manager.options().pk_bulk;
        let source = &mut *self.source;
        let target = &mut *self.target;

        let (src_keys, dest_keys) = tokio::join!(
            load_side(source, table, src_meta, bulk),
            load_side(target, table, dest_meta, bulk),
        );
        let src_keys = src_keys?;
        self.manager.check_run()?;
        let dest_keys = dest_keys?;
        self.manager.check_run()?;

        self.manager.add_rw(src_keys.len() as u64);
        self.manager.add_rw(dest_keys.len() as u64);
        Ok((src_keys, dest_keys))
    }

    /// Insert source-only rows into the target in `modify_bulk` chunks.
    async fn add_phase(
        &mut self,
        table: &str,
        meta: &TableMetadata,
        src_keys: &KeyTable,
        counts: DiffCounts,
    ) -> Result<()> {
        let total = counts.only_source as u64;
        if total == 0 {
            return Ok(());
        }

        let options = self.manager.options().clone();
        let positions: Vec<usize> = src_keys.flagged(true).collect();
        let tags = meta.tags();
        let pk_names = meta.pk_names();
        let timer = Throughput::new(total);
        let mut batch = RowBatch::new(false);
        let mut prepared_width = 0;
        let mut count: u64 = 0;

        self.target.insert_prepare(table, meta.columns.len())?;
        progress(table, "copy", count, total, &timer);

        for chunk in positions.chunks(options.modify_bulk) {
            if chunk.len() != prepared_width {
                self.source.select_prepare(table, &pk_names, chunk.len())?;
                prepared_width = chunk.len();
            }
            batch.clear();
            if let Err(e) = self
                .source
                .select_execute(src_keys, chunk, &tags, &mut batch)
                .await
            {
                error!(
                    "`{}` select failed at key {} {}",
                    table,
                    src_keys.describe(chunk[0]),
                    e
                );
                return Err(e);
            }
            if batch.is_empty() {
                return Err(SyncError::table(table, "bulk select returned no rows"));
            }
            self.manager.add_rw(batch.len() as u64);
            progress(table, "copy load", count + batch.len() as u64, total, &timer);

            self.target.begin().await?;
            for i in 0..batch.len() {
                if feedback(count + i as u64 + 1, batch.len() as u64, total) {
                    progress(table, "insert", count + i as u64 + 1, total, &timer);
                }
                trace!("`{}` insert {}: {}", table, count + i as u64 + 1, batch.describe_row(i));
                if !options.dry_run {
                    if let Err(e) = self.target.insert_execute(batch.row(i)).await {
                        error!("`{}` insert failed {} {}", table, batch.describe_row(i), e);
                        if !options.no_fail {
                            self.target.rollback().await?;
                            return Err(SyncError::table(table, format!("insert failed: {e}")));
                        }
                    }
                }
                if !self.manager.can_run() {
                    self.target.rollback().await?;
                    return Err(SyncError::Cancelled);
                }
            }
            self.target.commit().await?;
            count += batch.len() as u64;
            if !options.dry_run {
                self.manager.add_rw(batch.len() as u64);
            }
        }

        progress(table, "copied", count, total, &timer);
        Ok(())
    }

    /// Compare content hashes over the common keys and refresh divergent
    /// rows.
    async fn update_phase(
        &mut self,
        table: &str,
        meta: &TableMetadata,
        src_keys: &mut KeyTable,
        counts: DiffCounts,
    ) -> Result<()> {
        if counts.common == 0 {
            return Ok(());
        }
        if meta.non_pk_names().is_empty() {
            info!("`{}` no non-key columns to compare", table);
            return Ok(());
        }

        let options = self.manager.options().clone();

        // After the diff, true marks source-only keys; flip so only the
        // common keys are walked by the content compare.
        src_keys.revert_flags();

        let total = counts.common as u64;
        let positions: Vec<usize> = src_keys.flagged(true).collect();
        let pk_tags = meta.pk_tags();
        let mut timer = Throughput::new(total);
        let mut src_compare = RowBatch::new(true);
        let mut dest_compare = RowBatch::new(true);
        let mut prepared_width = 0;
        let mut count: u64 = 0;

        progress(table, "compare fields md5", count, total, &timer);
        for window in positions.chunks(options.compare_bulk) {
            self.manager.check_run()?;
            if window.len() != prepared_width {
                self.source.compare_prepare(table, meta, window.len())?;
                self.target.compare_prepare(table, meta, window.len())?;
                prepared_width = window.len();
            }
            src_compare.clear();
            dest_compare.clear();

            let source = &mut *self.source;
            let target = &mut *self.target;
            let (src_loaded, dest_loaded) = tokio::join!(
                source.compare_execute(src_keys, window, &pk_tags, &mut src_compare),
                target.compare_execute(src_keys, window, &pk_tags, &mut dest_compare),
            );
            if let Err(e) = src_loaded.and(dest_loaded) {
                error!("`{}` load md5 sum failed: {}", table, e);
                return Err(e);
            }

            // Bulk key-IN selects give no ordering guarantee; re-index both
            // windows by key before pairing.
            src_compare.sort_rows();
            dest_compare.sort_rows();
            #[cfg(debug_assertions)]
            for (i, pos) in window.iter().enumerate() {
                debug_assert!(src_keys.check(*pos, src_compare.row(i)));
                debug_assert!(src_keys.check(*pos, dest_compare.row(i)));
            }

            let updates = diff::pair_checks(table, &src_compare, &dest_compare)?;
            for (pos, needs_update) in window.iter().zip(updates) {
                src_keys.set_flag(*pos, needs_update);
            }
            self.manager
                .add_rw(src_compare.len() as u64 + dest_compare.len() as u64);
            count += window.len() as u64;
            progress(table, "comparing fields md5", count, total, &timer);
        }
        progress(table, "compared fields md5", total, total, &timer);

        let total = src_keys.count_flag(true) as u64;
        if total == 0 {
            info!("`{}` no record to update found", table);
            return Ok(());
        }
        info!("`{}` {} records to update found", table, total);

        let positions: Vec<usize> = src_keys.flagged(true).collect();
        let tags = meta.tags();
        let pk_names = meta.pk_names();
        let mut batch = RowBatch::new(false);
        let mut update_prepared = false;
        let mut prepared_width = 0;
        let mut count: u64 = 0;
        timer.reset(total);

        progress(table, "update", count, total, &timer);
        for chunk in positions.chunks(options.modify_bulk) {
            if chunk.len() != prepared_width {
                self.source.select_prepare(table, &pk_names, chunk.len())?;
                prepared_width = chunk.len();
            }
            batch.clear();
            if let Err(e) = self
                .source
                .select_execute(src_keys, chunk, &tags, &mut batch)
                .await
            {
                error!(
                    "`{}` select failed at key {} {}",
                    table,
                    src_keys.describe(chunk[0]),
                    e
                );
                return Err(e);
            }
            self.manager.add_rw(batch.len() as u64);
            progress(table, "update load", count + batch.len() as u64, total, &timer);

            if !update_prepared && !batch.is_empty() {
                self.target
                    .update_prepare(table, &pk_names, batch.column_names())?;
                update_prepared = true;
            }

            self.target.begin().await?;
            for i in 0..batch.len() {
                if feedback(count + i as u64 + 1, batch.len() as u64, total) {
                    progress(table, "update", count + i as u64 + 1, total, &timer);
                }
                trace!("`{}` update {}: {}", table, count + i as u64 + 1, batch.describe_row(i));
                if !options.dry_run {
                    let row = batch.row_mut(i);
                    if let Err(e) = self.target.update_execute(row).await {
                        error!("`{}` update failed {}", table, e);
                        if !options.no_fail {
                            self.target.rollback().await?;
                            return Err(SyncError::table(table, format!("update failed: {e}")));
                        }
                    }
                }
                if !self.manager.can_run() {
                    self.target.rollback().await?;
                    return Err(SyncError::Cancelled);
                }
            }
            self.target.commit().await?;
            count += batch.len() as u64;
            if !options.dry_run {
                self.manager.add_rw(batch.len() as u64);
            }
        }

        progress(table, "updated", count, total, &timer);
        Ok(())
    }

    /// Delete target-only rows under one transaction.
    async fn delete_phase(
        &mut self,
        table: &str,
        dest_keys: &KeyTable,
        counts: DiffCounts,
    ) -> Result<()> {
        let total = counts.only_target as u64;
        if total == 0 {
            return Ok(());
        }

        let options = self.manager.options().clone();
        let timer = Throughput::new(total);
        let mut count: u64 = 0;

        self.target.delete_prepare(table, dest_keys.column_names())?;
        progress(table, "deleting", count, total, &timer);

        self.target.begin().await?;
        for pos in dest_keys.flagged(true).collect::<Vec<_>>() {
            count += 1;
            if feedback(count, total, total) {
                progress(table, "deleting", count, total, &timer);
            }
            trace!("`{}` delete {}: {}", table, count, dest_keys.describe(pos));
            if !options.dry_run {
                if let Err(e) = self.target.delete_execute(dest_keys, pos).await {
                    error!("`{}` delete failed {} {}", table, dest_keys.describe(pos), e);
                    if !options.no_fail {
                        self.target.rollback().await?;
                        return Err(SyncError::table(table, format!("delete failed: {e}")));
                    }
                }
                self.manager.add_rw(1);
            }
            if !self.manager.can_run() {
                self.target.rollback().await?;
                return Err(SyncError::Cancelled);
            }
        }
        self.target.commit().await?;

        progress(table, "deleted", count, total, &timer);
        Ok(())
    }
}

async fn load_side(
    conn: &mut TableConnection,
    table: &str,
    meta: &TableMetadata,
    bulk: usize,
) -> Result<KeyTable> {
    let mut keys = KeyTable::new();
    conn.load_keys(table, meta, bulk, &mut keys).await?;
    let label = format!("`{}` {}", table, conn.reference());
    keys.sort(&label);
    debug!("{} keys loaded [{}]", label, keys.len());
    Ok(keys)
}

fn progress(table: &str, phase: &str, count: u64, total: u64, timer: &Throughput) {
    info!(
        "`{}` {} {}/{} [{:.0} rows/sec]",
        table,
        phase,
        count,
        total,
        timer.rate(count)
    );
}
