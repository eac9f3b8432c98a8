//! Shared run state: the pending-table queue, the stop flag, row accounting.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use tracing::{debug, error, info};

use crate::config::{EndpointConfig, SyncOptions};
use crate::core::schema::TableMetadata;
use crate::error::{Result, SyncError};

/// Bookkeeping shared by every worker of one run.
///
/// The pending-table set is the only mutex-guarded state and its critical
/// sections are O(1); the stop flag transitions true→false exactly once and
/// is observed at chunk boundaries.
pub struct SyncManager {
    options: SyncOptions,
    source: EndpointConfig,
    target: EndpointConfig,
    tables: Mutex<BTreeSet<String>>,
    source_meta: BTreeMap<String, TableMetadata>,
    target_meta: BTreeMap<String, TableMetadata>,
    running: AtomicBool,
    rw_count: AtomicU64,
}

impl SyncManager {
    pub fn new(options: SyncOptions, source: EndpointConfig, target: EndpointConfig) -> Self {
        SyncManager {
            options,
            source,
            target,
            tables: Mutex::new(BTreeSet::new()),
            source_meta: BTreeMap::new(),
            target_meta: BTreeMap::new(),
            running: AtomicBool::new(true),
            rw_count: AtomicU64::new(0),
        }
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn source_endpoint(&self) -> &EndpointConfig {
        &self.source
    }

    pub fn target_endpoint(&self) -> &EndpointConfig {
        &self.target
    }

    /// Establish the set of tables to process.
    ///
    /// An empty filter selects every base table of the source schema; a
    /// non-empty filter must name tables that exist on the source. Every
    /// selected table must also exist on the target.
    pub fn check_tables(&mut self, source: &[String], target: &[String]) -> Result<()> {
        let mut selected = BTreeSet::new();

        if self.options.tables.is_empty() {
            debug!("tables filter empty - using all tables from source");
            selected.extend(source.iter().cloned());
        } else {
            let mut missing = Vec::new();
            for table in &self.options.tables {
                if source.contains(table) {
                    selected.insert(table.clone());
                } else {
                    error!("table `{}` not found in source", table);
                    missing.push(table.clone());
                }
            }
            if !missing.is_empty() {
                return Err(SyncError::TableCheck(format!(
                    "not found in source: {}",
                    missing.join(", ")
                )));
            }
        }

        let missing: Vec<String> = selected
            .iter()
            .filter(|t| !target.contains(t))
            .cloned()
            .collect();
        if !missing.is_empty() {
            for table in &missing {
                error!("table `{}` not found in target", table);
            }
            return Err(SyncError::TableCheck(format!(
                "not found in target: {}",
                missing.join(", ")
            )));
        }

        info!(
            "tables to process: {}",
            selected.iter().cloned().collect::<Vec<_>>().join(", ")
        );
        *self.tables.lock().expect("tables lock") = selected;
        Ok(())
    }

    /// Snapshot of the pending tables, for metadata loading.
    pub fn pending_tables(&self) -> BTreeSet<String> {
        self.tables.lock().expect("tables lock").clone()
    }

    /// Verify per-table column-vector equality between the sides and keep
    /// both metadata maps for the workers.
    pub fn check_metadata(
        &mut self,
        source_meta: BTreeMap<String, TableMetadata>,
        target_meta: BTreeMap<String, TableMetadata>,
    ) -> Result<()> {
        let mut mismatched = Vec::new();

        for table in self.tables.lock().expect("tables lock").iter() {
            let src = source_meta.get(table);
            let dest = target_meta.get(table);
            let (Some(src), Some(dest)) = (src, dest) else {
                mismatched.push(table.clone());
                continue;
            };
            if src.columns.len() != dest.columns.len() {
                error!(
                    "table `{}` columns count mismatch [source {}] [target {}]",
                    table,
                    src.columns.len(),
                    dest.columns.len()
                );
                mismatched.push(table.clone());
                continue;
            }
            let mut columns_ok = true;
            for (i, (a, b)) in src.columns.iter().zip(dest.columns.iter()).enumerate() {
                if a != b {
                    error!(
                        "table `{}` column {} mismatch [source {}] [target {}]",
                        table, i, a, b
                    );
                    columns_ok = false;
                }
            }
            if !columns_ok {
                mismatched.push(table.clone());
            }
        }

        if !mismatched.is_empty() {
            return Err(SyncError::MetadataMismatch(format!(
                "column vectors diverge for: {}",
                mismatched.join(", ")
            )));
        }

        self.source_meta = source_meta;
        self.target_meta = target_meta;
        Ok(())
    }

    pub fn source_meta(&self, table: &str) -> Option<&TableMetadata> {
        self.source_meta.get(table)
    }

    pub fn target_meta(&self, table: &str) -> Option<&TableMetadata> {
        self.target_meta.get(table)
    }

    pub fn table_count(&self) -> usize {
        self.tables.lock().expect("tables lock").len()
    }

    /// Extract one pending table; workers race on this.
    pub fn take_table(&self) -> Option<String> {
        if !self.can_run() {
            return None;
        }
        let mut tables = self.tables.lock().expect("tables lock");
        tables.pop_first()
    }

    pub fn can_run(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Error when the stop flag has flipped.
    pub fn check_run(&self) -> Result<()> {
        if self.can_run() {
            Ok(())
        } else {
            Err(SyncError::Cancelled)
        }
    }

    /// Flip the stop flag; the transition is monotonic.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("shutdown requested");
        }
    }

    /// Credit `count` rows read or written.
    pub fn add_rw(&self, count: u64) {
        self.rw_count.fetch_add(count, Ordering::Relaxed);
    }

    pub fn rw_count(&self) -> u64 {
        self.rw_count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::ColumnDescriptor;

    fn endpoint(host: &str) -> EndpointConfig {
        EndpointConfig {
            host: host.to_string(),
            port: 3306,
            user: "u".to_string(),
            password: String::new(),
            schema: "s".to_string(),
        }
    }

    fn manager(tables: &[&str]) -> SyncManager {
        SyncManager::new(
            SyncOptions {
                tables: tables.iter().map(|t| t.to_string()).collect(),
                ..SyncOptions::default()
            },
            endpoint("a"),
            endpoint("b"),
        )
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn column(name: &str, sql_type: &str) -> ColumnDescriptor {
        ColumnDescriptor {
            name: name.to_string(),
            sql_type: sql_type.to_string(),
            nullable: false,
            primary_key: name == "id",
        }
    }

    fn meta(columns: &[(&str, &str)]) -> TableMetadata {
        TableMetadata {
            columns: columns.iter().map(|(n, t)| column(n, t)).collect(),
        }
    }

    #[test]
    fn test_empty_filter_selects_all_source_tables() {
        let mut m = manager(&[]);
        m.check_tables(&names(&["a", "b"]), &names(&["a", "b", "c"]))
            .unwrap();
        assert_eq!(m.table_count(), 2);
    }

    #[test]
    fn test_filter_must_exist_on_source() {
        let mut m = manager(&["a", "zz"]);
        let err = m
            .check_tables(&names(&["a", "b"]), &names(&["a", "b"]))
            .unwrap_err();
        assert!(matches!(err, SyncError::TableCheck(_)));
        assert!(err.to_string().contains("zz"));
    }

    #[test]
    fn test_selected_tables_must_exist_on_target() {
        let mut m = manager(&[]);
        let err = m
            .check_tables(&names(&["a", "b"]), &names(&["a"]))
            .unwrap_err();
        assert!(err.to_string().contains("b"));
    }

    #[test]
    fn test_take_table_drains_in_order() {
        let mut m = manager(&[]);
        m.check_tables(&names(&["b", "a", "c"]), &names(&["a", "b", "c"]))
            .unwrap();
        assert_eq!(m.take_table().as_deref(), Some("a"));
        assert_eq!(m.take_table().as_deref(), Some("b"));
        assert_eq!(m.take_table().as_deref(), Some("c"));
        assert_eq!(m.take_table(), None);
    }

    #[test]
    fn test_stop_blocks_take_table() {
        let mut m = manager(&[]);
        m.check_tables(&names(&["a"]), &names(&["a"])).unwrap();
        m.stop();
        assert!(!m.can_run());
        assert!(m.check_run().is_err());
        assert_eq!(m.take_table(), None);
    }

    #[test]
    fn test_check_metadata_accepts_equal_vectors() {
        let mut m = manager(&[]);
        m.check_tables(&names(&["t"]), &names(&["t"])).unwrap();
        let cols = meta(&[("id", "int"), ("v", "text")]);
        let mut src = BTreeMap::new();
        src.insert("t".to_string(), cols.clone());
        let mut dest = BTreeMap::new();
        dest.insert("t".to_string(), cols);
        m.check_metadata(src, dest).unwrap();
        assert!(m.source_meta("t").is_some());
    }

    #[test]
    fn test_check_metadata_rejects_count_mismatch() {
        let mut m = manager(&[]);
        m.check_tables(&names(&["t"]), &names(&["t"])).unwrap();
        let mut src = BTreeMap::new();
        src.insert("t".to_string(), meta(&[("id", "int"), ("v", "text")]));
        let mut dest = BTreeMap::new();
        dest.insert("t".to_string(), meta(&[("id", "int")]));
        let err = m.check_metadata(src, dest).unwrap_err();
        assert!(matches!(err, SyncError::MetadataMismatch(_)));
    }

    #[test]
    fn test_check_metadata_rejects_descriptor_mismatch() {
        let mut m = manager(&[]);
        m.check_tables(&names(&["t"]), &names(&["t"])).unwrap();
        let mut src = BTreeMap::new();
        src.insert("t".to_string(), meta(&[("id", "int"), ("v", "text")]));
        let mut dest = BTreeMap::new();
        dest.insert("t".to_string(), meta(&[("id", "bigint"), ("v", "text")]));
        assert!(m.check_metadata(src, dest).is_err());
    }

    #[test]
    fn test_rw_accounting() {
        let m = manager(&[]);
        m.add_rw(5);
        m.add_rw(7);
        assert_eq!(m.rw_count(), 12);
    }
}
