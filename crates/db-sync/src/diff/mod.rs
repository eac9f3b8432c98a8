//! Streaming merge-diff over two sorted key streams, plus the pairing step
//! of the content compare.

use std::cmp::Ordering;

use tracing::{debug, info};

use crate::core::batch::RowBatch;
use crate::core::keys::KeyTable;
use crate::error::{Result, SyncError};

/// Classification of one table's keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffCounts {
    /// Keys present only on the source (candidates for insert).
    pub only_source: usize,
    /// Keys present on both sides.
    pub common: usize,
    /// Keys present only on the target (candidates for delete).
    pub only_target: usize,
}

/// Walk both sorted key tables once, marking every key as source-only,
/// target-only or common.
///
/// After the walk, `src` flags are true for source-only keys and `dest`
/// flags are true for target-only keys; common keys stay false on both
/// sides. This is the only stage that must see both sides at once.
pub fn compare_keys(table: &str, src: &mut KeyTable, dest: &mut KeyTable) -> Result<DiffCounts> {
    let mut i = 0;
    let mut j = 0;

    while i < src.len() && j < dest.len() {
        match src.compare_at(i, dest, j) {
            Some(Ordering::Less) => {
                src.set_flag(i, true);
                i += 1;
            }
            Some(Ordering::Greater) => {
                dest.set_flag(j, true);
                j += 1;
            }
            Some(Ordering::Equal) => {
                i += 1;
                j += 1;
            }
            None => {
                return Err(SyncError::type_mismatch(
                    table,
                    format!("incomparable keys at source {} / target {}", i, j),
                ))
            }
        }
    }
    while i < src.len() {
        src.set_flag(i, true);
        i += 1;
    }
    while j < dest.len() {
        dest.set_flag(j, true);
        j += 1;
    }

    let only_source = src.count_flag(true);
    let common = src.len() - only_source;
    let only_target = dest.count_flag(true);
    debug_assert_eq!(common, dest.len() - only_target);

    debug!(
        "`{}` records: source {} target {}",
        table,
        src.len(),
        dest.len()
    );
    info!(
        "`{}` primary key compare [only source: {}] [common: {}] [only target: {}]",
        table, only_source, common, only_target
    );

    Ok(DiffCounts {
        only_source,
        common,
        only_target,
    })
}

/// Pair one content-compare window: for each key, true when the two content
/// hashes differ.
///
/// Both batches hold `(keys…, hash)` rows for the same key set and must have
/// been sorted by key prefix (bulk key-IN selects return rows in arbitrary
/// order). The key prefixes are verified pairwise before the hashes are
/// compared.
pub fn pair_checks(table: &str, src: &RowBatch, dest: &RowBatch) -> Result<Vec<bool>> {
    if src.len() != dest.len() {
        return Err(SyncError::table(
            table,
            format!(
                "content compare row count diverged [source: {}] [target: {}]",
                src.len(),
                dest.len()
            ),
        ));
    }

    let mut updates = Vec::with_capacity(src.len());
    for i in 0..src.len() {
        let src_row = src.row(i);
        let dest_row = dest.row(i);
        match src_row.compare(dest_row) {
            Some(Ordering::Equal) => {}
            Some(_) => {
                return Err(SyncError::table(
                    table,
                    format!("content compare key misaligned at {}", i),
                ))
            }
            None => {
                return Err(SyncError::type_mismatch(
                    table,
                    format!("incomparable content compare rows at {}", i),
                ))
            }
        }
        let (Some(src_check), Some(dest_check)) = (src_row.check_value(), dest_row.check_value())
        else {
            return Err(SyncError::table(table, "content hash column missing"));
        };
        updates.push(src_check.compare(dest_check) != Some(Ordering::Equal));
    }
    Ok(updates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::batch::Row;
    use crate::core::value::{Field, FieldValue, TypeTag};

    fn keys(values: &[i64]) -> KeyTable {
        let mut table = KeyTable::new();
        for v in values {
            table.load_test_row(&["id"], &[TypeTag::Long], vec![FieldValue::Long(*v)]);
        }
        table.sort("test");
        table
    }

    fn check_row(key: i64, hash: &str) -> Row {
        Row::from_fields(
            vec![
                Field::new(TypeTag::Long, FieldValue::Long(key)),
                Field::new(TypeTag::Text, FieldValue::Text(hash.to_string())),
            ],
            true,
        )
    }

    fn check_batch(rows: Vec<Row>) -> RowBatch {
        let mut batch = RowBatch::new(true);
        for row in rows {
            batch.push_test_row(row);
        }
        batch
    }

    #[test]
    fn test_disjoint_sides() {
        let mut src = keys(&[1, 2]);
        let mut dest = keys(&[]);
        let counts = compare_keys("t", &mut src, &mut dest).unwrap();
        assert_eq!(
            counts,
            DiffCounts {
                only_source: 2,
                common: 0,
                only_target: 0
            }
        );
        assert_eq!(src.flagged(true).collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn test_mixed_sides() {
        let mut src = keys(&[1, 3]);
        let mut dest = keys(&[2, 3]);
        let counts = compare_keys("t", &mut src, &mut dest).unwrap();
        assert_eq!(
            counts,
            DiffCounts {
                only_source: 1,
                common: 1,
                only_target: 1
            }
        );
        assert_eq!(src.flagged(true).collect::<Vec<_>>(), vec![0]);
        assert_eq!(dest.flagged(true).collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn test_counts_partition_both_sides() {
        let mut src = keys(&[1, 2, 4, 6, 9]);
        let mut dest = keys(&[2, 3, 4, 9, 10, 11]);
        let counts = compare_keys("t", &mut src, &mut dest).unwrap();
        assert_eq!(counts.only_source + counts.common, src.len());
        assert_eq!(counts.only_target + counts.common, dest.len());
        // Flag sets are disjoint from the common set by construction.
        assert_eq!(src.count_flag(false), counts.common);
        assert_eq!(dest.count_flag(false), counts.common);
    }

    #[test]
    fn test_drain_marks_remainder() {
        let mut src = keys(&[1, 2, 3, 4]);
        let mut dest = keys(&[1]);
        let counts = compare_keys("t", &mut src, &mut dest).unwrap();
        assert_eq!(counts.only_source, 3);
        assert_eq!(counts.only_target, 0);
        assert_eq!(src.flagged(true).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_type_mismatch_is_an_error() {
        let mut src = keys(&[1]);
        let mut dest = KeyTable::new();
        dest.load_test_row(&["id"], &[TypeTag::Text], vec![FieldValue::Text("1".into())]);
        dest.sort("test");
        let err = compare_keys("t", &mut src, &mut dest).unwrap_err();
        assert!(matches!(err, SyncError::TypeMismatch { .. }));
    }

    #[test]
    fn test_pair_checks_flags_divergent_hashes() {
        let src = check_batch(vec![check_row(1, "aaa"), check_row(2, "bbb")]);
        let dest = check_batch(vec![check_row(1, "aaa"), check_row(2, "zzz")]);
        let updates = pair_checks("t", &src, &dest).unwrap();
        assert_eq!(updates, vec![false, true]);
    }

    #[test]
    fn test_pair_checks_after_reindexing_unordered_batches() {
        // Server returned the rows of both windows in different orders.
        let mut src = check_batch(vec![check_row(2, "b"), check_row(1, "a")]);
        let mut dest = check_batch(vec![check_row(1, "a"), check_row(2, "x")]);
        src.sort_rows();
        dest.sort_rows();
        let updates = pair_checks("t", &src, &dest).unwrap();
        assert_eq!(updates, vec![false, true]);
    }

    #[test]
    fn test_update_flag_lifecycle() {
        // Both sides hold {1, 2}; the content hash diverges on key 2 only.
        let mut src = keys(&[1, 2]);
        let mut dest = keys(&[1, 2]);
        let counts = compare_keys("t", &mut src, &mut dest).unwrap();
        assert_eq!(counts.common, 2);

        // Flip so the common keys are walked by the content compare.
        src.revert_flags();
        let window: Vec<usize> = src.flagged(true).collect();
        assert_eq!(window, vec![0, 1]);

        let src_batch = check_batch(vec![check_row(1, "X"), check_row(2, "Y")]);
        let dest_batch = check_batch(vec![check_row(1, "X"), check_row(2, "Z")]);
        let updates = pair_checks("t", &src_batch, &dest_batch).unwrap();
        for (pos, needs_update) in window.iter().zip(updates) {
            src.set_flag(*pos, needs_update);
        }

        assert_eq!(src.count_flag(true), 1);
        assert_eq!(src.flagged(true).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_pair_checks_rejects_misaligned_keys() {
        let src = check_batch(vec![check_row(1, "a")]);
        let dest = check_batch(vec![check_row(2, "a")]);
        assert!(pair_checks("t", &src, &dest).is_err());
    }

    #[test]
    fn test_pair_checks_rejects_size_divergence() {
        let src = check_batch(vec![check_row(1, "a")]);
        let dest = check_batch(vec![]);
        assert!(pair_checks("t", &src, &dest).is_err());
    }
}
