//! SQL text generation for the five statement families.
//!
//! Identifiers are backtick-quoted with doubling. The NULL sentinel inside
//! the hash payload and the hash alias are fixed literals shared with every
//! MySQL-compatible server this tool talks to.

use crate::core::schema::TableMetadata;
use crate::core::value::NULL_SENTINEL;
use crate::error::{Result, SyncError};

/// Alias of the projected content-hash column.
pub const MD5_CHECK_ALIAS: &str = "#MD5@CHECK#";

/// Maximum identifier length accepted (MySQL allows 64; padded for safety).
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier before it is spliced into SQL text.
///
/// Identifiers cannot be parameterized, so reject empty names, embedded null
/// bytes and absurd lengths outright.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SyncError::Config("identifier cannot be empty".to_string()));
    }
    if name.contains('\0') {
        return Err(SyncError::Config(format!(
            "identifier contains null byte: {:?}",
            name
        )));
    }
    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(SyncError::Config(format!(
            "identifier exceeds {} bytes: {:?}",
            MAX_IDENTIFIER_LENGTH, name
        )));
    }
    Ok(())
}

/// Quote an identifier with backticks, doubling embedded backticks.
pub fn quote_ident(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("`{}`", name.replace('`', "``")))
}

fn quoted_list(names: &[String]) -> Result<String> {
    let quoted: Result<Vec<String>> = names.iter().map(|n| quote_ident(n)).collect();
    Ok(quoted?.join(","))
}

/// Key-scan projection for one table side.
///
/// `SELECT pk1,…,pkK [, MD5(CONCAT(COALESCE(c1,'∅'),…)) AS `#MD5@CHECK#`]
/// FROM t`. The hash tail is emitted only when a content check is requested
/// and the table has non-key columns to hash. Callers append paging or a
/// key-IN restriction.
pub fn key_select_sql(table: &str, meta: &TableMetadata, with_check: bool) -> Result<String> {
    let mut sql = format!("SELECT {}", quoted_list(&meta.pk_names())?);
    let payload = meta.non_pk_names();
    if with_check && !payload.is_empty() {
        let coalesced: Result<Vec<String>> = payload
            .iter()
            .map(|name| Ok(format!("COALESCE({},'{}')", quote_ident(name)?, NULL_SENTINEL)))
            .collect();
        sql.push_str(&format!(
            ",MD5(CONCAT({})) AS {}",
            coalesced?.join(","),
            quote_ident(MD5_CHECK_ALIAS)?
        ));
    }
    sql.push_str(&format!(" FROM {}", quote_ident(table)?));
    Ok(sql)
}

/// Paged key-scan statement: the key projection plus `LIMIT bulk OFFSET n`.
pub fn key_page_sql(
    table: &str,
    meta: &TableMetadata,
    with_check: bool,
    bulk: usize,
    offset: usize,
) -> Result<String> {
    Ok(format!(
        "{} LIMIT {} OFFSET {}",
        key_select_sql(table, meta, with_check)?,
        bulk,
        offset
    ))
}

/// Key-tuple restriction: ` WHERE (pk1,…,pkK) IN ((?,…),(?,…),…)` with
/// exactly `bulk` tuples.
pub fn key_in_clause(pk_names: &[String], bulk: usize) -> Result<String> {
    debug_assert!(bulk > 0);
    let tuple = format!("({})", vec!["?"; pk_names.len()].join(","));
    let tuples = vec![tuple; bulk].join(",");
    Ok(format!(" WHERE ({}) IN ({})", quoted_list(pk_names)?, tuples))
}

/// Content-compare statement: key projection with hash tail, restricted to a
/// window of key tuples.
pub fn compare_select_sql(table: &str, meta: &TableMetadata, bulk: usize) -> Result<String> {
    Ok(format!(
        "{}{}",
        key_select_sql(table, meta, true)?,
        key_in_clause(&meta.pk_names(), bulk)?
    ))
}

/// Bulk full-row select by key tuples.
pub fn bulk_select_sql(table: &str, pk_names: &[String], bulk: usize) -> Result<String> {
    Ok(format!(
        "SELECT * FROM {}{}",
        quote_ident(table)?,
        key_in_clause(pk_names, bulk)?
    ))
}

/// Positional insert with one placeholder per column.
pub fn insert_sql(table: &str, column_count: usize) -> Result<String> {
    debug_assert!(column_count > 0);
    Ok(format!(
        "INSERT INTO {} VALUES({})",
        quote_ident(table)?,
        vec!["?"; column_count].join(",")
    ))
}

/// Positional update: SET over the non-key columns, WHERE over the keys.
///
/// `columns` is the observed full column list; the first `keys.len()`
/// entries are the key columns, so a row rotated by that count binds
/// positionally.
pub fn update_sql(table: &str, keys: &[String], columns: &[String]) -> Result<String> {
    debug_assert!(columns.len() > keys.len());
    let assignments: Result<Vec<String>> = columns[keys.len()..]
        .iter()
        .map(|name| Ok(format!("{}=?", quote_ident(name)?)))
        .collect();
    let conditions: Result<Vec<String>> = keys
        .iter()
        .map(|name| Ok(format!("{}=?", quote_ident(name)?)))
        .collect();
    Ok(format!(
        "UPDATE {} SET {} WHERE {}",
        quote_ident(table)?,
        assignments?.join(", "),
        conditions?.join(" AND ")
    ))
}

/// Key-bound delete.
pub fn delete_sql(table: &str, keys: &[String]) -> Result<String> {
    debug_assert!(!keys.is_empty());
    let conditions: Result<Vec<String>> = keys
        .iter()
        .map(|name| Ok(format!("{}=?", quote_ident(name)?)))
        .collect();
    Ok(format!(
        "DELETE FROM {} WHERE {}",
        quote_ident(table)?,
        conditions?.join(" AND ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::ColumnDescriptor;

    fn column(name: &str, sql_type: &str, pk: bool) -> ColumnDescriptor {
        ColumnDescriptor {
            name: name.to_string(),
            sql_type: sql_type.to_string(),
            nullable: !pk,
            primary_key: pk,
        }
    }

    fn meta() -> TableMetadata {
        TableMetadata {
            columns: vec![
                column("id", "int", true),
                column("name", "varchar(64)", false),
                column("note", "text", false),
            ],
        }
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("name").unwrap(), "`name`");
        assert_eq!(quote_ident("ta`ble").unwrap(), "`ta``ble`");
        assert!(quote_ident("").is_err());
        assert!(quote_ident("a\0b").is_err());
    }

    #[test]
    fn test_key_select_without_check() {
        let sql = key_select_sql("t", &meta(), false).unwrap();
        assert_eq!(sql, "SELECT `id` FROM `t`");
    }

    #[test]
    fn test_key_select_with_check() {
        let sql = key_select_sql("t", &meta(), true).unwrap();
        assert_eq!(
            sql,
            "SELECT `id`,MD5(CONCAT(COALESCE(`name`,'\u{2205}'),COALESCE(`note`,'\u{2205}'))) \
             AS `#MD5@CHECK#` FROM `t`"
        );
    }

    #[test]
    fn test_key_select_with_check_but_no_payload_columns() {
        let all_keys = TableMetadata {
            columns: vec![column("a", "int", true), column("b", "int", true)],
        };
        let sql = key_select_sql("t", &all_keys, true).unwrap();
        assert_eq!(sql, "SELECT `a`,`b` FROM `t`");
    }

    #[test]
    fn test_key_page_sql() {
        let sql = key_page_sql("t", &meta(), false, 1000, 5000).unwrap();
        assert_eq!(sql, "SELECT `id` FROM `t` LIMIT 1000 OFFSET 5000");
    }

    #[test]
    fn test_bulk_select_shape() {
        let keys = vec!["a".to_string(), "b".to_string()];
        let sql = bulk_select_sql("t", &keys, 3).unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM `t` WHERE (`a`,`b`) IN ((?,?),(?,?),(?,?))"
        );
    }

    #[test]
    fn test_compare_select_shape() {
        let sql = compare_select_sql("t", &meta(), 2).unwrap();
        assert!(sql.starts_with("SELECT `id`,MD5(CONCAT("));
        assert!(sql.ends_with(" WHERE (`id`) IN ((?),(?))"));
    }

    #[test]
    fn test_insert_sql() {
        assert_eq!(
            insert_sql("t", 3).unwrap(),
            "INSERT INTO `t` VALUES(?,?,?)"
        );
    }

    #[test]
    fn test_update_sql() {
        let keys = vec!["id".to_string()];
        let columns = vec!["id".to_string(), "name".to_string(), "note".to_string()];
        assert_eq!(
            update_sql("t", &keys, &columns).unwrap(),
            "UPDATE `t` SET `name`=?, `note`=? WHERE `id`=?"
        );
    }

    #[test]
    fn test_update_sql_composite_key() {
        let keys = vec!["a".to_string(), "b".to_string()];
        let columns = vec![
            "a".to_string(),
            "b".to_string(),
            "v".to_string(),
        ];
        assert_eq!(
            update_sql("t", &keys, &columns).unwrap(),
            "UPDATE `t` SET `v`=? WHERE `a`=? AND `b`=?"
        );
    }

    #[test]
    fn test_delete_sql() {
        let keys = vec!["a".to_string(), "b".to_string()];
        assert_eq!(
            delete_sql("t", &keys).unwrap(),
            "DELETE FROM `t` WHERE `a`=? AND `b`=?"
        );
    }
}
