//! Schema metadata loaded from `information_schema`.
//!
//! The CAST AS CHAR projections guard against collation-dependent column
//! types some servers report for information_schema results.

use std::collections::{BTreeMap, BTreeSet};

use sqlx::mysql::MySqlRow;
use sqlx::Row as _;
use tracing::info;

use crate::core::schema::{ColumnDescriptor, TableMetadata};
use crate::db::session::TableConnection;
use crate::error::Result;

const SQL_TABLES: &str = r#"
SELECT CAST(table_name AS CHAR(255)) AS name
FROM information_schema.tables
WHERE table_schema = ? AND table_type = 'BASE TABLE'
ORDER BY 1
"#;

const SQL_COLUMNS: &str = r#"
SELECT
    CAST(c.column_name AS CHAR(255)) AS name,
    CAST(c.column_type AS CHAR(255)) AS sql_type,
    IF(c.is_nullable = 'YES', 1, 0) AS nullable,
    EXISTS(
        SELECT * FROM information_schema.key_column_usage k
        WHERE k.constraint_name = 'PRIMARY'
          AND k.table_schema = c.table_schema
          AND k.table_name = c.table_name
          AND k.column_name = c.column_name
    ) AS pk
FROM information_schema.columns c
WHERE c.table_schema = ? AND c.table_name = ?
ORDER BY c.ordinal_position
"#;

impl TableConnection {
    /// List the base tables of this session's schema, ordered by name.
    pub async fn load_tables(&mut self) -> Result<Vec<String>> {
        let schema = self.schema().to_string();
        let result = sqlx::query(SQL_TABLES)
            .bind(&schema)
            .fetch_all(self.connection())
            .await;
        let rows: Vec<MySqlRow> = self.track("load tables", result)?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in &rows {
            let name = self.track("load tables", row.try_get::<String, _>("name"))?;
            tables.push(name);
        }
        info!(
            "<{}> {} base tables in schema `{}`",
            self.reference(),
            tables.len(),
            schema
        );
        Ok(tables)
    }

    /// Load column descriptors for every table in `tables`.
    pub async fn load_metadata(
        &mut self,
        tables: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, TableMetadata>> {
        let schema = self.schema().to_string();
        let mut map = BTreeMap::new();

        for table in tables {
            let result = sqlx::query(SQL_COLUMNS)
                .bind(&schema)
                .bind(table)
                .fetch_all(self.connection())
                .await;
            let rows: Vec<MySqlRow> = self.track("load metadata", result)?;

            let mut columns = Vec::with_capacity(rows.len());
            for row in &rows {
                columns.push(ColumnDescriptor {
                    name: self.track("load metadata", row.try_get::<String, _>("name"))?,
                    sql_type: self.track("load metadata", row.try_get::<String, _>("sql_type"))?,
                    nullable: self.track("load metadata", row.try_get::<i64, _>("nullable"))? != 0,
                    primary_key: self.track("load metadata", row.try_get::<i64, _>("pk"))? != 0,
                });
            }
            map.insert(table.clone(), TableMetadata { columns });
        }

        Ok(map)
    }

    /// Dump the loaded metadata at info level.
    pub fn log_table_info(&self, metadata: &BTreeMap<String, TableMetadata>) {
        info!("<{}> metadata information", self.reference());
        for (table, meta) in metadata {
            info!("`{}` [columns: {}]", table, meta.columns.len());
            for column in &meta.columns {
                info!("  {}", column);
            }
        }
    }
}
