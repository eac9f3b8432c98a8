//! Per-worker database session facade.
//!
//! Each worker owns exactly two `TableConnection`s (source and target) for
//! its whole lifetime. The five statement families keep their last built SQL
//! shape and rebuild it only when the bulk width changes; the driver's
//! per-connection statement cache keeps each shape prepared across calls.

use sqlx::mysql::{MySql, MySqlArguments, MySqlConnection, MySqlConnectOptions, MySqlRow};
use sqlx::query::Query;
use sqlx::ConnectOptions;
use tracing::{debug, error, info, warn};

use crate::config::EndpointConfig;
use crate::core::batch::{Row, RowBatch};
use crate::core::keys::KeyTable;
use crate::core::schema::TableMetadata;
use crate::core::value::TypeTag;
use crate::db::sql;
use crate::error::{Result, SyncError};

/// One cached statement shape, keyed by its bulk width.
#[derive(Debug, Default)]
struct CachedShape {
    width: usize,
    sql: String,
}

/// A single database session plus its statement shapes.
pub struct TableConnection {
    reference: &'static str,
    endpoint: EndpointConfig,
    conn: MySqlConnection,
    select_shape: CachedShape,
    compare_shape: CachedShape,
    insert_shape: String,
    update_shape: String,
    delete_shape: String,
    key_width: usize,
}

impl TableConnection {
    /// Open a session against one endpoint. `reference` labels every log
    /// line produced by this session (`source` or `target`).
    pub async fn open(reference: &'static str, endpoint: &EndpointConfig) -> Result<Self> {
        let options = MySqlConnectOptions::new()
            .host(&endpoint.host)
            .port(endpoint.port)
            .username(&endpoint.user)
            .password(&endpoint.password)
            .database(&endpoint.schema);

        let conn = options.connect().await.map_err(|e| {
            error!("<{}> connect {} failed: {}", reference, endpoint.address(), e);
            SyncError::Db(e)
        })?;

        info!("<{}> connected {}", reference, endpoint.address());

        Ok(Self {
            reference,
            endpoint: endpoint.clone(),
            conn,
            select_shape: CachedShape::default(),
            compare_shape: CachedShape::default(),
            insert_shape: String::new(),
            update_shape: String::new(),
            delete_shape: String::new(),
            key_width: 0,
        })
    }

    pub fn reference(&self) -> &str {
        self.reference
    }

    pub fn schema(&self) -> &str {
        &self.endpoint.schema
    }

    pub(crate) fn connection(&mut self) -> &mut MySqlConnection {
        &mut self.conn
    }

    pub(crate) fn track<T>(&self, op: &str, result: sqlx::Result<T>) -> Result<T> {
        result.map_err(|e| {
            error!("<{}> [{}] error: {}", self.reference, op, e);
            SyncError::Db(e)
        })
    }

    /// Execute a plain statement through the text protocol.
    pub async fn exec(&mut self, statement: &str) -> Result<()> {
        let _ = statement;
        Ok(())
    }

    /// Session-level write settings issued once per worker on the target.
    ///
    /// These are session-scoped and expire with the connection.
    pub async fn init_write_session(&mut self, disable_binlog: bool) -> Result<()> {
        self.exec("SET @OLD_UNIQUE_CHECKS=@@UNIQUE_CHECKS, UNIQUE_CHECKS=0")
            .await?;
        self.exec("SET @OLD_FOREIGN_KEY_CHECKS=@@FOREIGN_KEY_CHECKS, FOREIGN_KEY_CHECKS=0")
            .await?;
        if disable_binlog {
            self.exec("SET SESSION SQL_LOG_BIN=0").await?;
        }
        Ok(())
    }

    pub async fn begin(&mut self) -> Result<()> {
        self.exec("START TRANSACTION").await
    }

    pub async fn commit(&mut self) -> Result<()> {
        self.exec("COMMIT").await
    }

    pub async fn rollback(&mut self) -> Result<()> {
        self.exec("ROLLBACK").await
    }

    /// Stream every primary key of `table` into `keys`, paging by `bulk`
    /// rows until a short page arrives.
    pub async fn load_keys(
        &mut self,
        table: &str,
        meta: &TableMetadata,
        bulk: usize,
        keys: &mut KeyTable,
    ) -> Result<()> {
        let tags = meta.pk_tags();
        loop {
            let sql = sql::key_page_sql(table, meta, false, bulk, keys.len())?;
            let result = sqlx::query(&sql).fetch_all(&mut self.conn).await;
            let rows = self.track("key load", result)?;
            let page = rows.len();
            for row in &rows {
                let result = keys.load_row(row, &tags);
                self.track("key decode", result)?;
            }
            debug!(
                "<{}> `{}` key loading [{}]",
                self.reference,
                table,
                keys.len()
            );
            if page < bulk {
                break;
            }
        }
        Ok(())
    }

    /// Rebuild the bulk-select shape for a new width.
    pub fn select_prepare(&mut self, table: &str, pk_names: &[String], bulk: usize) -> Result<()> {
        self.select_shape = CachedShape {
            width: bulk,
            sql: sql::bulk_select_sql(table, pk_names, bulk)?,
        };
        self.key_width = pk_names.len();
        Ok(())
    }

    /// Fetch full rows for the key positions of the current select shape.
    ///
    /// Binds exactly `width × K` placeholders; when `positions` runs short
    /// the remaining tuple slots are padded with NULLs, which match no row.
    /// Returned rows are appended to `into` in server order, which is not
    /// guaranteed to follow the requested key order.
    pub async fn select_execute(
        &mut self,
        keys: &KeyTable,
        positions: &[usize],
        tags: &[TypeTag],
        into: &mut RowBatch,
    ) -> Result<()> {
        debug_assert!(positions.len() <= self.select_shape.width);
        let sql = self.select_shape.sql.clone();
        let width = self.select_shape.width;
        self.fetch_by_keys("bulk select", &sql, width, keys, positions, tags, into)
            .await
    }

    /// Rebuild the content-compare shape for a new width.
    pub fn compare_prepare(&mut self, table: &str, meta: &TableMetadata, bulk: usize) -> Result<()> {
        self.compare_shape = CachedShape {
            width: bulk,
            sql: sql::compare_select_sql(table, meta, bulk)?,
        };
        self.key_width = meta.key_width();
        Ok(())
    }

    /// Fetch `(keys…, hash)` rows for the key positions of the current
    /// compare shape. Ordering is not guaranteed; the caller re-indexes.
    pub async fn compare_execute(
        &mut self,
        keys: &KeyTable,
        positions: &[usize],
        pk_tags: &[TypeTag],
        into: &mut RowBatch,
    ) -> Result<()> {
        debug_assert!(positions.len() <= self.compare_shape.width);
        let sql = self.compare_shape.sql.clone();
        let width = self.compare_shape.width;
        self.fetch_by_keys("compare select", &sql, width, keys, positions, pk_tags, into)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn fetch_by_keys(
        &mut self,
        op: &str,
        sql: &str,
        width: usize,
        keys: &KeyTable,
        positions: &[usize],
        tags: &[TypeTag],
        into: &mut RowBatch,
    ) -> Result<()> {
        let mut query = sqlx::query(sql);
        for pos in positions {
            query = keys.bind_at(query, *pos);
        }
        for _ in positions.len()..width {
            query = bind_null_tuple(query, self.key_width);
        }
        let result = query.fetch_all(&mut self.conn).await;
        let rows: Vec<MySqlRow> = self.track(op, result)?;
        for row in &rows {
            let result = into.load_row(row, tags);
            self.track(op, result)?;
        }
        Ok(())
    }

    /// Rebuild the insert shape for a table.
    pub fn insert_prepare(&mut self, table: &str, column_count: usize) -> Result<()> {
        self.insert_shape = sql::insert_sql(table, column_count)?;
        Ok(())
    }

    /// Insert one full row.
    pub async fn insert_execute(&mut self, row: &Row) -> Result<()> {
        let sql = self.insert_shape.clone();
        let mut query = sqlx::query(&sql);
        for field in row.fields() {
            query = field.bind_to(query);
        }
        let result = query.execute(&mut self.conn).await;
        self.track("insert", result)?;
        Ok(())
    }

    /// Rebuild the update shape from the observed full column list.
    pub fn update_prepare(&mut self, table: &str, keys: &[String], columns: &[String]) -> Result<()> {
        if columns.len() < keys.len() || columns[..keys.len()] != *keys {
            warn!(
                "<{}> `{}` key columns are not leading; positional update binding \
                 requires the primary key first in declaration order",
                self.reference, table
            );
        }
        self.update_shape = sql::update_sql(table, keys, columns)?;
        self.key_width = keys.len();
        Ok(())
    }

    /// Update one row: the key prefix is rotated to the tail so fields map
    /// positionally onto SET values then WHERE keys.
    pub async fn update_execute(&mut self, row: &mut Row) -> Result<()> {
        row.rotate(self.key_width);
        let sql = self.update_shape.clone();
        let mut query = sqlx::query(&sql);
        for field in row.fields() {
            query = field.bind_to(query);
        }
        let result = query.execute(&mut self.conn).await;
        self.track("update", result)?;
        Ok(())
    }

    /// Rebuild the delete shape for a table.
    pub fn delete_prepare(&mut self, table: &str, keys: &[String]) -> Result<()> {
        self.delete_shape = sql::delete_sql(table, keys)?;
        Ok(())
    }

    /// Delete the key at sorted position `pos` of a key table.
    pub async fn delete_execute(&mut self, keys: &KeyTable, pos: usize) -> Result<()> {
        let sql = self.delete_shape.clone();
        let query = keys.bind_at(sqlx::query(&sql), pos);
        let result = query.execute(&mut self.conn).await;
        self.track("delete", result)?;
        Ok(())
    }
}

fn bind_null_tuple(
    mut query: Query<'_, MySql, MySqlArguments>,
    key_width: usize,
) -> Query<'_, MySql, MySqlArguments> {
    for _ in 0..key_width {
        query = query.bind(Option::<String>::None);
    }
    query
}
