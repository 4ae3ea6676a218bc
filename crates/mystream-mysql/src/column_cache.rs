//! Cache of table column names.
//!
//! Binlog table maps carry column types but not names, so names are looked
//! up once per table and refreshed when a row's width no longer matches.

use std::collections::HashMap;

use mysql_async::prelude::*;
use mysql_async::Conn;
use tracing::debug;

use crate::error::MySqlResult;

const COLUMNS_QUERY: &str = r"
    SELECT COLUMN_NAME
    FROM INFORMATION_SCHEMA.COLUMNS
    WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
    ORDER BY ORDINAL_POSITION
";

/// Look up a table's column names in ordinal order.
pub async fn fetch_columns(conn: &mut Conn, schema: &str, table: &str) -> MySqlResult<Vec<String>> {
    let columns: Vec<String> = conn.exec(COLUMNS_QUERY, (schema, table)).await?;
    debug!(schema, table, count = columns.len(), "Fetched column names");
    Ok(columns)
}

#[derive(Debug, Default)]
pub struct ColumnCache {
    tables: HashMap<(String, String), Vec<String>>,
}

impl ColumnCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached columns for a table, if they still fit a row of `width` values.
    pub fn get(&self, schema: &str, table: &str, width: usize) -> Option<&[String]> {
        self.tables
            .get(&(schema.to_string(), table.to_string()))
            .filter(|columns| columns.len() == width)
            .map(Vec::as_slice)
    }

    pub fn insert(&mut self, schema: &str, table: &str, columns: Vec<String>) {
        self.tables
            .insert((schema.to_string(), table.to_string()), columns);
    }
}
