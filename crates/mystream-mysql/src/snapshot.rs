//! Snapshot replay of existing table contents.
//!
//! Each configured table is read in pages inside one consistent-snapshot
//! transaction and handed on as insert notifications. Tables with a
//! primary key are paged by key (`WHERE (pk) > (last) ORDER BY pk`);
//! keyless tables fall back to offsets over a full-row ordering.

use mysql_async::prelude::*;
use mysql_async::{Conn, Row, Value as SqlValue};
use mystream_core::{MutationKind, Result, RowHandler, RowImage, RowsNotification, TableSchema};
use tracing::{debug, info};

use crate::column_cache::{fetch_columns, ColumnCache};
use crate::convert::convert_value;
use crate::error::{MySqlError, MySqlResult};

/// Rows per page.
pub const SNAPSHOT_BATCH_SIZE: u64 = 1000;

const PRIMARY_KEY_QUERY: &str = r"
    SELECT COLUMN_NAME
    FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
    WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND CONSTRAINT_NAME = 'PRIMARY'
    ORDER BY ORDINAL_POSITION
";

/// Look up a table's primary key columns in key order.
pub async fn fetch_primary_key(conn: &mut Conn, schema: &str, table: &str) -> MySqlResult<Vec<String>> {
    let key: Vec<String> = conn.exec(PRIMARY_KEY_QUERY, (schema, table)).await?;
    debug!(schema, table, key = ?key, "Fetched primary key");
    Ok(key)
}

/// How a table is walked page by page.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Paging {
    /// Key columns and their positions in a row.
    Keyset { key: Vec<String>, positions: Vec<usize> },
    Offset,
}

impl Paging {
    fn new(key: Vec<String>, columns: &[String]) -> Self {
        let positions: Vec<usize> = key
            .iter()
            .filter_map(|k| columns.iter().position(|c| c == k))
            .collect();

        if key.is_empty() || positions.len() != key.len() {
            Paging::Offset
        } else {
            Paging::Keyset { key, positions }
        }
    }
}

/// Replay every table as insert notifications.
pub async fn replay_tables<H: RowHandler>(
    conn: &mut Conn,
    columns: &mut ColumnCache,
    database: &str,
    tables: &[String],
    handler: &H,
) -> Result<()> {
    conn.query_drop("START TRANSACTION WITH CONSISTENT SNAPSHOT")
        .await
        .map_err(MySqlError::from)?;

    for table in tables {
        let table_columns = fetch_columns(conn, database, table).await?;
        columns.insert(database, table, table_columns.clone());

        let key = fetch_primary_key(conn, database, table).await?;
        let paging = Paging::new(key, &table_columns);

        let rows = replay_table(conn, database, table, &table_columns, &paging, handler).await?;
        info!(database, table = %table, rows, "Snapshot of table complete");
    }

    conn.query_drop("COMMIT").await.map_err(MySqlError::from)?;
    Ok(())
}

async fn replay_table<H: RowHandler>(
    conn: &mut Conn,
    database: &str,
    table: &str,
    columns: &[String],
    paging: &Paging,
    handler: &H,
) -> Result<u64> {
    let mut total = 0u64;
    let mut last_key: Option<Vec<SqlValue>> = None;

    loop {
        let (query, params) = match (paging, &last_key) {
            (Paging::Keyset { key, .. }, None) => (first_page_query(database, table, key), Vec::new()),
            (Paging::Keyset { key, .. }, Some(last)) => {
                (next_page_query(database, table, key), last.clone())
            }
            (Paging::Offset, _) => (
                offset_page_query(database, table, columns),
                vec![SqlValue::from(total)],
            ),
        };

        let rows: Vec<Row> = conn
            .exec(query.as_str(), params)
            .await
            .map_err(MySqlError::from)?;

        let fetched = rows.len() as u64;
        debug!(database, table, total, fetched, "Fetched snapshot page");

        if let Paging::Keyset { positions, .. } = paging {
            if let Some(row) = rows.last() {
                last_key = Some(
                    positions
                        .iter()
                        .map(|&i| row.as_ref(i).cloned().unwrap_or(SqlValue::NULL))
                        .collect(),
                );
            }
        }

        if fetched > 0 {
            let images: Vec<RowImage> = rows
                .into_iter()
                .map(|row| row.unwrap().into_iter().map(convert_value).collect())
                .collect();

            handler
                .on_rows(RowsNotification {
                    table: TableSchema::new(database, table, columns.iter().cloned()),
                    kind: MutationKind::Insert,
                    rows: images,
                })
                .await?;
        }

        total += fetched;
        if fetched < SNAPSHOT_BATCH_SIZE {
            return Ok(total);
        }
    }
}

fn first_page_query(database: &str, table: &str, key: &[String]) -> String {
    format!(
        "SELECT * FROM {}.{} ORDER BY {} LIMIT {}",
        quote_ident(database),
        quote_ident(table),
        ident_list(key),
        SNAPSHOT_BATCH_SIZE
    )
}

fn next_page_query(database: &str, table: &str, key: &[String]) -> String {
    let placeholders = vec!["?"; key.len()].join(", ");
    format!(
        "SELECT * FROM {}.{} WHERE ({}) > ({}) ORDER BY {} LIMIT {}",
        quote_ident(database),
        quote_ident(table),
        ident_list(key),
        placeholders,
        ident_list(key),
        SNAPSHOT_BATCH_SIZE
    )
}

fn offset_page_query(database: &str, table: &str, columns: &[String]) -> String {
    format!(
        "SELECT * FROM {}.{} ORDER BY {} LIMIT {} OFFSET ?",
        quote_ident(database),
        quote_ident(table),
        ident_list(columns),
        SNAPSHOT_BATCH_SIZE
    )
}

fn ident_list(idents: &[String]) -> String {
    idents
        .iter()
        .map(|ident| quote_ident(ident))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Quote an identifier with backticks.
pub fn quote_ident(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}
