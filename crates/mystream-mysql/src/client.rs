//! Binlog replication client backed by `mysql_async`.

use std::future::Future;

use futures::StreamExt;
use mysql_async::prelude::*;
use mysql_async::{BinlogStreamRequest, Conn, Row};
use mystream_core::{
    Error, Flavor, Position, ReplicationClient, ReplicationSession, Result, RowHandler,
    RowsNotification, SessionConfig, TableSchema,
};
use tracing::{debug, info, warn};

use crate::binlog::{decode_rows_event, DecodedRows};
use crate::column_cache::{fetch_columns, ColumnCache};
use crate::connect::connect_mysql;
use crate::error::{MySqlError, MySqlResult};
use crate::snapshot::replay_tables;

/// Opens replication sessions against a MySQL or MariaDB source.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlReplicationClient;

impl MySqlReplicationClient {
    pub fn new() -> Self {
        Self
    }
}

impl ReplicationClient for MySqlReplicationClient {
    type Session = MySqlSession;

    fn open(&self, config: &SessionConfig) -> impl Future<Output = Result<MySqlSession>> + Send {
        let config = config.clone();
        async move {
            let conn = connect_mysql(&config)
                .await
                .map_err(|e| Error::Connection(e.to_string()))?;

            info!(
                addr = %config.addr,
                server_version = ?conn.server_version(),
                "Connected to source"
            );

            Ok(MySqlSession {
                config,
                conn: Some(conn),
                columns: ColumnCache::new(),
            })
        }
    }
}

/// A replication session.
///
/// Holds a control connection for metadata queries and snapshots. The
/// binlog stream runs on a second connection opened per run.
pub struct MySqlSession {
    config: SessionConfig,
    conn: Option<Conn>,
    columns: ColumnCache,
}

impl MySqlSession {
    fn conn(&mut self) -> MySqlResult<&mut Conn> {
        self.conn.as_mut().ok_or(MySqlError::Closed)
    }

    async fn binlog_position(&mut self) -> MySqlResult<Position> {
        let conn = self.conn()?;

        // MySQL 8.2 renamed SHOW MASTER STATUS.
        let row: Option<Row> = match conn.query_first("SHOW BINARY LOG STATUS").await {
            Ok(row) => row,
            Err(_) => conn.query_first("SHOW MASTER STATUS").await?,
        };

        let row = row.ok_or(MySqlError::BinlogDisabled)?;
        let name: String = row.get(0).unwrap_or_default();
        let pos: u64 = row.get(1).unwrap_or(4);

        if name.is_empty() {
            return Err(MySqlError::BinlogDisabled);
        }

        Ok(Position::new(name, pos))
    }

    async fn stream_from<H: RowHandler>(&mut self, position: Position, handler: &H) -> Result<()> {
        let mut binlog_conn = connect_mysql(&self.config).await?;

        if self.config.flavor == Flavor::MariaDb {
            binlog_conn
                .query_drop("SET @mariadb_slave_capability = 4")
                .await
                .map_err(MySqlError::from)?;
        }

        let request = BinlogStreamRequest::new(self.config.server_id)
            .with_filename(position.name.as_bytes())
            .with_pos(position.pos);
        let mut stream = binlog_conn
            .get_binlog_stream(request)
            .await
            .map_err(MySqlError::from)?;

        info!(
            position = %position,
            server_id = self.config.server_id,
            "Streaming binlog"
        );

        while let Some(event) = stream.next().await {
            let event = event.map_err(MySqlError::from)?;
            let Some(rows) = decode_rows_event(&stream, &event)? else {
                continue;
            };

            let notification = self.attach_columns(rows).await?;
            handler.on_rows(notification).await?;
        }

        warn!("Binlog stream ended");
        Ok(())
    }

    /// Name the columns of decoded rows.
    ///
    /// Only tables of the captured database are looked up; other tables
    /// are passed on without column names.
    async fn attach_columns(&mut self, rows: DecodedRows) -> MySqlResult<RowsNotification> {
        let columns = if rows.schema == self.config.database {
            self.columns_for(&rows.schema, &rows.table, rows.width()).await?
        } else {
            Vec::new()
        };

        Ok(RowsNotification {
            table: TableSchema::new(rows.schema, rows.table, columns),
            kind: rows.kind,
            rows: rows.images,
        })
    }

    async fn columns_for(&mut self, schema: &str, table: &str, width: usize) -> MySqlResult<Vec<String>> {
        if let Some(columns) = self.columns.get(schema, table, width) {
            return Ok(columns.to_vec());
        }

        let columns = fetch_columns(self.conn()?, schema, table).await?;
        if columns.len() != width {
            debug!(
                schema,
                table,
                columns = columns.len(),
                width,
                "Column count differs from row width"
            );
        }
        self.columns.insert(schema, table, columns.clone());
        Ok(columns)
    }
}

impl ReplicationSession for MySqlSession {
    fn current_position(&mut self) -> impl Future<Output = Result<Position>> + Send {
        async move { Ok(self.binlog_position().await?) }
    }

    fn run_from_snapshot<H: RowHandler>(
        &mut self,
        handler: &H,
    ) -> impl Future<Output = Result<()>> + Send {
        async move {
            let position = self.binlog_position().await?;
            info!(
                position = %position,
                tables = ?self.config.tables,
                "Starting snapshot"
            );

            let conn = self.conn.as_mut().ok_or(MySqlError::Closed)?;
            replay_tables(
                conn,
                &mut self.columns,
                &self.config.database,
                &self.config.tables,
                handler,
            )
            .await?;

            self.stream_from(position, handler).await
        }
    }

    fn run_from_position<H: RowHandler>(
        &mut self,
        position: Position,
        handler: &H,
    ) -> impl Future<Output = Result<()>> + Send {
        async move { self.stream_from(position, handler).await }
    }

    fn close(&mut self) -> impl Future<Output = Result<()>> + Send {
        let conn = self.conn.take();
        async move {
            if let Some(conn) = conn {
                conn.disconnect().await.map_err(MySqlError::from)?;
                debug!("Control connection closed");
            }
            Ok(())
        }
    }
}
