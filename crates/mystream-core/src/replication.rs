//! Contract between the connector and a binlog replication client.
//!
//! A client opens a [`ReplicationSession`], which streams decoded rows
//! events into a [`RowHandler`] until it fails or its future is dropped.

use std::fmt;
use std::future::Future;
use std::str::FromStr;

use crate::error::Result;
use crate::types::RowsNotification;

/// Source database dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flavor {
    #[default]
    MySql,
    MariaDb,
}

impl Flavor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Flavor::MySql => "mysql",
            Flavor::MariaDb => "mariadb",
        }
    }
}

impl FromStr for Flavor {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mysql" => Ok(Flavor::MySql),
            "mariadb" => Ok(Flavor::MariaDb),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// TLS settings for the source connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TlsOptions {
    pub enabled: bool,
    /// Accept any server certificate. Only honoured when `enabled` is set.
    pub skip_verify: bool,
}

/// A binlog coordinate: log file name plus byte offset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Position {
    pub name: String,
    pub pos: u64,
}

impl Position {
    pub fn new(name: impl Into<String>, pos: u64) -> Self {
        Self {
            name: name.into(),
            pos,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.pos)
    }
}

/// Port assumed when an address has none.
pub const DEFAULT_MYSQL_PORT: u16 = 3306;

/// Split `host:port` into its parts, defaulting the port.
///
/// IPv6 hosts may be bracketed (`[::1]:3306`). Returns `None` for an empty
/// host or a port that is not a number.
pub fn split_addr(addr: &str) -> Option<(String, u16)> {
    let addr = addr.trim();
    if addr.is_empty() {
        return None;
    }

    match addr.rsplit_once(':') {
        Some((host, port)) => {
            let host = host.trim_start_matches('[').trim_end_matches(']');
            if host.is_empty() {
                return None;
            }
            let port = port.parse::<u16>().ok()?;
            Some((host.to_string(), port))
        }
        None => Some((addr.to_string(), DEFAULT_MYSQL_PORT)),
    }
}

/// Everything a client needs to open a replication session.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Replica identity announced to the source. Must be unique per source.
    pub server_id: u32,
    /// `host:port` of the source.
    pub addr: String,
    pub user: String,
    pub password: String,
    /// Database whose tables are captured.
    pub database: String,
    /// Tables replayed by a snapshot.
    pub tables: Vec<String>,
    pub flavor: Flavor,
    pub tls: TlsOptions,
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("server_id", &self.server_id)
            .field("addr", &self.addr)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .field("tables", &self.tables)
            .field("flavor", &self.flavor)
            .field("tls", &self.tls)
            .finish()
    }
}

/// Receives decoded rows events from a replication session.
///
/// The session awaits each call before decoding further events, so a
/// handler that waits also pauses the stream.
pub trait RowHandler: Send + Sync {
    /// Handle one rows event. An error ends the session's run.
    fn on_rows(&self, notification: RowsNotification) -> impl Future<Output = Result<()>> + Send;
}

/// Factory for replication sessions.
pub trait ReplicationClient: Send + Sync + 'static {
    type Session: ReplicationSession;

    /// Connect to the source. Fails if the source is unreachable or rejects
    /// the credentials.
    fn open(&self, config: &SessionConfig) -> impl Future<Output = Result<Self::Session>> + Send;
}

/// A live connection to the source database.
pub trait ReplicationSession: Send + 'static {
    /// The source's current binlog coordinate.
    fn current_position(&mut self) -> impl Future<Output = Result<Position>> + Send;

    /// Replay the configured tables as insert events, then stream the live
    /// binlog from the coordinate taken before the replay started.
    fn run_from_snapshot<H: RowHandler>(
        &mut self,
        handler: &H,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Stream the binlog starting at `position`, without a snapshot.
    fn run_from_position<H: RowHandler>(
        &mut self,
        position: Position,
        handler: &H,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Release the connection.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}
