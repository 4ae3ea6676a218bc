use std::fmt;

use crate::replication::{Flavor, SessionConfig, TlsOptions};

/// Validated connector configuration. Read-only once the input is built.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectorSettings {
    /// `host:port` of the source.
    pub addr: String,
    pub user: String,
    pub password: String,
    /// Database whose row changes are published.
    pub database: String,
    /// Tables replayed when starting from a snapshot.
    pub tables: Vec<String>,
    pub flavor: Flavor,
    /// Replay table contents before streaming the live binlog.
    pub stream_snapshot: bool,
    pub tls: TlsOptions,
    /// Replica identity announced to the source.
    pub server_id: u32,
}

impl ConnectorSettings {
    /// Build the replication client configuration for a new session.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            server_id: self.server_id,
            addr: self.addr.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
            tables: self.tables.clone(),
            flavor: self.flavor,
            tls: self.tls,
        }
    }
}

impl fmt::Debug for ConnectorSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorSettings")
            .field("addr", &self.addr)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .field("tables", &self.tables)
            .field("flavor", &self.flavor)
            .field("stream_snapshot", &self.stream_snapshot)
            .field("tls", &self.tls)
            .field("server_id", &self.server_id)
            .finish()
    }
}
