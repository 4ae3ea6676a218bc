use mystream_core::split_addr;
use serde::Deserialize;

use crate::error::{ConfigError, ConfigResult};

/// Raw connector configuration as parsed from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectorConfig {
    /// Source address, `host:port`.
    pub addr: String,
    /// Database whose row changes are published.
    pub database: String,
    /// Replication user.
    pub user: String,
    /// Replication password.
    pub password: String,
    /// Tables replayed by a snapshot.
    pub tables: Vec<String>,
    /// Source dialect: `mysql` or `mariadb`.
    pub flavor: String,
    /// Replay table contents before streaming the live binlog.
    pub stream_snapshot: bool,
    /// Connect over TLS.
    #[serde(default)]
    pub enable_ssl: bool,
    /// Accept any server certificate when TLS is enabled.
    #[serde(default)]
    pub tls_skip_verify: bool,
    /// Replica identity announced to the source (derived when absent).
    #[serde(default)]
    pub server_id: Option<u32>,
}

impl ConnectorConfig {
    /// Parse a connector config from a TOML string.
    pub fn parse(toml_str: &str) -> ConfigResult<Self> {
        let config: ConnectorConfig = toml::from_str(toml_str)?;
        Ok(config)
    }

    /// Split `addr` into host and port.
    pub fn host_port(&self) -> ConfigResult<(String, u16)> {
        split_addr(&self.addr).ok_or_else(|| ConfigError::InvalidAddr {
            value: self.addr.clone(),
        })
    }
}
