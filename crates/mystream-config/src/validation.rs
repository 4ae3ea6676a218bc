use mystream_core::{ConnectorSettings, Flavor, TlsOptions};

use crate::connector::ConnectorConfig;
use crate::error::{ConfigError, ConfigResult};

/// Lowest derived server id; smaller ids are commonly taken by real replicas.
const DERIVED_SERVER_ID_BASE: u32 = 1000;

/// Validate a connector configuration.
pub fn validate_connector(config: &ConnectorConfig) -> ConfigResult<()> {
    validate_required(config)?;
    config.host_port()?;
    parse_flavor(&config.flavor)?;
    validate_snapshot(config)?;
    validate_tls(config)?;
    validate_server_id(config)?;
    Ok(())
}

fn validate_required(config: &ConnectorConfig) -> ConfigResult<()> {
    for (field, value) in [("database", &config.database), ("user", &config.user)] {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: field.to_string(),
            });
        }
    }
    Ok(())
}

fn parse_flavor(value: &str) -> ConfigResult<Flavor> {
    value.parse().map_err(|_| ConfigError::InvalidFlavor {
        value: value.to_string(),
    })
}

fn validate_snapshot(config: &ConnectorConfig) -> ConfigResult<()> {
    if config.stream_snapshot && config.tables.is_empty() {
        return Err(ConfigError::SnapshotWithoutTables);
    }
    Ok(())
}

fn validate_tls(config: &ConnectorConfig) -> ConfigResult<()> {
    if config.tls_skip_verify && !config.enable_ssl {
        return Err(ConfigError::SkipVerifyWithoutTls);
    }
    Ok(())
}

fn validate_server_id(config: &ConnectorConfig) -> ConfigResult<()> {
    if config.server_id == Some(0) {
        return Err(ConfigError::InvalidServerId);
    }
    Ok(())
}

/// Pick a random replica identity so concurrent connectors do not collide.
pub fn derive_server_id() -> u32 {
    let random = uuid::Uuid::new_v4().as_u128();
    DERIVED_SERVER_ID_BASE + (random % u128::from(u32::MAX - DERIVED_SERVER_ID_BASE)) as u32
}

/// Convert a validated connector config to core settings.
pub fn to_settings(config: &ConnectorConfig) -> ConfigResult<ConnectorSettings> {
    validate_connector(config)?;

    Ok(ConnectorSettings {
        addr: config.addr.trim().to_string(),
        user: config.user.clone(),
        password: config.password.clone(),
        database: config.database.clone(),
        tables: config.tables.clone(),
        flavor: parse_flavor(&config.flavor)?,
        stream_snapshot: config.stream_snapshot,
        tls: TlsOptions {
            enabled: config.enable_ssl,
            skip_verify: config.tls_skip_verify,
        },
        server_id: config.server_id.unwrap_or_else(derive_server_id),
    })
}
