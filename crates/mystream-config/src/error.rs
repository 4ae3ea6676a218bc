use thiserror::Error;

/// Errors that can occur when parsing or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("missing required field: {field}")]
    MissingField { field: String },

    #[error("invalid address '{value}': expected host:port")]
    InvalidAddr { value: String },

    #[error("invalid flavor '{value}': expected one of mysql, mariadb")]
    InvalidFlavor { value: String },

    #[error("stream_snapshot requires at least one entry in 'tables'")]
    SnapshotWithoutTables,

    #[error("tls_skip_verify requires enable_ssl = true")]
    SkipVerifyWithoutTls,

    #[error("server_id must be non-zero")]
    InvalidServerId,
}

pub type ConfigResult<T> = Result<T, ConfigError>;
