mod connector;
mod error;
mod validation;

pub use connector::ConnectorConfig;
pub use error::{ConfigError, ConfigResult};
pub use validation::{derive_server_id, to_settings, validate_connector};
