use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use mystream_config::{to_settings, ConnectorConfig};
use mystream_core::ConnectorSettings;

/// Resolve environment variables in a string.
/// Supports ${VAR_NAME} syntax; unset variables resolve to an empty string.
pub fn resolve_env(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start..].find('}') else {
            break;
        };
        let var_name = &rest[start + 2..start + end];
        result.push_str(&rest[..start]);
        result.push_str(&std::env::var(var_name).unwrap_or_default());
        rest = &rest[start + end + 1..];
    }

    result.push_str(rest);
    result
}

/// Read, expand and parse a connector config file.
pub fn load_config(path: &Path) -> Result<ConnectorConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    ConnectorConfig::parse(&resolve_env(&content))
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Load a config file and turn it into validated connector settings.
pub fn load_settings(path: &Path) -> Result<ConnectorSettings> {
    let config = load_config(path)?;
    to_settings(&config).with_context(|| format!("Invalid config: {}", path.display()))
}
