use std::fs;
use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use tracing::info;

const CONFIG_TEMPLATE: &str = r#"# mystream connector configuration
# Secrets are loaded from the environment or a .env file

addr = "${MYSQL_ADDR}"
database = "app"
user = "${MYSQL_USER}"
password = "${MYSQL_PASSWORD}"
flavor = "mysql"

# Tables replayed before streaming when stream_snapshot = true
tables = []
stream_snapshot = false

# enable_ssl = true
# tls_skip_verify = false

# Replica identity; a random one is picked when unset
# server_id = 1001
"#;

const ENV_TEMPLATE: &str = r#"# mystream environment variables
# Copy this file to .env and fill in your values

MYSQL_ADDR=127.0.0.1:3306
MYSQL_USER=
MYSQL_PASSWORD=
"#;

pub fn cmd_init(config_path: &Path) -> Result<()> {
    let dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    if config_path.exists() {
        println!("{} already exists, skipping", config_path.display());
    } else {
        fs::write(config_path, CONFIG_TEMPLATE)?;
        info!(path = %config_path.display(), "Created config");
        println!("Created {}", config_path.display());
    }

    let env_example = dir.join(".env.example");
    if env_example.exists() {
        println!(".env.example already exists, skipping");
    } else {
        fs::write(&env_example, ENV_TEMPLATE)?;
        println!("Created .env.example");
    }

    println!("\n{}", "mystream initialized!".green().bold());
    println!("Next: fill in .env, then run `mystream check --connect`.");
    Ok(())
}
