use anyhow::{Context, Result};
use colored::Colorize;
use mystream_core::{ConnectorSettings, ReplicationClient, ReplicationSession};
use mystream_mysql::MySqlReplicationClient;

pub async fn cmd_check(settings: ConnectorSettings, connect: bool) -> Result<()> {
    println!("{}", "Config is valid".green().bold());
    println!("{}", summary(&settings));

    if !connect {
        return Ok(());
    }

    let client = MySqlReplicationClient::new();
    let mut session = client
        .open(&settings.session_config())
        .await
        .context("Failed to connect to source")?;

    let position = session.current_position().await;
    session.close().await?;

    let position = position.context("Failed to read binlog position")?;
    println!(
        "\n{} current binlog position {}",
        "Connected:".green(),
        position.to_string().bold()
    );
    Ok(())
}

fn summary(settings: &ConnectorSettings) -> String {
    let tables = if settings.tables.is_empty() {
        "(none)".to_string()
    } else {
        settings.tables.join(", ")
    };
    let tls = match (settings.tls.enabled, settings.tls.skip_verify) {
        (false, _) => "off",
        (true, false) => "on",
        (true, true) => "on (certificate verification disabled)",
    };

    [
        format!("  {:<16} {}", "addr", settings.addr),
        format!("  {:<16} {}", "database", settings.database),
        format!("  {:<16} {}", "user", settings.user),
        format!("  {:<16} {}", "flavor", settings.flavor),
        format!("  {:<16} {}", "tables", tables),
        format!("  {:<16} {}", "stream_snapshot", settings.stream_snapshot),
        format!("  {:<16} {}", "tls", tls),
        format!("  {:<16} {}", "server_id", settings.server_id),
    ]
    .join("\n")
}
