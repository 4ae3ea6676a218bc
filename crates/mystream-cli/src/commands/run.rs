use anyhow::{Context, Result};
use mystream_core::{
    ConnectorSettings, Delivery, Error, Input, Message, StreamInput, META_EVENT, META_TABLE,
};
use mystream_mysql::MySqlReplicationClient;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub async fn cmd_run(settings: ConnectorSettings, limit: Option<u64>) -> Result<()> {
    info!(database = %settings.database, "Starting mystream");

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, shutting down");
            ctrl_c.cancel();
        }
    });

    let input = StreamInput::new(settings, MySqlReplicationClient::new());
    input
        .connect(&cancel)
        .await
        .context("Failed to connect to source")?;

    let result = stream_events(&input, &cancel, limit).await;

    // A fresh token so close can finish after Ctrl-C.
    input.close(&CancellationToken::new()).await?;
    result
}

async fn stream_events<I: Input>(input: &I, cancel: &CancellationToken, limit: Option<u64>) -> Result<()> {
    let mut count = 0u64;

    while limit.map_or(true, |max| count < max) {
        let (message, ack) = match input.read(cancel).await {
            Ok(read) => read,
            Err(Error::Cancelled) => break,
            Err(e) => return Err(e).context("Change stream failed"),
        };

        println!("{}", format_message(&message)?);
        ack(Delivery::Delivered)?;
        count += 1;
    }

    if count == 0 {
        warn!("No change events were read");
    }
    info!(events = count, "Stopped streaming");
    Ok(())
}

/// Render a message as one JSON line: `{"table", "event", "data"}`.
fn format_message(message: &Message) -> Result<String> {
    let data: serde_json::Value =
        serde_json::from_slice(message.payload()).context("Payload is not valid JSON")?;

    let line = serde_json::json!({
        "table": message.meta_get(META_TABLE),
        "event": message.meta_get(META_EVENT),
        "data": data,
    });
    Ok(line.to_string())
}
