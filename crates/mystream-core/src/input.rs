//! The host-facing input: opens the replication session, runs it on a
//! background task and serves one encoded change event per read.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::channel::{event_channel, EventReceiver};
use crate::error::{Error, Result};
use crate::message::{noop_ack, AckFn, Message};
use crate::replication::{ReplicationClient, ReplicationSession};
use crate::settings::ConnectorSettings;
use crate::translator::Translator;

/// Interface a host pipeline drives.
pub trait Input: Send + Sync {
    /// Establish the source connection and start producing events.
    fn connect(&self, cancel: &CancellationToken) -> impl Future<Output = Result<()>> + Send;

    /// Wait for the next message and its acknowledgement callback.
    fn read(&self, cancel: &CancellationToken)
        -> impl Future<Output = Result<(Message, AckFn)>> + Send;

    /// Stop producing and release the source connection.
    fn close(&self, cancel: &CancellationToken) -> impl Future<Output = Result<()>> + Send;
}

/// Background replication task and the token that stops it.
struct Running {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
    /// Set by the task once its session is released, before readers see
    /// the stream end.
    done: Arc<AtomicBool>,
}

impl Running {
    fn is_finished(&self) -> bool {
        self.done.load(Ordering::Acquire) || self.task.is_finished()
    }
}

#[derive(Default)]
struct State {
    running: Option<Running>,
    /// A connect is opening a session.
    connecting: bool,
    /// Kept after close so later reads report why the stream ended.
    receiver: Option<Arc<EventReceiver>>,
}

impl State {
    /// Forget a task whose stream has already failed or ended.
    fn reap(&mut self) {
        if self.running.as_ref().is_some_and(Running::is_finished) {
            debug!("Reaping finished replication task");
            self.running = None;
        }
    }
}

/// Clears the connecting flag when a connect attempt finishes or is dropped.
struct ConnectingGuard<'a> {
    state: &'a Mutex<State>,
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .connecting = false;
    }
}

/// Binlog change-event input over any [`ReplicationClient`].
pub struct StreamInput<C: ReplicationClient> {
    settings: ConnectorSettings,
    client: C,
    state: Mutex<State>,
}

impl<C: ReplicationClient> StreamInput<C> {
    pub fn new(settings: ConnectorSettings, client: C) -> Self {
        Self {
            settings,
            client,
            state: Mutex::new(State::default()),
        }
    }

    /// Check if a replication task is running.
    pub fn is_connected(&self) -> bool {
        let mut state = self.lock_state();
        state.reap();
        state.running.is_some()
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: ReplicationClient> Input for StreamInput<C> {
    fn connect(&self, cancel: &CancellationToken) -> impl Future<Output = Result<()>> + Send {
        let cancel = cancel.clone();
        async move {
            let _connecting = {
                let mut state = self.lock_state();
                state.reap();
                if state.running.is_some() || state.connecting {
                    return Err(Error::AlreadyConnected);
                }
                state.connecting = true;
                ConnectingGuard { state: &self.state }
            };

            let config = self.settings.session_config();
            info!(
                addr = %config.addr,
                database = %config.database,
                flavor = %config.flavor,
                server_id = config.server_id,
                tls = config.tls.enabled,
                "Opening replication session"
            );
            if config.tls.skip_verify {
                warn!("TLS certificate verification is disabled");
            }

            let session = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                opened = self.client.open(&config) => opened?,
            };

            let shutdown = CancellationToken::new();
            let (sender, receiver) = event_channel(shutdown.clone());
            let translator = Translator::new(self.settings.database.clone(), sender);

            let done = Arc::new(AtomicBool::new(false));
            let task = tokio::spawn(run_replication(
                session,
                translator,
                self.settings.stream_snapshot,
                shutdown.clone(),
                done.clone(),
            ));

            let mut state = self.lock_state();
            state.running = Some(Running { shutdown, task, done });
            state.receiver = Some(Arc::new(receiver));

            Ok(())
        }
    }

    fn read(
        &self,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<(Message, AckFn)>> + Send {
        let cancel = cancel.clone();
        async move {
            let receiver = self.lock_state().receiver.clone().ok_or(Error::NotConnected)?;

            let event = receiver.recv(&cancel).await?;
            let message = Message::from_event(&event)?;
            trace!(table = %event.table, event = %event.event, "Read change event");

            Ok((message, noop_ack()))
        }
    }

    fn close(&self, cancel: &CancellationToken) -> impl Future<Output = Result<()>> + Send {
        let cancel = cancel.clone();
        async move {
            let Some(running) = self.lock_state().running.take() else {
                return Ok(());
            };

            running.shutdown.cancel();

            tokio::select! {
                _ = cancel.cancelled() => {
                    warn!("Close cancelled before the replication task stopped");
                    Err(Error::Cancelled)
                }
                joined = running.task => {
                    if let Err(e) = joined {
                        warn!(error = %e, "Replication task did not exit cleanly");
                    }
                    info!("Replication session closed");
                    Ok(())
                }
            }
        }
    }
}

impl<C: ReplicationClient> Drop for StreamInput<C> {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(running) = state.running.take() {
            running.shutdown.cancel();
        }
    }
}

/// Drive the session until it fails, ends or is shut down, then release it.
async fn run_replication<S: ReplicationSession>(
    mut session: S,
    translator: Translator,
    stream_snapshot: bool,
    shutdown: CancellationToken,
    done: Arc<AtomicBool>,
) {
    let result = tokio::select! {
        _ = shutdown.cancelled() => Ok(()),
        result = stream_rows(&mut session, &translator, stream_snapshot) => result,
    };

    match result {
        Ok(()) if shutdown.is_cancelled() => debug!("Replication stopped"),
        Ok(()) => info!("Replication stream ended"),
        Err(_) if shutdown.is_cancelled() => debug!("Replication stopped during shutdown"),
        Err(e) => {
            error!(error = %e, "Replication stream failed");
            let message = match e {
                Error::Replication(message) => message,
                other => other.to_string(),
            };
            translator.fail(message);
        }
    }

    if let Err(e) = session.close().await {
        warn!(error = %e, "Failed to close replication session");
    }

    // Readers see the stream end only once the sender drops, so a reader
    // that observed it can reconnect straight away.
    done.store(true, Ordering::Release);
    drop(translator);
}

async fn stream_rows<S: ReplicationSession>(
    session: &mut S,
    translator: &Translator,
    stream_snapshot: bool,
) -> Result<()> {
    if stream_snapshot {
        info!("Starting replication with snapshot");
        session.run_from_snapshot(translator).await
    } else {
        let position = session.current_position().await?;
        info!(position = %position, "Starting replication from current position");
        session.run_from_position(position, translator).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Delivery, META_EVENT, META_TABLE};
    use crate::mock::{MockReplicationClient, StartMode};
    use crate::replication::{Flavor, Position, TlsOptions};
    use crate::types::{MutationKind, RowsNotification, TableSchema, Value};
    use std::time::Duration;

    fn settings(stream_snapshot: bool) -> ConnectorSettings {
        ConnectorSettings {
            addr: "127.0.0.1:3306".into(),
            user: "repl".into(),
            password: "secret".into(),
            database: "shop".into(),
            tables: vec!["orders".into()],
            flavor: Flavor::MySql,
            stream_snapshot,
            tls: TlsOptions::default(),
            server_id: 1001,
        }
    }

    fn orders(schema: &str, kind: MutationKind, rows: Vec<Vec<Value>>) -> RowsNotification {
        RowsNotification {
            table: TableSchema::new(schema, "orders", ["id", "total"]),
            kind,
            rows,
        }
    }

    async fn read_with_timeout<C: ReplicationClient>(input: &StreamInput<C>) -> Result<(Message, AckFn)> {
        tokio::time::timeout(Duration::from_secs(2), input.read(&CancellationToken::new()))
            .await
            .expect("read timed out")
    }

    async fn wait_for_start(client: &MockReplicationClient) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while client.starts().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("replication never started");
    }

    #[tokio::test]
    async fn test_insert_scenario() {
        let client = MockReplicationClient::new();
        client.push_live(orders(
            "shop",
            MutationKind::Insert,
            vec![vec![Value::Int(1), Value::Float(9.99)]],
        ));

        let input = StreamInput::new(settings(false), client.clone());
        let cancel = CancellationToken::new();
        input.connect(&cancel).await.unwrap();

        let (message, ack) = read_with_timeout(&input).await.unwrap();
        assert_eq!(message.meta_get(META_TABLE), Some("orders"));
        assert_eq!(message.meta_get(META_EVENT), Some("insert"));

        let data = message.decode_data().unwrap();
        assert_eq!(data.get("id"), Some(&Value::Int(1)));
        assert_eq!(data.get("total"), Some(&Value::Float(9.99)));
        assert!(ack(Delivery::Failed("downstream rejected".into())).is_ok());

        input.close(&cancel).await.unwrap();
        assert_eq!(client.closed(), 1);
    }

    #[tokio::test]
    async fn test_update_scenario_uses_after_values() {
        let client = MockReplicationClient::new();
        client.push_live(orders(
            "shop",
            MutationKind::Update,
            vec![
                vec![Value::Int(1), Value::Float(9.99)],
                vec![Value::Int(1), Value::Float(19.99)],
            ],
        ));
        client.end_stream();

        let input = StreamInput::new(settings(false), client);
        input.connect(&CancellationToken::new()).await.unwrap();

        let (message, _ack) = read_with_timeout(&input).await.unwrap();
        assert_eq!(message.meta_get(META_EVENT), Some("update"));
        assert_eq!(
            message.decode_data().unwrap().get("total"),
            Some(&Value::Float(19.99))
        );

        // Exactly one event for the pair, then the stream ends.
        assert!(matches!(read_with_timeout(&input).await, Err(Error::Closed)));
    }

    #[tokio::test]
    async fn test_other_database_emits_nothing() {
        let client = MockReplicationClient::new();
        client.push_live(orders(
            "other_db",
            MutationKind::Insert,
            vec![vec![Value::Int(1), Value::Float(9.99)]],
        ));
        client.end_stream();

        let input = StreamInput::new(settings(false), client);
        input.connect(&CancellationToken::new()).await.unwrap();

        assert!(matches!(read_with_timeout(&input).await, Err(Error::Closed)));
    }

    #[tokio::test]
    async fn test_connect_unreachable() {
        let client = MockReplicationClient::unreachable("connection refused");
        let input = StreamInput::new(settings(false), client.clone());

        let result = input.connect(&CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::Connection(_))));
        assert!(!input.is_connected());
        assert!(client.starts().is_empty());

        assert!(matches!(
            input.read(&CancellationToken::new()).await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_connect_resumes_from_current_position() {
        let client = MockReplicationClient::new();
        client.set_position(Position::new("mysql-bin.000007", 1234));

        let input = StreamInput::new(settings(false), client.clone());
        input.connect(&CancellationToken::new()).await.unwrap();
        wait_for_start(&client).await;
        input.close(&CancellationToken::new()).await.unwrap();

        assert_eq!(
            client.starts(),
            vec![StartMode::Position(Position::new("mysql-bin.000007", 1234))]
        );
        let opened = client.opened();
        assert_eq!(opened.len(), 1);
        assert_eq!(opened[0].server_id, 1001);
        assert_eq!(opened[0].tables, vec!["orders"]);
    }

    #[tokio::test]
    async fn test_connect_with_snapshot() {
        let client = MockReplicationClient::new();
        client.push_snapshot(orders(
            "shop",
            MutationKind::Insert,
            vec![vec![Value::Int(1), Value::Float(1.0)]],
        ));
        client.push_live(orders(
            "shop",
            MutationKind::Delete,
            vec![vec![Value::Int(1), Value::Float(1.0)]],
        ));

        let input = StreamInput::new(settings(true), client.clone());
        input.connect(&CancellationToken::new()).await.unwrap();

        let (first, _) = read_with_timeout(&input).await.unwrap();
        let (second, _) = read_with_timeout(&input).await.unwrap();
        assert_eq!(first.meta_get(META_EVENT), Some("insert"));
        assert_eq!(second.meta_get(META_EVENT), Some("delete"));
        assert_eq!(client.starts(), vec![StartMode::Snapshot]);

        input.close(&CancellationToken::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_stream_failure_surfaces_to_reads() {
        let client = MockReplicationClient::new();
        client.push_live(orders(
            "shop",
            MutationKind::Insert,
            vec![vec![Value::Int(1), Value::Float(1.0)]],
        ));
        client.fail_stream("lost connection to server");

        let input = StreamInput::new(settings(false), client.clone());
        input.connect(&CancellationToken::new()).await.unwrap();

        assert!(read_with_timeout(&input).await.is_ok());
        match read_with_timeout(&input).await {
            Err(Error::Replication(message)) => assert!(message.contains("lost connection")),
            other => panic!("Expected Replication error, got {:?}", other.map(|(m, _)| m)),
        }
        assert!(matches!(read_with_timeout(&input).await, Err(Error::Replication(_))));
    }

    #[tokio::test]
    async fn test_unsupported_mutation_fails_stream() {
        let client = MockReplicationClient::new();
        client.push_live(orders(
            "shop",
            MutationKind::Other("partial_update".into()),
            vec![vec![Value::Int(1), Value::Float(1.0)]],
        ));

        let input = StreamInput::new(settings(false), client);
        input.connect(&CancellationToken::new()).await.unwrap();

        match read_with_timeout(&input).await {
            Err(Error::Replication(message)) => assert!(message.contains("partial_update")),
            other => panic!("Expected Replication error, got {:?}", other.map(|(m, _)| m)),
        }
    }

    #[tokio::test]
    async fn test_read_cancelled() {
        let input = StreamInput::new(settings(false), MockReplicationClient::new());
        input.connect(&CancellationToken::new()).await.unwrap();

        let cancel = CancellationToken::new();
        let reader = input.read(&cancel);
        cancel.cancel();

        assert!(matches!(reader.await, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_close_releases_blocked_reader() {
        let client = MockReplicationClient::new();
        let input = Arc::new(StreamInput::new(settings(false), client.clone()));
        input.connect(&CancellationToken::new()).await.unwrap();

        let reader = {
            let input = input.clone();
            tokio::spawn(async move { input.read(&CancellationToken::new()).await.map(|(m, _)| m) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        input.close(&CancellationToken::new()).await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(2), reader)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(Error::Closed)));
        assert_eq!(client.closed(), 1);
    }

    #[tokio::test]
    async fn test_close_releases_blocked_producer() {
        let client = MockReplicationClient::new();
        client.push_live(orders(
            "shop",
            MutationKind::Insert,
            vec![
                vec![Value::Int(1), Value::Float(1.0)],
                vec![Value::Int(2), Value::Float(2.0)],
                vec![Value::Int(3), Value::Float(3.0)],
            ],
        ));

        let input = StreamInput::new(settings(false), client.clone());
        input.connect(&CancellationToken::new()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        tokio::time::timeout(Duration::from_secs(2), input.close(&CancellationToken::new()))
            .await
            .expect("close should not wait for a reader")
            .unwrap();
        assert_eq!(client.closed(), 1);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let client = MockReplicationClient::new();
        let input = StreamInput::new(settings(false), client.clone());
        let cancel = CancellationToken::new();

        input.close(&cancel).await.unwrap();

        input.connect(&cancel).await.unwrap();
        input.close(&cancel).await.unwrap();
        input.close(&cancel).await.unwrap();

        assert_eq!(client.closed(), 1);
        assert!(!input.is_connected());
    }

    #[tokio::test]
    async fn test_connect_twice_rejected() {
        let client = MockReplicationClient::new();
        let input = StreamInput::new(settings(false), client.clone());
        let cancel = CancellationToken::new();

        input.connect(&cancel).await.unwrap();
        assert!(matches!(input.connect(&cancel).await, Err(Error::AlreadyConnected)));
        assert_eq!(client.opened().len(), 1);

        input.close(&cancel).await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_connects_open_one_session() {
        let client = MockReplicationClient::new();
        client.set_open_delay(Duration::from_millis(20));
        let input = StreamInput::new(settings(false), client.clone());
        let cancel = CancellationToken::new();

        let (first, second) = tokio::join!(input.connect(&cancel), input.connect(&cancel));
        let results = [first, second];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().any(|r| matches!(r, Err(Error::AlreadyConnected))));

        input.close(&cancel).await.unwrap();
        assert_eq!(client.opened().len(), 1);
        assert_eq!(client.closed(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_connect_can_be_retried() {
        let client = MockReplicationClient::new();
        client.set_open_delay(Duration::from_millis(50));
        let input = StreamInput::new(settings(false), client.clone());

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(input.connect(&cancel).await, Err(Error::Cancelled)));
        assert!(!input.is_connected());

        input.connect(&CancellationToken::new()).await.unwrap();
        assert!(input.is_connected());
        input.close(&CancellationToken::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_reconnect_after_stream_failure() {
        let client = MockReplicationClient::new();
        client.fail_stream("lost connection");

        let input = StreamInput::new(settings(false), client.clone());
        let cancel = CancellationToken::new();
        input.connect(&cancel).await.unwrap();

        assert!(matches!(read_with_timeout(&input).await, Err(Error::Replication(_))));
        assert!(!input.is_connected());

        input.connect(&cancel).await.unwrap();
        assert_eq!(client.opened().len(), 2);

        input.close(&cancel).await.unwrap();
        assert_eq!(client.closed(), 2);
    }
}
