use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::replication::{Position, ReplicationClient, ReplicationSession, RowHandler, SessionConfig};
use crate::types::RowsNotification;

/// How a mock session was asked to start streaming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartMode {
    Snapshot,
    Position(Position),
}

/// A scripted replication client for testing.
///
/// Sessions replay the scripted notifications into the handler, then either
/// fail, end, or idle until dropped.
#[derive(Clone, Default)]
pub struct MockReplicationClient {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    /// Coordinate reported by `current_position`.
    position: Option<Position>,
    /// Notifications replayed by a snapshot run before the live ones.
    snapshot: Vec<RowsNotification>,
    /// Notifications replayed by every run.
    live: Vec<RowsNotification>,
    /// If set, `open` fails with this message.
    fail_open: Option<String>,
    /// If set, `open` waits this long before connecting.
    open_delay: Option<Duration>,
    /// If set, the stream fails with this message after the script.
    fail_stream: Option<String>,
    /// End the stream after the script instead of idling.
    end_stream: bool,
    opened: Vec<SessionConfig>,
    starts: Vec<StartMode>,
    closed: usize,
}

impl MockReplicationClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock client whose sessions cannot be opened.
    pub fn unreachable(error_message: impl Into<String>) -> Self {
        let client = Self::new();
        client.state.lock().unwrap().fail_open = Some(error_message.into());
        client
    }

    /// Set the coordinate reported as the source's current position.
    pub fn set_position(&self, position: Position) {
        self.state.lock().unwrap().position = Some(position);
    }

    /// Script a notification delivered only by snapshot runs.
    pub fn push_snapshot(&self, notification: RowsNotification) {
        self.state.lock().unwrap().snapshot.push(notification);
    }

    /// Script a notification delivered by every run.
    pub fn push_live(&self, notification: RowsNotification) {
        self.state.lock().unwrap().live.push(notification);
    }

    /// Fail the stream once the script has been delivered.
    pub fn fail_stream(&self, error_message: impl Into<String>) {
        self.state.lock().unwrap().fail_stream = Some(error_message.into());
    }

    /// Make `open` take `delay` to complete.
    pub fn set_open_delay(&self, delay: Duration) {
        self.state.lock().unwrap().open_delay = Some(delay);
    }

    /// End the stream cleanly once the script has been delivered.
    pub fn end_stream(&self) {
        self.state.lock().unwrap().end_stream = true;
    }

    /// Configurations of every opened session.
    pub fn opened(&self) -> Vec<SessionConfig> {
        self.state.lock().unwrap().opened.clone()
    }

    /// How each run was started, in order.
    pub fn starts(&self) -> Vec<StartMode> {
        self.state.lock().unwrap().starts.clone()
    }

    /// Number of sessions closed so far.
    pub fn closed(&self) -> usize {
        self.state.lock().unwrap().closed
    }
}

impl ReplicationClient for MockReplicationClient {
    type Session = MockSession;

    fn open(&self, config: &SessionConfig) -> impl Future<Output = Result<MockSession>> + Send {
        let state = self.state.clone();
        let config = config.clone();
        async move {
            let delay = state.lock().unwrap().open_delay;
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let mut guard = state.lock().unwrap();
            if let Some(ref error) = guard.fail_open {
                return Err(Error::Connection(error.clone()));
            }

            guard.opened.push(config);
            drop(guard);

            Ok(MockSession {
                state,
                closed: false,
            })
        }
    }
}

/// A session created by [`MockReplicationClient`].
pub struct MockSession {
    state: Arc<Mutex<MockState>>,
    closed: bool,
}

impl MockSession {
    async fn replay<H: RowHandler>(&self, notifications: Vec<RowsNotification>, handler: &H) -> Result<()> {
        for notification in notifications {
            handler.on_rows(notification).await?;
        }

        let (fail_stream, end_stream) = {
            let state = self.state.lock().unwrap();
            (state.fail_stream.clone(), state.end_stream)
        };

        if let Some(error) = fail_stream {
            return Err(Error::Replication(error));
        }
        if !end_stream {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

impl ReplicationSession for MockSession {
    fn current_position(&mut self) -> impl Future<Output = Result<Position>> + Send {
        let position = self
            .state
            .lock()
            .unwrap()
            .position
            .clone()
            .unwrap_or_else(|| Position::new("mysql-bin.000001", 4));
        async move { Ok(position) }
    }

    fn run_from_snapshot<H: RowHandler>(
        &mut self,
        handler: &H,
    ) -> impl Future<Output = Result<()>> + Send {
        let script = {
            let mut state = self.state.lock().unwrap();
            state.starts.push(StartMode::Snapshot);
            state
                .snapshot
                .iter()
                .chain(state.live.iter())
                .cloned()
                .collect::<Vec<_>>()
        };
        async move { self.replay(script, handler).await }
    }

    fn run_from_position<H: RowHandler>(
        &mut self,
        position: Position,
        handler: &H,
    ) -> impl Future<Output = Result<()>> + Send {
        let script = {
            let mut state = self.state.lock().unwrap();
            state.starts.push(StartMode::Position(position));
            state.live.clone()
        };
        async move { self.replay(script, handler).await }
    }

    fn close(&mut self) -> impl Future<Output = Result<()>> + Send {
        if !self.closed {
            self.closed = true;
            self.state.lock().unwrap().closed += 1;
        }
        async { Ok(()) }
    }
}
