//! Single-slot handoff between the replication task and readers.
//!
//! The channel holds at most one unconsumed event. A producer that tries to
//! hand over a second event waits until a reader has taken the first, which
//! throttles the binlog stream to the pace of the consumer.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::types::ChangeEvent;

/// Failure recorded by the producer side, reported to every later read.
#[derive(Debug, Clone, Default)]
struct FailureState {
    message: Arc<Mutex<Option<String>>>,
}

impl FailureState {
    fn set(&self, message: String) {
        let mut slot = self.message.lock().unwrap_or_else(PoisonError::into_inner);
        // Keep the first failure; later ones are usually consequences of it.
        if slot.is_none() {
            *slot = Some(message);
        }
    }

    fn get(&self) -> Option<String> {
        self.message
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Create a connected sender/receiver pair with room for one event.
///
/// `shutdown` aborts any send that is waiting for capacity.
pub fn event_channel(shutdown: CancellationToken) -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::channel(1);
    let failure = FailureState::default();

    (
        EventSender {
            tx,
            shutdown,
            failure: failure.clone(),
        },
        EventReceiver {
            rx: tokio::sync::Mutex::new(rx),
            failure,
        },
    )
}

/// Producer half, owned by the replication task.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<ChangeEvent>,
    shutdown: CancellationToken,
    failure: FailureState,
}

impl EventSender {
    /// Hand an event to the consumer, waiting while the slot is occupied.
    pub async fn send(&self, event: ChangeEvent) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(Error::Cancelled),
            sent = self.tx.send(event) => sent.map_err(|_| Error::Closed),
        }
    }

    /// Record a producer failure. Readers see it once the slot is drained.
    pub fn fail(&self, message: impl Into<String>) {
        self.failure.set(message.into());
    }
}

/// Consumer half. Concurrent readers are served one at a time.
#[derive(Debug)]
pub struct EventReceiver {
    rx: tokio::sync::Mutex<mpsc::Receiver<ChangeEvent>>,
    failure: FailureState,
}

impl EventReceiver {
    /// Wait for the next event.
    ///
    /// Returns `Cancelled` if `cancel` fires first, and the recorded producer
    /// failure (or `Closed`) once every producer is gone.
    pub async fn recv(&self, cancel: &CancellationToken) -> Result<ChangeEvent> {
        let mut rx = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            guard = self.rx.lock() => guard,
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            event = rx.recv() => match event {
                Some(event) => Ok(event),
                None => Err(self.closed_error()),
            },
        }
    }

    fn closed_error(&self) -> Error {
        match self.failure.get() {
            Some(message) => Error::Replication(message),
            None => Error::Closed,
        }
    }
}
