//! Engine lifecycle notifications.
//!
//! The supervisor publishes on an [`EventBus`]; tests and the CLI listen.
//! Nothing on the request path waits for a listener.

use std::fmt;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A process printed its banner. `start` counts from 1 per bridge.
    EngineStarted { pid: Option<u32>, start: usize },
    /// The held process was found dead before a request went out.
    EngineExited { pid: Option<u32> },
    /// Offline mode from now on.
    Degraded { reason: String },
    /// Flat files regenerated from the document store.
    Rehydrated {
        books: usize,
        users: usize,
        transactions: usize,
    },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::EngineStarted { pid, start } => match pid {
                Some(pid) => write!(f, "engine start #{start} (pid {pid})"),
                None => write!(f, "engine start #{start}"),
            },
            Event::EngineExited { pid: Some(pid) } => write!(f, "engine pid {pid} exited"),
            Event::EngineExited { pid: None } => f.write_str("engine exited"),
            Event::Degraded { reason } => write!(f, "offline mode: {reason}"),
            Event::Rehydrated {
                books,
                users,
                transactions,
            } => write!(
                f,
                "rehydrated {books} book(s), {users} user(s), {transactions} transaction(s)"
            ),
        }
    }
}

#[derive(Debug)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish to current listeners. Returns how many will see it.
    pub fn emit(&self, event: Event) -> usize {
        debug!(%event, "lifecycle event");
        self.tx.send(event).unwrap_or(0)
    }

    /// Future events only; nothing is replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Log every event at a level matching its severity until the bus is
    /// dropped.
    pub fn spawn_logger(&self) -> JoinHandle<()> {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event @ (Event::EngineExited { .. } | Event::Degraded { .. })) => {
                        warn!("{event}")
                    }
                    Ok(event) => info!("{event}"),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "event logger fell behind")
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
