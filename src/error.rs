//! Error taxonomy for the bridge.
//!
//! Only lifecycle and storage failures are errors. Everything that happens
//! while answering a request (empty output, undecodable line, domain failure)
//! is folded into a [`Response`](crate::protocol::Response) instead.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("engine executable not found (searched {searched:?})")]
    ExecutableNotFound { searched: Vec<PathBuf> },

    #[error("startup sync failed: {0}")]
    StartupSync(#[source] Box<BridgeError>),

    #[error("engine process died: {0}")]
    ProcessDied(String),

    #[error("engine did not answer within {0:?}")]
    ReadTimeout(Duration),

    #[error("engine exited before printing its readiness banner")]
    NoBanner,

    #[error("malformed row {line} in {}: {reason}", file.display())]
    MalformedRow {
        file: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("no document store and no flat files in {}", dir.display())]
    ProjectionsMissing { dir: PathBuf },

    #[error("document store lock poisoned")]
    StoreLock,

    #[error("document store: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("flat file: {0}")]
    Csv(#[from] csv::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Errors that mean the engine process can no longer be trusted.
    pub fn is_process_death(&self) -> bool {
        matches!(self, Self::ProcessDied(_) | Self::ReadTimeout(_))
    }
}
