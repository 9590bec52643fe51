//! Runtime configuration for the bridge.
//!
//! Defaults mirror a checkout layout: the engine lives under
//! `<root>/backend/`, legacy flat files and the offline snapshot under
//! `<root>/data/`, and projections are written to a scratch directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::consts::{
    BOOKS_FILE, ENGINE_BINARY, TRANSACTIONS_FILE, USERS_FILE, default_data_dir,
};

/// Prepended to the engine candidate list when set.
pub const ENV_ENGINE: &str = "LIBRARY_ENGINE";
/// Overrides the projection directory.
pub const ENV_DATA_DIR: &str = "LIBRARY_DATA_DIR";
/// Overrides the response read timeout (seconds, `0` disables it).
pub const ENV_READ_TIMEOUT: &str = "LIBRARY_READ_TIMEOUT_SECS";
/// Document store location.
pub const ENV_DB: &str = "LIBRARY_DB";

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Working directory of the engine; parent of `data/` and `backend/`.
    pub project_root: PathBuf,
    /// Where rehydrated flat files are written for the engine to read.
    pub data_dir: PathBuf,
    /// Ordered executable locations. First existing path wins.
    pub engine_candidates: Vec<PathBuf>,
    /// How long to wait for the readiness banner.
    pub startup_timeout: Duration,
    /// How long to wait for a single response line. `None` waits forever.
    pub read_timeout: Option<Duration>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::new(root)
    }
}

impl BridgeConfig {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        Self {
            engine_candidates: default_candidates(&project_root),
            project_root,
            data_dir: default_data_dir(),
            startup_timeout: Duration::from_secs(10),
            read_timeout: Some(Duration::from_secs(30)),
        }
    }

    /// Apply `LIBRARY_*` environment overrides.
    pub fn from_env(mut self) -> Self {
        if let Ok(engine) = std::env::var(ENV_ENGINE)
            && !engine.is_empty()
        {
            self = self.with_engine(engine);
        }
        if let Ok(dir) = std::env::var(ENV_DATA_DIR)
            && !dir.is_empty()
        {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(secs) = std::env::var(ENV_READ_TIMEOUT)
            && let Ok(secs) = secs.trim().parse::<u64>()
        {
            self.read_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        self
    }

    /// Try `path` before any default candidate.
    pub fn with_engine(mut self, path: impl Into<PathBuf>) -> Self {
        self.engine_candidates.insert(0, path.into());
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn books_file(&self) -> PathBuf {
        self.data_dir.join(BOOKS_FILE)
    }

    pub fn users_file(&self) -> PathBuf {
        self.data_dir.join(USERS_FILE)
    }

    pub fn transactions_file(&self) -> PathBuf {
        self.data_dir.join(TRANSACTIONS_FILE)
    }

    /// Directory of pre-existing flat files migrated into an empty store.
    pub fn legacy_dir(&self) -> PathBuf {
        self.project_root.join("data")
    }

    /// Bundled books snapshot served in offline mode.
    pub fn snapshot_file(&self) -> PathBuf {
        self.legacy_dir().join(BOOKS_FILE)
    }

    /// The three positional arguments passed to the engine.
    pub fn engine_args(&self) -> [PathBuf; 3] {
        [self.books_file(), self.users_file(), self.transactions_file()]
    }

    /// First candidate that exists on disk.
    pub fn locate_engine(&self) -> Option<PathBuf> {
        self.engine_candidates.iter().find(|p| p.exists()).cloned()
    }
}

fn default_candidates(root: &Path) -> Vec<PathBuf> {
    let binary = format!("{ENGINE_BINARY}{}", std::env::consts::EXE_SUFFIX);
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    vec![
        root.join("backend").join(&binary),
        cwd.join("backend").join(&binary),
        cwd.join(&binary),
    ]
}
