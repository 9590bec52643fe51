#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use std::sync::Arc;

use library_bridge::config::BridgeConfig;
use library_bridge::store::DocumentStore;
use library_bridge::store::sqlite::SqliteStore;
use tokio::sync::{Mutex, MutexGuard};

/// Stand-in engine: logs its arguments to `starts.log` in its working
/// directory, prints a banner, then answers by action. `undo` makes it exit
/// without answering.
pub const FAKE_ENGINE: &str = r#"#!/bin/sh
BOOK_LINES=$(wc -l < "$1" 2>/dev/null | tr -d ' ')
echo "start $1 $2 $3" >> starts.log
echo "Library System Ready"
while IFS= read -r line; do
  case "$line" in
    *'"action":"undo"'*) exit 3 ;;
    *'"action":"search"'*) printf '{"success":true,"message":"live search","bookLines":%s,"books":[]}\n' "${BOOK_LINES:-0}" ;;
    *'"action":"issue"'*) echo '{"success":true,"message":"Book issued"}' ;;
    *'"action":"return"'*) echo '{"success":true,"message":"Book returned"}' ;;
    *) echo '{"success":true,"message":"ok"}' ;;
  esac
done
"#;

pub const SNAPSHOT: &str = "ISBN,Title,Author,Category,Copies\n\
9780261102217,The Hobbit,J.R.R. Tolkien,Fantasy,3\n\
9780261103252,The Silmarillion,J.R.R. Tolkien,Fantasy,1\n\
9780441172719,Dune,Frank Herbert,SciFi,2\n";

static SERIAL: Mutex<()> = Mutex::const_new(());

/// Tests that write and exec scripts run one at a time, so no concurrent
/// fork can hold a script open for writing while it is executed.
pub async fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().await
}

/// An empty in-memory store; syncing it writes header-only projections.
pub fn memory_store() -> Option<Arc<dyn DocumentStore>> {
    Some(Arc::new(SqliteStore::in_memory().unwrap()))
}

pub struct Project {
    pub dir: tempfile::TempDir,
}

impl Project {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn engine_path(&self) -> PathBuf {
        self.root().join("backend").join("library")
    }

    /// Config that only ever looks for the engine under this project.
    pub fn config(&self) -> BridgeConfig {
        BridgeConfig {
            engine_candidates: vec![self.engine_path()],
            startup_timeout: Duration::from_secs(5),
            read_timeout: Some(Duration::from_secs(5)),
            ..BridgeConfig::new(self.root()).with_data_dir(self.root().join("projection"))
        }
    }

    pub fn write_snapshot(&self, content: &str) {
        std::fs::write(self.root().join("data").join("books.csv"), content).unwrap();
    }

    #[cfg(unix)]
    pub fn install_engine(&self, script: &str) {
        use std::os::unix::fs::PermissionsExt;

        let path = self.engine_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    /// Header-only flat files in the projection directory.
    pub fn write_projections(&self) {
        let config = self.config();
        std::fs::create_dir_all(&config.data_dir).unwrap();
        std::fs::write(config.books_file(), "ISBN,Title,Author,Category,Copies\n").unwrap();
        std::fs::write(config.users_file(), "UserID,Name,Email,Type\n").unwrap();
        std::fs::write(
            config.transactions_file(),
            "TID,UID,BID,CID,Type,Timestamp\n",
        )
        .unwrap();
    }

    /// Lines the fake engine appended on each start.
    pub fn starts(&self) -> Vec<String> {
        std::fs::read_to_string(self.root().join("starts.log"))
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}
