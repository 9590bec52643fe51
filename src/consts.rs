//! Project-wide constants.

use std::path::PathBuf;

/// Column order of the books flat file.
pub const BOOKS_HEADER: &[&str] = &["ISBN", "Title", "Author", "Category", "Copies"];

/// Column order of the users flat file.
pub const USERS_HEADER: &[&str] = &["UserID", "Name", "Email", "Type"];

/// Column order of the transactions flat file.
pub const TRANSACTIONS_HEADER: &[&str] = &["TID", "UID", "BID", "CID", "Type", "Timestamp"];

pub const BOOKS_FILE: &str = "books.csv";
pub const USERS_FILE: &str = "users.csv";
pub const TRANSACTIONS_FILE: &str = "transactions.csv";

/// Engine messages meaning "I have no record of this caller".
pub const RECOVERABLE_IDENTITY_MARKERS: &[&str] = &["User not found", "Invalid user"];

/// Returned when the engine closes its output instead of answering.
pub const EMPTY_OUTPUT_MESSAGE: &str = "Backend not responding (Empty Output)";

/// Returned by the degraded engine for anything it cannot serve.
pub const ENGINE_UNAVAILABLE_MESSAGE: &str =
    "Library engine unavailable: running in offline mode";

/// Email domain used when a user record carries no address.
pub const EMAIL_DOMAIN: &str = "library.edu";

/// Default user type for records that do not specify one.
pub const DEFAULT_USER_TYPE: &str = "STUDENT";

/// Placeholder transaction id for records stored without one.
pub const DEFAULT_TID: &str = "TXN_INF";

/// Copies assumed for a book document stored without a count.
pub const DEFAULT_COPIES: u32 = 1;

/// Default number of recommendations requested from the engine.
pub const DEFAULT_RECOMMENDATION_LIMIT: usize = 6;

/// Base name of the compiled engine (platform suffix is appended).
pub const ENGINE_BINARY: &str = "library";

/// Default database path: `~/.library-bridge/library.db`.
pub fn default_db_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".library-bridge").join("library.db"))
}

/// Default location of the flat-file projections handed to the engine.
pub fn default_data_dir() -> PathBuf {
    std::env::temp_dir().join("libsearch_data")
}
