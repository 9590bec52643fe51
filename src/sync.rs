//! Startup synchronisation between the document store and the engine's
//! flat files.
//!
//! Two passes, always in this order:
//!
//! 1. **Migration**: an empty `books` or `users` collection is seeded from the
//!    legacy flat file under `<root>/data/`, if there is one. A collection
//!    that already holds documents is never touched.
//! 2. **Rehydration**: every collection the engine reads is exported in full
//!    to its projection file, header first.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::BridgeConfig;
use crate::consts::{BOOKS_FILE, TRANSACTIONS_HEADER, USERS_FILE};
use crate::error::{BridgeError, Result};
use crate::flatfile::{self, TableFile};
use crate::schema::{BookRecord, FlatRecord, TransactionRecord, UserRecord, document_to_row};
use crate::store::DocumentStore;

/// What a sync run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// No document store configured; files on disk were left as they are.
    pub skipped: bool,
    pub migrated_books: usize,
    pub migrated_users: usize,
    pub books: usize,
    pub users: usize,
    pub transactions: usize,
}

pub struct StartupSync {
    store: Option<Arc<dyn DocumentStore>>,
    legacy_dir: PathBuf,
    data_dir: PathBuf,
    books_file: PathBuf,
    users_file: PathBuf,
    transactions_file: PathBuf,
}

impl StartupSync {
    pub fn new(config: &BridgeConfig, store: Option<Arc<dyn DocumentStore>>) -> Self {
        Self {
            store,
            legacy_dir: config.legacy_dir(),
            data_dir: config.data_dir.clone(),
            books_file: config.books_file(),
            users_file: config.users_file(),
            transactions_file: config.transactions_file(),
        }
    }

    /// Migration then rehydration. Any failure is a
    /// [`BridgeError::StartupSync`].
    pub async fn run(&self) -> Result<SyncReport> {
        self.run_inner()
            .await
            .map_err(|e| BridgeError::StartupSync(Box::new(e)))
    }

    async fn run_inner(&self) -> Result<SyncReport> {
        let Some(store) = self.store.as_deref() else {
            debug!("no document store configured, keeping flat files on disk");
            self.ensure_transactions_file().await?;
            if !self.projections_exist() {
                return Err(BridgeError::ProjectionsMissing {
                    dir: self.data_dir.clone(),
                });
            }
            return Ok(SyncReport {
                skipped: true,
                ..SyncReport::default()
            });
        };

        let (migrated_books, migrated_users) = self.migrate(store).await?;
        let (books, users, transactions) = self.rehydrate(store).await?;
        info!(books, users, transactions, "rehydrated flat files from document store");

        Ok(SyncReport {
            skipped: false,
            migrated_books,
            migrated_users,
            books,
            users,
            transactions,
        })
    }

    /// Seed empty collections from legacy flat files. Returns
    /// `(books, users)` inserted.
    pub async fn migrate(&self, store: &dyn DocumentStore) -> Result<(usize, usize)> {
        let books =
            migrate_collection::<BookRecord>(store, &self.legacy_dir.join(BOOKS_FILE)).await?;
        let users =
            migrate_collection::<UserRecord>(store, &self.legacy_dir.join(USERS_FILE)).await?;
        Ok((books, users))
    }

    /// Export every collection to its projection. Every collection is read
    /// before any file is replaced, and the three files are swapped in
    /// together. Returns `(books, users, transactions)` rows written.
    pub async fn rehydrate(&self, store: &dyn DocumentStore) -> Result<(usize, usize, usize)> {
        let books = export::<BookRecord>(store).await?;
        let users = export::<UserRecord>(store).await?;
        let transactions = export::<TransactionRecord>(store).await?;

        flatfile::replace_tables(&[
            table_file::<BookRecord>(&self.books_file, &books),
            table_file::<UserRecord>(&self.users_file, &users),
            table_file::<TransactionRecord>(&self.transactions_file, &transactions),
        ])
        .await?;
        Ok((books.len(), users.len(), transactions.len()))
    }

    /// Whether the engine would find all three input files.
    pub fn projections_exist(&self) -> bool {
        [&self.books_file, &self.users_file, &self.transactions_file]
            .iter()
            .all(|p| p.exists())
    }

    async fn ensure_transactions_file(&self) -> Result<()> {
        if !self.transactions_file.exists() {
            flatfile::write_table(&self.transactions_file, TRANSACTIONS_HEADER, &[]).await?;
        }
        Ok(())
    }
}

async fn migrate_collection<R: FlatRecord>(
    store: &dyn DocumentStore,
    legacy: &Path,
) -> Result<usize> {
    if store.count(R::COLLECTION).await? > 0 {
        debug!(collection = %R::COLLECTION, "collection not empty, skipping migration");
        return Ok(0);
    }
    let Some(table) = flatfile::read_table(legacy).await? else {
        return Ok(0);
    };

    let docs = table
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            R::from_row(row)
                .map(|record| record.to_document())
                .map_err(|reason| BridgeError::MalformedRow {
                    file: legacy.to_path_buf(),
                    line: table.line_of(i),
                    reason,
                })
        })
        .collect::<Result<Vec<_>>>()?;

    if docs.is_empty() {
        return Ok(0);
    }
    info!(collection = %R::COLLECTION, count = docs.len(), "migrating legacy flat file");
    store.insert_many(R::COLLECTION, docs).await
}

async fn export<R: FlatRecord>(store: &dyn DocumentStore) -> Result<Vec<Vec<String>>> {
    Ok(store
        .find_all(R::COLLECTION)
        .await?
        .iter()
        .map(document_to_row::<R>)
        .collect())
}

fn table_file<'a, R: FlatRecord>(path: &'a Path, rows: &'a [Vec<String>]) -> TableFile<'a> {
    TableFile {
        path,
        header: R::HEADER,
        rows,
    }
}
