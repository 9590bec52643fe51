pub mod sqlite;

use std::fmt;

use async_trait::async_trait;

use crate::error::Result;
use crate::schema::Document;

/// Named groups of documents in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Books,
    Users,
    Transactions,
    Reservations,
}

impl Collection {
    pub fn name(self) -> &'static str {
        match self {
            Collection::Books => "books",
            Collection::Users => "users",
            Collection::Transactions => "transactions",
            Collection::Reservations => "reservations",
        }
    }

    /// Document field that uniquely identifies a document, if any.
    pub fn key_field(self) -> Option<&'static str> {
        match self {
            Collection::Books => Some("isbn"),
            Collection::Users => Some("userID"),
            Collection::Transactions | Collection::Reservations => None,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Durable home of the canonical records between engine runs.
/// Point reads and writes only; no querying beyond the key.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn count(&self, collection: Collection) -> Result<usize>;

    /// Every document, in insertion order.
    async fn find_all(&self, collection: Collection) -> Result<Vec<Document>>;

    async fn find_one(&self, collection: Collection, key: &str) -> Result<Option<Document>>;

    async fn insert_one(&self, collection: Collection, doc: Document) -> Result<()>;

    /// Insert all documents or none of them.
    async fn insert_many(&self, collection: Collection, docs: Vec<Document>) -> Result<usize>;

    /// Merge `fields` into the keyed document, creating it if absent.
    async fn upsert(&self, collection: Collection, key: &str, fields: Document) -> Result<()>;

    /// Add `delta` to a numeric field, never going below zero.
    /// Returns `false` when no document has that key.
    async fn increment(
        &self,
        collection: Collection,
        key: &str,
        field: &str,
        delta: i64,
    ) -> Result<bool>;
}
