use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;

use super::{Collection, DocumentStore};
use crate::error::{BridgeError, Result};
use crate::schema::Document;

/// SQLite-backed document store. Each document is a JSON text column.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the store at `path`. Use `":memory:"` for tests.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS documents (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                collection TEXT NOT NULL,
                key        TEXT,
                body       TEXT NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS documents_key
                ON documents (collection, key) WHERE key IS NOT NULL;",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| BridgeError::StoreLock)
    }
}

fn key_of(collection: Collection, doc: &Document) -> Option<String> {
    let field = collection.key_field()?;
    match doc.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_body(json: &str) -> Result<Document> {
    Ok(serde_json::from_str(json)?)
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn count(&self, collection: Collection) -> Result<usize> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE collection = ?1",
            [collection.name()],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    async fn find_all(&self, collection: Collection) -> Result<Vec<Document>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT body FROM documents WHERE collection = ?1 ORDER BY id ASC")?;
        let bodies = stmt
            .query_map([collection.name()], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        bodies.iter().map(|b| parse_body(b)).collect()
    }

    async fn find_one(&self, collection: Collection, key: &str) -> Result<Option<Document>> {
        let conn = self.conn()?;
        let body = conn
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND key = ?2",
                [collection.name(), key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        body.as_deref().map(parse_body).transpose()
    }

    async fn insert_one(&self, collection: Collection, doc: Document) -> Result<()> {
        let body = serde_json::to_string(&doc)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO documents (collection, key, body) VALUES (?1, ?2, ?3)",
            params![collection.name(), key_of(collection, &doc), body],
        )?;
        Ok(())
    }

    async fn insert_many(&self, collection: Collection, docs: Vec<Document>) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for doc in &docs {
            tx.execute(
                "INSERT INTO documents (collection, key, body) VALUES (?1, ?2, ?3)",
                params![
                    collection.name(),
                    key_of(collection, doc),
                    serde_json::to_string(doc)?
                ],
            )?;
        }
        tx.commit()?;
        Ok(docs.len())
    }

    async fn upsert(&self, collection: Collection, key: &str, fields: Document) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let existing = tx
            .query_row(
                "SELECT id, body FROM documents WHERE collection = ?1 AND key = ?2",
                [collection.name(), key],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        match existing {
            Some((id, body)) => {
                let mut doc = parse_body(&body)?;
                doc.extend(fields);
                tx.execute(
                    "UPDATE documents SET body = ?1 WHERE id = ?2",
                    params![serde_json::to_string(&doc)?, id],
                )?;
            }
            None => {
                let mut doc = Document::new();
                if let Some(field) = collection.key_field() {
                    doc.insert(field.to_string(), Value::String(key.to_string()));
                }
                doc.extend(fields);
                tx.execute(
                    "INSERT INTO documents (collection, key, body) VALUES (?1, ?2, ?3)",
                    params![collection.name(), key, serde_json::to_string(&doc)?],
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    async fn increment(
        &self,
        collection: Collection,
        key: &str,
        field: &str,
        delta: i64,
    ) -> Result<bool> {
        let path = format!("$.{field}");
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE documents
             SET body = json_set(body, ?1, MAX(0, COALESCE(json_extract(body, ?1), 0) + ?2))
             WHERE collection = ?3 AND key = ?4",
            params![path, delta, collection.name(), key],
        )?;
        Ok(changed > 0)
    }
}
