//! Offline stand-in used when no engine binary can be run.
//!
//! Serves read-only actions from the bundled books snapshot, loaded on first
//! use. Everything that would change state is refused.

use std::collections::HashSet;
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::Engine;
use crate::consts::{DEFAULT_RECOMMENDATION_LIMIT, ENGINE_UNAVAILABLE_MESSAGE};
use crate::flatfile;
use crate::protocol::{Action, Request, Response};
use crate::schema::{BookRecord, FlatRecord};

pub struct DegradedEngine {
    snapshot: PathBuf,
    books: Option<Vec<BookRecord>>,
}

impl DegradedEngine {
    pub fn new(snapshot: impl Into<PathBuf>) -> Self {
        Self {
            snapshot: snapshot.into(),
            books: None,
        }
    }

    /// An engine over an already-loaded catalogue.
    pub fn from_books(books: Vec<BookRecord>) -> Self {
        Self {
            snapshot: PathBuf::new(),
            books: Some(books),
        }
    }

    async fn catalogue(&mut self) -> &[BookRecord] {
        if self.books.is_none() {
            let books = load_snapshot(&self.snapshot).await;
            info!(
                count = books.len(),
                snapshot = %self.snapshot.display(),
                "loaded offline catalogue"
            );
            self.books = Some(books);
        }
        self.books.as_deref().unwrap_or_default()
    }

    fn search(books: &[BookRecord], request: &Request) -> Response {
        let query = request.text("query").unwrap_or_default().to_lowercase();
        let kind = request.text("type").unwrap_or_default();
        let hits: Vec<&BookRecord> = books
            .iter()
            .filter(|b| search_field(b, &kind).to_lowercase().contains(&query))
            .collect();
        Response::ok(format!("Found {} book(s) (offline mode)", hits.len()))
            .with("books", json!(hits))
            .with("offline", true)
    }

    fn recommendations(books: &[BookRecord], request: &Request) -> Response {
        let isbn = request.text("isbn").unwrap_or_default();
        let limit = request.count("limit").unwrap_or(DEFAULT_RECOMMENDATION_LIMIT);
        let picks: Vec<&BookRecord> = match books.iter().find(|b| b.isbn == isbn) {
            Some(seed) => books
                .iter()
                .filter(|b| b.isbn != seed.isbn && b.category == seed.category)
                .take(limit)
                .collect(),
            None => Vec::new(),
        };
        Response::ok(format!("{} recommendation(s) (offline mode)", picks.len()))
            .with("recommendations", json!(picks))
            .with("offline", true)
    }

    fn personalized(books: &[BookRecord], request: &Request) -> Response {
        let recent: HashSet<String> = match request.field("recentISBNs") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => HashSet::new(),
        };
        let limit = request.count("limit").unwrap_or(DEFAULT_RECOMMENDATION_LIMIT);
        let categories: HashSet<&str> = books
            .iter()
            .filter(|b| recent.contains(&b.isbn))
            .map(|b| b.category.as_str())
            .collect();
        let picks: Vec<&BookRecord> = books
            .iter()
            .filter(|b| !recent.contains(&b.isbn) && categories.contains(b.category.as_str()))
            .take(limit)
            .collect();
        Response::ok(format!("{} recommendation(s) (offline mode)", picks.len()))
            .with("recommendations", json!(picks))
            .with("offline", true)
    }
}

fn search_field<'a>(book: &'a BookRecord, kind: &str) -> &'a str {
    match kind {
        "author" => &book.author,
        "category" => &book.category,
        "isbn" => &book.isbn,
        _ => &book.title,
    }
}

/// Lenient snapshot load: unreadable files give an empty catalogue, bad
/// rows are skipped and a missing copy count means one copy.
async fn load_snapshot(path: &std::path::Path) -> Vec<BookRecord> {
    let table = match flatfile::read_table(path).await {
        Ok(Some(table)) => table,
        Ok(None) => {
            warn!(snapshot = %path.display(), "offline snapshot missing");
            return Vec::new();
        }
        Err(e) => {
            warn!(error = %e, "offline snapshot unreadable");
            return Vec::new();
        }
    };
    table
        .rows
        .into_iter()
        .filter_map(|mut row| {
            let copies = row.entry("Copies".to_string()).or_default();
            if copies.trim().is_empty() {
                *copies = "1".to_string();
            }
            BookRecord::from_row(&row)
                .map_err(|reason| debug!(%reason, "skipping snapshot row"))
                .ok()
        })
        .collect()
}

#[async_trait]
impl Engine for DegradedEngine {
    fn name(&self) -> &str {
        "degraded"
    }

    async fn handle(&mut self, request: &Request) -> Response {
        match request.action {
            Action::Search => Self::search(self.catalogue().await, request),
            Action::Recommendations => Self::recommendations(self.catalogue().await, request),
            Action::PersonalizedRecommendations => {
                Self::personalized(self.catalogue().await, request)
            }
            _ => Response::failure(ENGINE_UNAVAILABLE_MESSAGE),
        }
    }
}
