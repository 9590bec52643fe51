//! Mapping between document-store records and flat-file rows.
//!
//! Each record kind knows its collection, its fixed column order, and how to
//! fill in missing fields. Documents are lenient (absent fields get
//! defaults); rows are strict about the columns a record cannot do without.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::consts::{
    BOOKS_HEADER, DEFAULT_COPIES, DEFAULT_TID, DEFAULT_USER_TYPE, EMAIL_DOMAIN,
    TRANSACTIONS_HEADER, USERS_HEADER,
};
use crate::flatfile::Row;
use crate::store::Collection;

/// A record as held by the document store.
pub type Document = Map<String, Value>;

/// A record kind with both a document and a flat-file shape.
pub trait FlatRecord: Sized {
    const COLLECTION: Collection;
    const HEADER: &'static [&'static str];

    /// Build from a stored document, applying defaults for absent fields.
    fn from_document(doc: &Document) -> Self;
    fn to_document(&self) -> Document;
    /// Field values in `HEADER` order.
    fn to_row(&self) -> Vec<String>;
    /// Build from a flat-file row. `Err` names what is wrong with it.
    fn from_row(row: &Row) -> Result<Self, String>;
}

/// Project a stored document onto a flat-file row.
pub fn document_to_row<R: FlatRecord>(doc: &Document) -> Vec<String> {
    R::from_document(doc).to_row()
}

/// Lift a flat-file row into a document ready for insertion.
pub fn row_to_document<R: FlatRecord>(row: &Row) -> Result<Document, String> {
    R::from_row(row).map(|r| r.to_document())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookRecord {
    pub isbn: String,
    pub title: String,
    pub author: String,
    pub category: String,
    pub copies: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub name: String,
    pub email: String,
    #[serde(rename = "type")]
    pub user_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub tid: String,
    #[serde(rename = "userID")]
    pub user_id: String,
    pub isbn: String,
    #[serde(rename = "copyID", skip_serializing_if = "Option::is_none")]
    pub copy_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: i64,
}

/// Transaction kinds the bridge itself records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    Issue,
    Return,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::Issue => "ISSUE",
            TransactionKind::Return => "RETURN",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upper-cased user type, `STUDENT` when blank.
pub fn normalize_user_type(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        DEFAULT_USER_TYPE.to_string()
    } else {
        trimmed.to_uppercase()
    }
}

/// `{user_id}@library.edu`.
pub fn default_email(user_id: &str) -> String {
    format!("{user_id}@{EMAIL_DOMAIN}")
}

impl FlatRecord for BookRecord {
    const COLLECTION: Collection = Collection::Books;
    const HEADER: &'static [&'static str] = BOOKS_HEADER;

    fn from_document(doc: &Document) -> Self {
        Self {
            isbn: text(doc, "isbn").unwrap_or_default(),
            title: text(doc, "title").unwrap_or_default(),
            author: text(doc, "author").unwrap_or_default(),
            category: text(doc, "category").unwrap_or_default(),
            copies: integer(doc, "copies")
                .map(|n| n.clamp(0, u32::MAX as i64) as u32)
                .unwrap_or(DEFAULT_COPIES),
        }
    }

    fn to_document(&self) -> Document {
        to_map(self)
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.isbn.clone(),
            self.title.clone(),
            self.author.clone(),
            self.category.clone(),
            self.copies.to_string(),
        ]
    }

    fn from_row(row: &Row) -> Result<Self, String> {
        let copies = required(row, "Copies")?;
        Ok(Self {
            isbn: required(row, "ISBN")?.to_string(),
            title: column(row, "Title")?.to_string(),
            author: column(row, "Author")?.to_string(),
            category: column(row, "Category")?.to_string(),
            copies: copies
                .trim()
                .parse()
                .map_err(|_| format!("Copies is not a non-negative integer: {copies:?}"))?,
        })
    }
}

impl FlatRecord for UserRecord {
    const COLLECTION: Collection = Collection::Users;
    const HEADER: &'static [&'static str] = USERS_HEADER;

    fn from_document(doc: &Document) -> Self {
        let user_id = text(doc, "userID").unwrap_or_default();
        Self {
            email: text(doc, "email")
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| default_email(&user_id)),
            name: text(doc, "name").unwrap_or_default(),
            user_type: normalize_user_type(&text(doc, "type").unwrap_or_default()),
            user_id,
        }
    }

    fn to_document(&self) -> Document {
        to_map(self)
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.user_id.clone(),
            self.name.clone(),
            self.email.clone(),
            self.user_type.clone(),
        ]
    }

    fn from_row(row: &Row) -> Result<Self, String> {
        let user_id = required(row, "UserID")?.to_string();
        let email = optional(row, "Email").unwrap_or_else(|| default_email(&user_id));
        Ok(Self {
            name: column(row, "Name")?.to_string(),
            user_type: normalize_user_type(&optional(row, "Type").unwrap_or_default()),
            email,
            user_id,
        })
    }
}

impl FlatRecord for TransactionRecord {
    const COLLECTION: Collection = Collection::Transactions;
    const HEADER: &'static [&'static str] = TRANSACTIONS_HEADER;

    fn from_document(doc: &Document) -> Self {
        Self {
            tid: text(doc, "tid")
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| DEFAULT_TID.to_string()),
            user_id: text(doc, "userID").unwrap_or_default(),
            isbn: text(doc, "isbn").unwrap_or_default(),
            copy_id: text(doc, "copyID").filter(|c| !c.is_empty()),
            kind: text(doc, "type").unwrap_or_default(),
            timestamp: integer(doc, "timestamp").unwrap_or(0),
        }
    }

    fn to_document(&self) -> Document {
        to_map(self)
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.tid.clone(),
            self.user_id.clone(),
            self.isbn.clone(),
            self.copy_id.clone().unwrap_or_default(),
            self.kind.clone(),
            self.timestamp.to_string(),
        ]
    }

    fn from_row(row: &Row) -> Result<Self, String> {
        let timestamp = required(row, "Timestamp")?;
        Ok(Self {
            tid: optional(row, "TID").unwrap_or_else(|| DEFAULT_TID.to_string()),
            user_id: required(row, "UID")?.to_string(),
            isbn: required(row, "BID")?.to_string(),
            copy_id: optional(row, "CID"),
            kind: required(row, "Type")?.to_uppercase(),
            timestamp: timestamp
                .trim()
                .parse()
                .map_err(|_| format!("Timestamp is not an integer: {timestamp:?}"))?,
        })
    }
}

fn to_map<T: Serialize>(record: &T) -> Document {
    match serde_json::to_value(record) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

fn text(doc: &Document, key: &str) -> Option<String> {
    match doc.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn integer(doc: &Document, key: &str) -> Option<i64> {
    match doc.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f as i64),
        _ => None,
    }
}

/// A column that must be present, though it may be blank.
fn column<'a>(row: &'a Row, key: &str) -> Result<&'a str, String> {
    row.get(key)
        .map(String::as_str)
        .ok_or_else(|| format!("missing column {key}"))
}

/// A column that must be present and non-blank.
fn required<'a>(row: &'a Row, key: &str) -> Result<&'a str, String> {
    let value = column(row, key)?;
    if value.trim().is_empty() {
        return Err(format!("empty {key}"));
    }
    Ok(value)
}

fn optional(row: &Row, key: &str) -> Option<String> {
    row.get(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
