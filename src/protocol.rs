//! Wire types of the engine's line-delimited JSON protocol.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::consts::RECOVERABLE_IDENTITY_MARKERS;

/// The request discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    AddUser,
    Search,
    Issue,
    Return,
    Reserve,
    Recommendations,
    PersonalizedRecommendations,
    Undo,
    Profile,
}

impl Action {
    /// Fields the engine expects alongside this action.
    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            Action::AddUser => &["userID", "name", "type"],
            Action::Search => &["query", "type"],
            Action::Issue | Action::Return | Action::Reserve => &["userID", "isbn"],
            Action::Recommendations => &["isbn", "limit"],
            Action::PersonalizedRecommendations => &["userID", "recentISBNs", "limit"],
            Action::Undo => &[],
            Action::Profile => &["userID"],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Action::AddUser => "add_user",
            Action::Search => "search",
            Action::Issue => "issue",
            Action::Return => "return",
            Action::Reserve => "reserve",
            Action::Recommendations => "recommendations",
            Action::PersonalizedRecommendations => "personalized_recommendations",
            Action::Undo => "undo",
            Action::Profile => "profile",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request line: `{"action": ..., <fields>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub action: Action,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Request {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            fields: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// A field as text, accepting numbers as well.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.fields.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// A field as a count, accepting numeric strings as well.
    pub fn count(&self, key: &str) -> Option<usize> {
        match self.fields.get(key)? {
            Value::Number(n) => n.as_u64().map(|n| n as usize),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Names of required fields that are absent or null.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        self.action
            .required_fields()
            .iter()
            .copied()
            .filter(|key| matches!(self.fields.get(*key), None | Some(Value::Null)))
            .collect()
    }

    pub fn add_user(user_id: &str, name: &str, user_type: &str) -> Self {
        Self::new(Action::AddUser)
            .with("userID", user_id)
            .with("name", name)
            .with("type", user_type)
    }

    pub fn search(query: &str, search_type: &str) -> Self {
        Self::new(Action::Search)
            .with("query", query)
            .with("type", search_type)
    }

    pub fn issue(user_id: &str, isbn: &str) -> Self {
        Self::new(Action::Issue).with("userID", user_id).with("isbn", isbn)
    }

    pub fn return_book(user_id: &str, isbn: &str) -> Self {
        Self::new(Action::Return).with("userID", user_id).with("isbn", isbn)
    }

    pub fn reserve(user_id: &str, isbn: &str) -> Self {
        Self::new(Action::Reserve).with("userID", user_id).with("isbn", isbn)
    }

    pub fn recommendations(isbn: &str, limit: usize) -> Self {
        Self::new(Action::Recommendations)
            .with("isbn", isbn)
            .with("limit", limit)
    }

    pub fn personalized_recommendations(user_id: &str, recent: &[String], limit: usize) -> Self {
        Self::new(Action::PersonalizedRecommendations)
            .with("userID", user_id)
            .with("recentISBNs", json!(recent))
            .with("limit", limit)
    }

    pub fn undo() -> Self {
        Self::new(Action::Undo)
    }

    pub fn profile(user_id: &str) -> Self {
        Self::new(Action::Profile).with("userID", user_id)
    }
}

/// One response line: `{"success": bool, "message": str, <payload>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

/// Why a failed response may be worth one more attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverableFailure {
    /// The engine has no record of the caller (e.g. after a restart).
    IdentityUnknown,
}

/// Classification of a response, derived once from its content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Success,
    Recoverable(RecoverableFailure),
    Failed,
}

impl Response {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Map::new(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }

    /// Decode one engine output line. Undecodable lines become failures.
    pub fn from_line(line: &str) -> Self {
        match serde_json::from_str::<Response>(line.trim()) {
            Ok(response) => response,
            Err(e) => Self::failure(format!("invalid engine response: {e}")),
        }
    }

    pub fn verdict(&self) -> Verdict {
        if self.success {
            return Verdict::Success;
        }
        if RECOVERABLE_IDENTITY_MARKERS
            .iter()
            .any(|marker| self.message.contains(marker))
        {
            return Verdict::Recoverable(RecoverableFailure::IdentityUnknown);
        }
        Verdict::Failed
    }
}

/// The caller on whose behalf a request is made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub name: String,
    pub role: String,
}

impl Identity {
    pub fn new(
        user_id: impl Into<String>,
        name: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            name: name.into(),
            role: role.into(),
        }
    }

    /// The `add_user` request that re-registers this identity.
    pub fn registration(&self) -> Request {
        Request::add_user(&self.user_id, &self.name, &self.role)
    }
}
