//! Caller-facing library actions.
//!
//! Each action goes through the bridge and, when the engine accepts it,
//! records the effect in the document store so the next cold start sees it.
//! Store failures are logged; they never change the engine's answer.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{Value, json};
use tracing::warn;

use crate::bridge::Bridge;
use crate::consts::DEFAULT_RECOMMENDATION_LIMIT;
use crate::error::Result;
use crate::protocol::{Identity, Request, Response};
use crate::schema::{
    Document, FlatRecord, TransactionKind, TransactionRecord, default_email, normalize_user_type,
};
use crate::store::{Collection, DocumentStore};

pub struct Library {
    bridge: Arc<Bridge>,
    store: Option<Arc<dyn DocumentStore>>,
    last_timestamp: AtomicI64,
}

impl Library {
    pub fn new(bridge: Arc<Bridge>, store: Option<Arc<dyn DocumentStore>>) -> Self {
        Self {
            bridge,
            store,
            last_timestamp: AtomicI64::new(0),
        }
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    /// Register the caller with the engine and remember them durably.
    pub async fn login(&self, identity: &Identity) -> Response {
        let response = self
            .bridge
            .call_with_retry(&identity.registration(), Some(identity))
            .await;

        if let Some(store) = &self.store {
            let fields = object(json!({
                "name": identity.name,
                "email": default_email(&identity.user_id),
                "type": normalize_user_type(&identity.role),
            }));
            if let Err(e) = store.upsert(Collection::Users, &identity.user_id, fields).await {
                warn!(error = %e, user = %identity.user_id, "failed to persist user");
            }
        }
        response
    }

    pub async fn search(&self, query: &str, search_type: Option<&str>) -> Response {
        self.bridge
            .call(&Request::search(query, search_type.unwrap_or("title")))
            .await
    }

    pub async fn issue(&self, identity: &Identity, isbn: &str) -> Response {
        let response = self
            .bridge
            .call_with_retry(&Request::issue(&identity.user_id, isbn), Some(identity))
            .await;
        if response.success {
            self.record_circulation(identity, isbn, TransactionKind::Issue).await;
        }
        response
    }

    pub async fn return_book(&self, identity: &Identity, isbn: &str) -> Response {
        let response = self
            .bridge
            .call_with_retry(&Request::return_book(&identity.user_id, isbn), Some(identity))
            .await;
        if response.success {
            self.record_circulation(identity, isbn, TransactionKind::Return).await;
        }
        response
    }

    pub async fn reserve(&self, identity: &Identity, isbn: &str) -> Response {
        let response = self
            .bridge
            .call_with_retry(&Request::reserve(&identity.user_id, isbn), Some(identity))
            .await;
        if response.success
            && let Some(store) = &self.store
        {
            let doc = object(json!({
                "userID": identity.user_id,
                "isbn": isbn,
                "timestamp": self.next_timestamp(),
            }));
            if let Err(e) = store.insert_one(Collection::Reservations, doc).await {
                warn!(error = %e, %isbn, "failed to persist reservation");
            }
        }
        response
    }

    pub async fn recommendations(&self, isbn: &str) -> Response {
        self.bridge
            .call(&Request::recommendations(isbn, DEFAULT_RECOMMENDATION_LIMIT))
            .await
    }

    pub async fn personalized_recommendations(
        &self,
        identity: &Identity,
        recent_isbns: &[String],
    ) -> Response {
        let request = Request::personalized_recommendations(
            &identity.user_id,
            recent_isbns,
            DEFAULT_RECOMMENDATION_LIMIT,
        );
        self.bridge.call_with_retry(&request, Some(identity)).await
    }

    pub async fn undo(&self) -> Response {
        self.bridge.call(&Request::undo()).await
    }

    pub async fn profile(&self, identity: &Identity) -> Response {
        self.bridge
            .call_with_retry(&Request::profile(&identity.user_id), Some(identity))
            .await
    }

    async fn record_circulation(&self, identity: &Identity, isbn: &str, kind: TransactionKind) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = self.persist_circulation(store.as_ref(), identity, isbn, kind).await {
            warn!(error = %e, %isbn, %kind, "failed to persist transaction");
        }
    }

    async fn persist_circulation(
        &self,
        store: &dyn DocumentStore,
        identity: &Identity,
        isbn: &str,
        kind: TransactionKind,
    ) -> Result<()> {
        let delta = match kind {
            TransactionKind::Issue => -1,
            TransactionKind::Return => 1,
        };
        if !store.increment(Collection::Books, isbn, "copies", delta).await? {
            warn!(%isbn, "book missing from document store");
        }

        let timestamp = self.next_timestamp();
        let txn = TransactionRecord {
            tid: format!("TXN_{timestamp}"),
            user_id: identity.user_id.clone(),
            isbn: isbn.to_string(),
            copy_id: None,
            kind: kind.to_string(),
            timestamp,
        };
        store.insert_one(Collection::Transactions, txn.to_document()).await
    }

    /// Epoch seconds, strictly increasing across calls.
    fn next_timestamp(&self) -> i64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let mut last = self.last_timestamp.load(Ordering::SeqCst);
        loop {
            let next = now.max(last + 1);
            match self.last_timestamp.compare_exchange(
                last,
                next,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return next,
                Err(current) => last = current,
            }
        }
    }
}

fn object(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}
