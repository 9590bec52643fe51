use std::sync::Arc;

use serde_json::json;

use library_bridge::engine::mock::{ScriptLog, ScriptedEngine};
use library_bridge::library::Library;
use library_bridge::protocol::{Action, Identity, Response};
use library_bridge::schema::Document;
use library_bridge::store::sqlite::SqliteStore;
use library_bridge::store::{Collection, DocumentStore};
use library_bridge::Bridge;

struct Harness {
    library: Library,
    store: Arc<SqliteStore>,
    log: Arc<ScriptLog>,
}

async fn harness(engine: ScriptedEngine) -> Harness {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let mut book = Document::new();
    book.insert("isbn".into(), json!("978"));
    book.insert("title".into(), json!("The Hobbit"));
    book.insert("copies".into(), json!(2));
    store.insert_one(Collection::Books, book).await.unwrap();

    let log = engine.log();
    let bridge = Arc::new(Bridge::new(Box::new(engine)));
    let library = Library::new(bridge, Some(store.clone() as Arc<dyn DocumentStore>));
    Harness { library, store, log }
}

fn ada() -> Identity {
    Identity::new("u1", "Ada", "faculty")
}

impl Harness {
    async fn copies(&self) -> i64 {
        let book = self
            .store
            .find_one(Collection::Books, "978")
            .await
            .unwrap()
            .unwrap();
        book["copies"].as_i64().unwrap()
    }

    async fn transactions(&self) -> Vec<Document> {
        self.store.find_all(Collection::Transactions).await.unwrap()
    }
}

#[tokio::test]
async fn accepted_issue_decrements_copies_and_logs_transaction() {
    let h = harness(ScriptedEngine::new(vec![]).with_fallback(Response::ok("Book issued"))).await;

    let resp = h.library.issue(&ada(), "978").await;
    assert!(resp.success);
    assert_eq!(h.copies().await, 1);

    let txns = h.transactions().await;
    assert_eq!(txns.len(), 1);
    assert_eq!(txns[0]["type"], json!("ISSUE"));
    assert_eq!(txns[0]["userID"], json!("u1"));
    assert_eq!(txns[0]["isbn"], json!("978"));
    let ts = txns[0]["timestamp"].as_i64().unwrap();
    assert_eq!(txns[0]["tid"], json!(format!("TXN_{ts}")));
    assert!(txns[0].get("copyID").is_none());
}

#[tokio::test]
async fn refused_issue_leaves_store_untouched() {
    let h = harness(ScriptedEngine::new(vec![Response::failure("No copies available")])).await;

    let resp = h.library.issue(&ada(), "978").await;
    assert!(!resp.success);
    assert_eq!(h.copies().await, 2);
    assert!(h.transactions().await.is_empty());
}

#[tokio::test]
async fn issue_then_return_restores_copies_with_ordered_timestamps() {
    let h = harness(ScriptedEngine::new(vec![]).with_fallback(Response::ok("done"))).await;

    h.library.issue(&ada(), "978").await;
    h.library.return_book(&ada(), "978").await;
    h.library.issue(&ada(), "978").await;

    assert_eq!(h.copies().await, 1);
    let txns = h.transactions().await;
    let kinds: Vec<&str> = txns.iter().map(|t| t["type"].as_str().unwrap()).collect();
    assert_eq!(kinds, vec!["ISSUE", "RETURN", "ISSUE"]);
    let stamps: Vec<i64> = txns.iter().map(|t| t["timestamp"].as_i64().unwrap()).collect();
    assert!(stamps.windows(2).all(|w| w[0] < w[1]), "{stamps:?}");
}

#[tokio::test]
async fn copies_never_go_negative() {
    let h = harness(ScriptedEngine::new(vec![]).with_fallback(Response::ok("Book issued"))).await;

    for _ in 0..4 {
        h.library.issue(&ada(), "978").await;
    }
    assert_eq!(h.copies().await, 0);
    assert_eq!(h.transactions().await.len(), 4);
}

#[tokio::test]
async fn issue_after_reregistration_is_persisted_once() {
    let h = harness(ScriptedEngine::new(vec![
        Response::failure("User not found"),
        Response::ok("User added"),
        Response::ok("Book issued"),
    ]))
    .await;

    let resp = h.library.issue(&ada(), "978").await;
    assert!(resp.success);
    assert_eq!(
        h.log.actions(),
        vec![Action::Issue, Action::AddUser, Action::Issue]
    );
    assert_eq!(h.copies().await, 1);
    assert_eq!(h.transactions().await.len(), 1);
}

#[tokio::test]
async fn login_upserts_user_document() {
    let h = harness(ScriptedEngine::new(vec![]).with_fallback(Response::ok("User added"))).await;

    h.library.login(&ada()).await;
    h.library
        .login(&Identity::new("u1", "Ada Lovelace", "librarian"))
        .await;

    let users = h.store.find_all(Collection::Users).await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["userID"], json!("u1"));
    assert_eq!(users[0]["name"], json!("Ada Lovelace"));
    assert_eq!(users[0]["email"], json!("u1@library.edu"));
    assert_eq!(users[0]["type"], json!("LIBRARIAN"));
    assert_eq!(h.log.actions(), vec![Action::AddUser, Action::AddUser]);
}

#[tokio::test]
async fn accepted_reservation_is_recorded() {
    let h = harness(ScriptedEngine::new(vec![
        Response::ok("Reserved"),
        Response::failure("Already reserved"),
    ]))
    .await;

    assert!(h.library.reserve(&ada(), "978").await.success);
    assert!(!h.library.reserve(&ada(), "978").await.success);

    let reservations = h.store.find_all(Collection::Reservations).await.unwrap();
    assert_eq!(reservations.len(), 1);
    assert_eq!(reservations[0]["userID"], json!("u1"));
    assert_eq!(reservations[0]["isbn"], json!("978"));
    assert_eq!(h.copies().await, 2);
}

#[tokio::test]
async fn read_actions_pass_through_without_side_effects() {
    let h = harness(ScriptedEngine::new(vec![]).with_fallback(Response::ok("fine"))).await;

    h.library.search("hobbit", None).await;
    h.library.recommendations("978").await;
    h.library
        .personalized_recommendations(&ada(), &["978".to_string()])
        .await;
    h.library.profile(&ada()).await;
    h.library.undo().await;

    let requests = h.log.requests();
    assert_eq!(requests[0].text("type").as_deref(), Some("title"));
    assert_eq!(requests[1].count("limit"), Some(6));
    assert_eq!(
        h.log.actions(),
        vec![
            Action::Search,
            Action::Recommendations,
            Action::PersonalizedRecommendations,
            Action::Profile,
            Action::Undo,
        ]
    );
    assert!(h.transactions().await.is_empty());
    assert_eq!(h.copies().await, 2);
}

#[tokio::test]
async fn without_store_actions_still_answer() {
    let engine = ScriptedEngine::new(vec![]).with_fallback(Response::ok("Book issued"));
    let library = Library::new(Arc::new(Bridge::new(Box::new(engine))), None);

    let resp = library.issue(&ada(), "978").await;
    assert_eq!(resp.message, "Book issued");
}
