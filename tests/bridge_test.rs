use std::sync::Arc;
use std::time::Duration;

use library_bridge::engine::mock::ScriptedEngine;
use library_bridge::protocol::{Action, Identity, Request, Response};
use library_bridge::Bridge;

fn alice() -> Identity {
    Identity::new("u42", "Alice", "student")
}

fn build(responses: Vec<Response>) -> (Bridge, Arc<library_bridge::engine::mock::ScriptLog>) {
    let engine = ScriptedEngine::new(responses);
    let log = engine.log();
    (Bridge::new(Box::new(engine)), log)
}

#[tokio::test]
async fn call_returns_engine_response_verbatim() {
    let reply = Response::ok("Found 1 book(s)").with("books", serde_json::json!([{"isbn": "1"}]));
    let (bridge, log) = build(vec![reply.clone()]);

    let resp = bridge.call(&Request::search("Hobbit", "title")).await;
    assert_eq!(resp, reply);
    assert_eq!(log.actions(), vec![Action::Search]);
}

#[tokio::test]
async fn success_is_not_retried() {
    let (bridge, log) = build(vec![Response::ok("Issued")]);

    let resp = bridge
        .call_with_retry(&Request::issue("u42", "1"), Some(&alice()))
        .await;
    assert!(resp.success);
    assert_eq!(log.actions(), vec![Action::Issue]);
}

#[tokio::test]
async fn plain_failure_is_not_retried() {
    let (bridge, log) = build(vec![Response::failure("No copies available")]);

    let resp = bridge
        .call_with_retry(&Request::issue("u42", "1"), Some(&alice()))
        .await;
    assert_eq!(resp.message, "No copies available");
    assert_eq!(log.actions(), vec![Action::Issue]);
}

#[tokio::test]
async fn unknown_user_reregisters_then_retries_once() {
    let (bridge, log) = build(vec![
        Response::failure("Error: User not found"),
        Response::ok("User added"),
        Response::ok("Book issued"),
    ]);

    let resp = bridge
        .call_with_retry(&Request::issue("u42", "1"), Some(&alice()))
        .await;

    assert!(resp.success);
    assert_eq!(resp.message, "Book issued");
    assert_eq!(
        log.actions(),
        vec![Action::Issue, Action::AddUser, Action::Issue]
    );

    let registration = &log.requests()[1];
    assert_eq!(registration.text("userID").as_deref(), Some("u42"));
    assert_eq!(registration.text("name").as_deref(), Some("Alice"));
    assert_eq!(registration.text("type").as_deref(), Some("student"));
}

#[tokio::test]
async fn invalid_user_marker_also_triggers_retry() {
    let (bridge, log) = build(vec![
        Response::failure("Invalid user"),
        Response::failure("whatever"),
        Response::ok("profile").with("name", "Alice"),
    ]);

    let resp = bridge
        .call_with_retry(&Request::profile("u42"), Some(&alice()))
        .await;
    assert!(resp.success, "registration result is discarded");
    assert_eq!(log.actions().len(), 3);
}

#[tokio::test]
async fn retry_happens_at_most_once() {
    let (bridge, log) = build(vec![
        Response::failure("User not found"),
        Response::ok("User added"),
        Response::failure("User not found"),
        Response::ok("never reached"),
    ]);

    let resp = bridge
        .call_with_retry(&Request::reserve("u42", "1"), Some(&alice()))
        .await;
    assert!(!resp.success);
    assert_eq!(resp.message, "User not found");
    assert_eq!(log.actions().len(), 3);
}

#[tokio::test]
async fn no_identity_means_no_retry() {
    let (bridge, log) = build(vec![Response::failure("User not found")]);

    let resp = bridge.call_with_retry(&Request::profile("u42"), None).await;
    assert_eq!(resp.message, "User not found");
    assert_eq!(log.actions(), vec![Action::Profile]);
}

#[tokio::test]
async fn concurrent_calls_never_overlap() {
    let engine = ScriptedEngine::new(vec![])
        .with_fallback(Response::ok("pong"))
        .with_delay(Duration::from_millis(10));
    let log = engine.log();
    let bridge = Arc::new(Bridge::new(Box::new(engine)));

    let calls: Vec<_> = (0..16)
        .map(|i| {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move { bridge.call(&Request::search(&i.to_string(), "isbn")).await })
        })
        .collect();

    for result in futures::future::join_all(calls).await {
        assert!(result.unwrap().success);
    }
    assert_eq!(log.requests().len(), 16);
    assert_eq!(log.max_in_flight(), 1);
}
