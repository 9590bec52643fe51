use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::Engine;
use crate::protocol::{Action, Request, Response};

/// What a [`ScriptedEngine`] saw. Shared with the test that built it.
#[derive(Debug, Default)]
pub struct ScriptLog {
    requests: Mutex<Vec<Request>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptLog {
    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn actions(&self) -> Vec<Action> {
        self.requests().iter().map(|r| r.action).collect()
    }

    /// Highest number of requests ever handled at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// A scripted engine for tests. Returns pre-defined responses in order.
pub struct ScriptedEngine {
    responses: VecDeque<Response>,
    fallback: Option<Response>,
    delay: Option<Duration>,
    log: Arc<ScriptLog>,
}

impl ScriptedEngine {
    pub fn new(responses: Vec<Response>) -> Self {
        Self {
            responses: responses.into(),
            fallback: None,
            delay: None,
            log: Arc::new(ScriptLog::default()),
        }
    }

    /// Answer with `response` once the script runs out.
    pub fn with_fallback(mut self, response: Response) -> Self {
        self.fallback = Some(response);
        self
    }

    /// Hold every request for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn log(&self) -> Arc<ScriptLog> {
        Arc::clone(&self.log)
    }
}

#[async_trait]
impl Engine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn handle(&mut self, request: &Request) -> Response {
        let now = self.log.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.log.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Ok(mut requests) = self.log.requests.lock() {
            requests.push(request.clone());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let response = self
            .responses
            .pop_front()
            .or_else(|| self.fallback.clone())
            .unwrap_or_else(|| {
                Response::failure(format!(
                    "ScriptedEngine: no more responses (request {})",
                    self.log.requests().len()
                ))
            });
        self.log.in_flight.fetch_sub(1, Ordering::SeqCst);
        response
    }
}
