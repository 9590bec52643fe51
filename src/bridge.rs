//! The single entry point callers use to talk to the engine.
//!
//! Every [`Bridge::call`] holds one exclusive lock for its whole duration:
//! liveness check, restart, write and read. At most one request is ever in
//! flight against the engine; other callers queue on the lock.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::BridgeConfig;
use crate::engine::Engine;
use crate::engine::supervisor::Supervisor;
use crate::events::EventBus;
use crate::protocol::{Identity, Request, Response, Verdict};
use crate::store::DocumentStore;

pub struct Bridge {
    engine: Mutex<Box<dyn Engine>>,
}

impl Bridge {
    pub fn new(engine: Box<dyn Engine>) -> Self {
        Self {
            engine: Mutex::new(engine),
        }
    }

    /// A bridge driving the real engine process described by `config`.
    pub fn supervised(
        config: BridgeConfig,
        store: Option<Arc<dyn DocumentStore>>,
        events: Arc<EventBus>,
    ) -> Self {
        Self::new(Box::new(Supervisor::new(config, store, events)))
    }

    /// Start the engine now instead of on the first call.
    pub async fn start(&self) {
        self.engine.lock().await.start().await;
    }

    /// Name of the engine currently answering.
    pub async fn engine_name(&self) -> String {
        self.engine.lock().await.name().to_string()
    }

    /// Send one request and wait for its response.
    pub async fn call(&self, request: &Request) -> Response {
        let mut engine = self.engine.lock().await;
        debug!(action = %request.action, "dispatching");
        engine.handle(request).await
    }

    /// [`call`](Self::call), re-registering `identity` and trying exactly once
    /// more if the engine has forgotten the caller.
    pub async fn call_with_retry(
        &self,
        request: &Request,
        identity: Option<&Identity>,
    ) -> Response {
        let response = self.call(request).await;
        let (Verdict::Recoverable(reason), Some(identity)) = (response.verdict(), identity) else {
            return response;
        };

        info!(
            user = %identity.user_id,
            action = %request.action,
            ?reason,
            "engine forgot caller, re-registering"
        );
        let _ = self.call(&identity.registration()).await;
        self.call(request).await
    }
}
