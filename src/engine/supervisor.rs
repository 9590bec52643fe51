//! Owns the engine's lifecycle: locate, sync, spawn, watch, restart, degrade.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use super::Engine;
use super::degraded::DegradedEngine;
use super::process::{LaunchSpec, ProcessEngine};
use crate::config::BridgeConfig;
use crate::consts::ENGINE_UNAVAILABLE_MESSAGE;
use crate::error::BridgeError;
use crate::events::{Event, EventBus};
use crate::protocol::{Request, Response};
use crate::store::DocumentStore;
use crate::sync::StartupSync;

/// The single authority over which engine answers requests.
///
/// Holds at most one engine. Once degraded it stays degraded and never
/// spawns again.
pub struct Supervisor {
    config: BridgeConfig,
    sync: StartupSync,
    events: Arc<EventBus>,
    engine: Option<Box<dyn Engine>>,
    degraded: bool,
    starts: usize,
}

impl Supervisor {
    pub fn new(
        config: BridgeConfig,
        store: Option<Arc<dyn DocumentStore>>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            sync: StartupSync::new(&config, store),
            config,
            events,
            engine: None,
            degraded: false,
            starts: 0,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Number of engine processes successfully started so far.
    pub fn starts(&self) -> usize {
        self.starts
    }

    /// Start an engine unless one is already held.
    pub async fn ensure_started(&mut self) {
        if self.engine.is_some() {
            return;
        }

        let Some(program) = self.config.locate_engine() else {
            let err = BridgeError::ExecutableNotFound {
                searched: self.config.engine_candidates.clone(),
            };
            warn!("{err}");
            self.degrade(err.to_string());
            return;
        };

        match self.sync.run().await {
            Ok(report) if !report.skipped => {
                self.events.emit(Event::Rehydrated {
                    books: report.books,
                    users: report.users,
                    transactions: report.transactions,
                });
            }
            Ok(_) => {}
            Err(e) if self.sync.projections_exist() => {
                warn!(error = %e, "starting engine on the flat files already on disk");
            }
            Err(e) => {
                error!(error = %e, "cannot prepare engine input");
                self.degrade(e.to_string());
                return;
            }
        }

        let spec = LaunchSpec::from_config(&self.config, program);
        match ProcessEngine::spawn(&spec).await {
            Ok(engine) => {
                self.starts += 1;
                let pid = engine.id();
                info!(
                    ?pid,
                    start = self.starts,
                    program = %spec.program.display(),
                    "engine started"
                );
                self.events.emit(Event::EngineStarted {
                    pid,
                    start: self.starts,
                });
                self.engine = Some(Box::new(engine));
            }
            Err(e) => {
                error!(error = %e, program = %spec.program.display(), "failed to start engine");
                self.degrade(e.to_string());
            }
        }
    }

    /// Replace a dead engine before the next request goes out.
    pub async fn ensure_alive(&mut self) {
        let dead = self.engine.as_mut().is_some_and(|e| !e.is_alive());
        if dead {
            let pid = self.engine.as_ref().and_then(|e| e.pid());
            warn!(?pid, "engine process died, restarting");
            self.events.emit(Event::EngineExited { pid });
            self.engine = None;
        }
        self.ensure_started().await;
    }

    fn degrade(&mut self, reason: String) {
        warn!(%reason, "switching to offline engine");
        self.degraded = true;
        self.engine = Some(Box::new(DegradedEngine::new(self.config.snapshot_file())));
        self.events.emit(Event::Degraded { reason });
    }
}

#[async_trait]
impl Engine for Supervisor {
    fn name(&self) -> &str {
        match &self.engine {
            Some(engine) => engine.name(),
            None => "supervisor",
        }
    }

    async fn start(&mut self) {
        self.ensure_started().await;
    }

    fn pid(&self) -> Option<u32> {
        self.engine.as_ref().and_then(|e| e.pid())
    }

    async fn handle(&mut self, request: &Request) -> Response {
        self.ensure_alive().await;
        match self.engine.as_mut() {
            Some(engine) => engine.handle(request).await,
            None => Response::failure(ENGINE_UNAVAILABLE_MESSAGE),
        }
    }
}
