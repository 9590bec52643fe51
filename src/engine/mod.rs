pub mod degraded;
pub mod mock;
pub mod process;
pub mod supervisor;

use async_trait::async_trait;

use crate::protocol::{Request, Response};

/// Something that answers protocol requests. The bridge only knows this
/// trait; whether a live process or an offline snapshot is behind it is
/// decided once, by the supervisor.
///
/// `handle` never fails: every problem is reported as a `success: false`
/// response.
#[async_trait]
pub trait Engine: Send {
    fn name(&self) -> &str;

    /// Bring the engine up ahead of the first request. No-op by default.
    async fn start(&mut self) {}

    /// OS process id, when there is a process behind the engine.
    fn pid(&self) -> Option<u32> {
        None
    }

    /// Whether the engine can still take requests.
    fn is_alive(&mut self) -> bool {
        true
    }

    async fn handle(&mut self, request: &Request) -> Response;
}
