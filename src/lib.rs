pub mod bridge;
pub mod config;
pub mod consts;
pub mod engine;
pub mod error;
pub mod events;
pub mod flatfile;
pub mod library;
pub mod protocol;
pub mod schema;
pub mod store;
pub mod sync;

pub use bridge::Bridge;
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use protocol::{Identity, Request, Response};
