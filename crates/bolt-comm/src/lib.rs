//! Connection and dispatch core of the bolt client.
//!
//! The client keeps one stream open to the bolt server (the listener) and,
//! optionally, one to the bolt sink (the publisher):
//!
//! - the listener subscribes with a `<topics>:<hostname>` handshake and feeds
//!   every frame it reads to a [`FrameHandler`]
//! - [`MessageRouter`] is the usual handler: it decodes the task envelope,
//!   resolves the plugin through a [`PluginRegistry`] and runs its executor
//! - the publisher forwards bytes queued through a [`Publisher`] handle
//!
//! # Examples
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use bolt_comm::{ConnectionConfig, ConnectionManager, MessageRouter, StaticPluginRegistry};
//! # async fn run() -> bolt_comm::CommResult<()> {
//! let router = MessageRouter::new(StaticPluginRegistry::new());
//!
//! let mut manager = ConnectionManager::new(ConnectionConfig::default());
//! manager.register_handler(Arc::new(router));
//! manager.start(true)?;
//! // ...
//! manager.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod plugin;
pub mod router;
pub mod types;

pub use config::ConnectionConfig;
pub use connection::ConnectionManager;
pub use connection::Publisher;
pub use error::CommError;
pub use error::CommResult;
pub use error::DispatchError;
pub use error::DispatchResult;
pub use handler::FrameHandler;
pub use handler::LogFrameHandler;
pub use plugin::PluginExecutor;
pub use plugin::PluginFactory;
pub use plugin::PluginRegistry;
pub use plugin::StaticPluginRegistry;
pub use router::MessageRouter;
pub use types::Payload;
pub use types::TaskMessage;
pub use types::MAX_FRAME_SIZE;
