//! Error types for the bolt client connection and dispatch paths.

use core::error::Error;

use derive_more::Display;
use error_stack::Report;

/// Result type for connection-level operations.
pub type CommResult<T> = Result<T, Report<CommError>>;

/// Result type for per-frame dispatch operations.
pub type DispatchResult<T> = Result<T, Report<DispatchError>>;

/// Errors that affect a whole connection worker.
#[derive(Debug, Display)]
pub enum CommError {
    /// Could not establish a stream to the peer
    #[display("Connection error ({peer}): {message}")]
    Connection { peer: String, message: String },

    /// Writing to an established stream failed
    #[display("Write error ({peer}): {message}")]
    Write { peer: String, message: String },

    /// The manager already owns live workers
    #[display("Connection manager is already running")]
    AlreadyRunning,

    /// The publisher worker is not running
    #[display("Publisher is not running")]
    PublisherClosed,

    /// A worker task ended abnormally
    #[display("Worker {role} failed: {message}")]
    Worker { role: String, message: String },
}

impl Error for CommError {}

/// Errors local to a single inbound frame.
///
/// None of these terminate the connection that delivered the frame.
#[derive(Debug, Display)]
pub enum DispatchError {
    /// Malformed or incomplete task envelope
    #[display("Failed to decode task envelope: {message}")]
    Decode { message: String },

    /// No plugin registered under the requested name
    #[display("Unknown plugin `{name}`")]
    UnknownPlugin { name: String },

    /// Plugin is registered but cannot handle payloads
    #[display("Plugin `{name}` does not handle payloads")]
    UnsupportedExecutor { name: String },
}

impl Error for DispatchError {}
