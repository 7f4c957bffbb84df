//! Server error types.

use std::net::SocketAddr;

use thiserror::Error;

use courier_storage::StorageError;
use courier_wire::WireError;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur while serving.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Wire protocol error.
    #[error("wire protocol error: {0}")]
    Wire(#[from] WireError),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Bind failed.
    #[error("failed to bind to {addr}: {source}")]
    BindFailed {
        /// Requested listen address.
        addr: SocketAddr,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// The peer closed the connection.
    #[error("connection closed")]
    ConnectionClosed,
}
