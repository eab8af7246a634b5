//! Error types
//!
//! Start-up errors (resolution, socket creation, bind, listen) abort the
//! attempt and are returned to the caller. Per-connection errors are logged by
//! the acceptor and only drop that connection.

use std::io;

use thiserror::Error;

use crate::media::ConstructError;

/// Boxed error returned by client implementations
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias for server operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for server operations
#[derive(Debug, Error)]
pub enum Error {
    /// The address/service pair did not resolve to any socket address
    #[error("failed to resolve {address}/{service}: {source}")]
    SocketResolution {
        address: String,
        service: String,
        #[source]
        source: io::Error,
    },

    /// No candidate socket could be created
    #[error("failed to create socket: {0}")]
    SocketCreate(#[source] io::Error),

    /// No candidate socket could be bound; carries the first bind error
    #[error("failed to bind socket: {0}")]
    Bind(#[source] io::Error),

    /// The bound socket refused to listen
    #[error("failed to listen on socket: {0}")]
    Listen(#[source] io::Error),

    /// The server socket is bound already
    #[error("server socket is already bound")]
    AlreadyBound,

    /// The operation was cancelled through its token
    #[error("operation cancelled")]
    Cancelled,

    /// The create-client hook returned no client
    #[error("failed to create a client")]
    ClientCreation,

    /// Handing the connection to the client failed
    #[error("failed to accept client: {0}")]
    Accept(#[source] BoxError),

    /// Media construction failed
    #[error(transparent)]
    Construct(#[from] ConstructError),

    /// Other I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Whether this error happened while bringing up the listening socket
    pub fn is_startup(&self) -> bool {
        matches!(
            self,
            Error::SocketResolution { .. }
                | Error::SocketCreate(_)
                | Error::Bind(_)
                | Error::Listen(_)
                | Error::AlreadyBound
        )
    }
}
