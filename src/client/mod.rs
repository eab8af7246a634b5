//! Client connection seam
//!
//! The server does not speak RTSP itself. Every accepted connection is handed
//! to a [`Client`], the per-connection protocol engine, which the server
//! creates through its hooks, wires to the shared session pool, media mapping
//! and auth, and tracks until the client raises its `closed` notification.

pub mod stream;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::auth::AuthRef;
use crate::error::BoxError;
use crate::media::MediaMapping;
use crate::server::RtspServer;
use crate::session::SessionPool;
use crate::signal::Signal;

pub use stream::{ClientStream, PrefixedStream};

/// Per-connection protocol engine managed by an [`RtspServer`]
///
/// Contract with the server:
/// - while managed, the client holds the server through `set_server(Some(..))`
///   and the server calls `set_server(None)` when it stops managing it;
/// - the client raises [`closed`](Client::closed) exactly once when its
///   connection ends.
pub trait Client: Send + Sync {
    /// Set or clear the back-reference to the managing server
    fn set_server(&self, server: Option<Arc<RtspServer>>);

    fn set_session_pool(&self, pool: Option<Arc<SessionPool>>);

    fn set_media_mapping(&self, mapping: Option<Arc<MediaMapping>>);

    fn set_auth(&self, auth: Option<AuthRef>);

    /// Take over a connection accepted by the server's listener
    fn accept(
        &self,
        stream: ClientStream,
        peer: SocketAddr,
        cancel: Option<&CancellationToken>,
    ) -> Result<(), BoxError>;

    /// Take over a connection accepted elsewhere
    ///
    /// Bytes already read off the socket are replayed by `stream` before the
    /// socket's own.
    fn create_from_socket(&self, stream: ClientStream, ip: &str, port: u16) -> Result<(), BoxError>;

    /// Raised once when the client shuts down
    fn closed(&self) -> &Signal<()>;
}

/// Shared client handle
pub type ClientRef = Arc<dyn Client>;
