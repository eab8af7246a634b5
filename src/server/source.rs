//! Listen source
//!
//! Wraps the bound listening socket and drives the accept loop on a tokio
//! runtime. The loop is a single task, so connections are handed to the
//! server one at a time.

use std::io;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

use super::listener::RtspServer;

/// Pause after a failed accept, so persistent errors such as EMFILE don't
/// spin the loop
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Readiness source for the server socket, not yet running
pub struct ListenSource {
    server: Arc<RtspServer>,
    listener: StdTcpListener,
    cancel: CancellationToken,
}

impl ListenSource {
    pub(crate) fn new(
        server: Arc<RtspServer>,
        listener: StdTcpListener,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            server,
            listener,
            cancel,
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Token that stops the accept loop
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Start accepting connections on `handle`
    pub fn attach(self, handle: &Handle) -> Result<SourceHandle> {
        let listener = {
            let _guard = handle.enter();
            TcpListener::from_std(self.listener)?
        };

        let cancel = self.cancel.clone();
        let task = handle.spawn(accept_loop(self.server, listener, self.cancel));

        Ok(SourceHandle { cancel, task })
    }
}

impl std::fmt::Debug for ListenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenSource")
            .field("addr", &self.listener.local_addr().ok())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Running accept loop
#[derive(Debug)]
pub struct SourceHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SourceHandle {
    /// Ask the accept loop to exit
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the accept loop to exit
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Accept loop task failed");
        }
    }
}

async fn accept_loop(server: Arc<RtspServer>, listener: TcpListener, cancel: CancellationToken) {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(addr = %addr, "RTSP server listening");
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("Listen source cancelled");
                break;
            }
            result = listener.accept() => match result {
                Ok((stream, peer)) => {
                    if let Err(e) = server.on_readable(stream, peer, Some(&cancel)) {
                        tracing::debug!(peer = %peer, error = %e, "Connection dropped");
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                    if !backoff(&cancel).await {
                        tracing::debug!("Listen source cancelled");
                        break;
                    }
                }
            }
        }
    }
}

/// Wait [`ACCEPT_ERROR_BACKOFF`]. Returns false if cancelled meanwhile.
async fn backoff(cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => true,
    }
}
