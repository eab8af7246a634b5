//! RTSP server
//!
//! [`RtspServer`] binds the listening socket, accepts connections through a
//! [`ListenSource`] and keeps track of the clients it created. Client creation
//! and the hand-over of a connection go through [`ServerHooks`].

use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::auth::AuthRef;
use crate::client::{ClientRef, ClientStream, PrefixedStream};
use crate::error::{BoxError, Error, Result};
use crate::media::MediaMapping;
use crate::session::SessionPool;
use crate::signal::{HandlerId, Signal};

use super::config::ServerConfig;
use super::registry::ClientRegistry;
use super::socket::bind_listener;
use super::source::{ListenSource, SourceHandle};

/// Overridable client creation
///
/// The server manages a client before handing it the connection. A client
/// that raises `closed` during or right after the hand-over is unmanaged
/// straight away, so it may already be gone from [`RtspServer::clients`]
/// when `client-connected` observers see it.
pub trait ServerHooks: Send + Sync {
    /// Create a bare client for a new connection
    fn new_client(&self, server: &Arc<RtspServer>) -> Option<ClientRef>;

    /// Create a client wired to the server's session pool, media mapping and
    /// auth
    fn create_client(&self, server: &Arc<RtspServer>) -> Option<ClientRef> {
        default_create_client(self, server)
    }

    /// Hand a freshly accepted connection to `client`
    fn accept_client(
        &self,
        server: &Arc<RtspServer>,
        client: &ClientRef,
        stream: ClientStream,
        peer: SocketAddr,
        cancel: Option<&CancellationToken>,
    ) -> std::result::Result<(), BoxError> {
        default_accept_client(server, client, stream, peer, cancel)
    }
}

/// `new_client`, then pass on the server's session pool, mapping and auth
pub fn default_create_client<H>(hooks: &H, server: &Arc<RtspServer>) -> Option<ClientRef>
where
    H: ServerHooks + ?Sized,
{
    let client = hooks.new_client(server)?;

    client.set_session_pool(Some(server.session_pool()));
    client.set_media_mapping(Some(server.media_mapping()));
    client.set_auth(server.auth());

    Some(client)
}

/// Call [`Client::accept`](crate::client::Client::accept)
pub fn default_accept_client(
    _server: &Arc<RtspServer>,
    client: &ClientRef,
    stream: ClientStream,
    peer: SocketAddr,
    cancel: Option<&CancellationToken>,
) -> std::result::Result<(), BoxError> {
    client.accept(stream, peer, cancel)
}

#[derive(Default)]
struct SocketState {
    /// Bound listener, until a source takes it
    listener: Option<StdTcpListener>,
    /// Set once the socket is bound, never cleared
    local_addr: Option<SocketAddr>,
}

/// RTSP server
pub struct RtspServer {
    config: Mutex<ServerConfig>,
    socket: Mutex<SocketState>,
    hooks: Box<dyn ServerHooks>,
    registry: ClientRegistry,
    client_connected: Signal<ClientRef>,
}

impl RtspServer {
    /// Create a new server with the given configuration and hooks
    pub fn new(config: ServerConfig, hooks: impl ServerHooks + 'static) -> Arc<Self> {
        Arc::new(Self {
            config: Mutex::new(config),
            socket: Mutex::new(SocketState::default()),
            hooks: Box::new(hooks),
            registry: ClientRegistry::new(),
            client_connected: Signal::new(),
        })
    }

    /// Snapshot of the configuration
    pub fn config(&self) -> ServerConfig {
        self.config.lock().clone()
    }

    /// Set the address to bind to. Has no effect once the socket is bound.
    pub fn set_address(&self, address: impl Into<String>) {
        self.config.lock().address = address.into();
    }

    pub fn address(&self) -> String {
        self.config.lock().address.clone()
    }

    /// Set the service to listen on. Has no effect once the socket is bound.
    pub fn set_service(&self, service: impl Into<String>) {
        self.config.lock().service = service.into();
    }

    pub fn service(&self) -> String {
        self.config.lock().service.clone()
    }

    pub fn set_backlog(&self, backlog: i32) {
        self.config.lock().backlog = backlog;
    }

    pub fn backlog(&self) -> i32 {
        self.config.lock().backlog
    }

    pub fn set_session_pool(&self, pool: Arc<SessionPool>) {
        self.config.lock().session_pool = pool;
    }

    pub fn session_pool(&self) -> Arc<SessionPool> {
        Arc::clone(&self.config.lock().session_pool)
    }

    pub fn set_media_mapping(&self, mapping: Arc<MediaMapping>) {
        self.config.lock().media_mapping = mapping;
    }

    pub fn media_mapping(&self) -> Arc<MediaMapping> {
        Arc::clone(&self.config.lock().media_mapping)
    }

    pub fn set_auth(&self, auth: Option<AuthRef>) {
        self.config.lock().auth = auth;
    }

    pub fn auth(&self) -> Option<AuthRef> {
        self.config.lock().auth.clone()
    }

    /// Local address of the bound socket
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.lock().local_addr
    }

    /// Port the socket is bound to, `None` before binding
    pub fn bound_port(&self) -> Option<u16> {
        self.local_addr().map(|addr| addr.port())
    }

    /// Bind the server socket
    ///
    /// A server binds at most once; later calls fail with
    /// [`Error::AlreadyBound`].
    pub fn create_socket(&self, cancel: Option<&CancellationToken>) -> Result<SocketAddr> {
        let (address, service, backlog) = {
            let config = self.config.lock();
            (config.address.clone(), config.service.clone(), config.backlog)
        };

        let mut socket = self.socket.lock();
        if socket.local_addr.is_some() {
            return Err(Error::AlreadyBound);
        }

        let listener = bind_listener(&address, &service, backlog, cancel)?;
        let local_addr = listener.local_addr()?;

        socket.listener = Some(listener);
        socket.local_addr = Some(local_addr);

        Ok(local_addr)
    }

    /// Create the readiness source for the server socket, binding it if needed
    pub fn create_source(self: &Arc<Self>, cancel: Option<CancellationToken>) -> Result<ListenSource> {
        let cancel = cancel.unwrap_or_default();

        let bound = self.socket.lock().local_addr.is_some();
        if !bound {
            self.create_socket(Some(&cancel))?;
        }

        let listener = self.socket.lock().listener.take().ok_or(Error::AlreadyBound)?;

        Ok(ListenSource::new(Arc::clone(self), listener, cancel))
    }

    /// Bind if needed and start accepting connections on `handle`
    pub fn attach(self: &Arc<Self>, handle: &Handle) -> Result<SourceHandle> {
        self.create_source(None)?.attach(handle)
    }

    /// Handle a connection accepted on the server socket
    ///
    /// Errors only concern this connection; the accept loop keeps running.
    pub fn on_readable(
        self: &Arc<Self>,
        stream: TcpStream,
        peer: SocketAddr,
        cancel: Option<&CancellationToken>,
    ) -> Result<()> {
        self.configure_stream(&stream);

        let client = self.hooks.create_client(self).ok_or_else(|| {
            tracing::error!(peer = %peer, "Failed to create client");
            Error::ClientCreation
        })?;

        let id = self.manage(Arc::clone(&client));

        let stream = PrefixedStream::new(stream);
        if let Err(e) = self.hooks.accept_client(self, &client, stream, peer, cancel) {
            tracing::error!(peer = %peer, error = %e, "Failed to accept client");
            self.unmanage(id);
            return Err(Error::Accept(e));
        }

        tracing::debug!(client = id, peer = %peer, "Client connected");
        self.client_connected.emit(&client);

        Ok(())
    }

    /// Adopt a connection accepted elsewhere
    ///
    /// `initial_buffer` holds bytes already read from `stream`; the client
    /// reads them first.
    pub fn transfer_connection(
        self: &Arc<Self>,
        stream: TcpStream,
        ip: &str,
        port: u16,
        initial_buffer: impl Into<Bytes>,
    ) -> Result<()> {
        self.configure_stream(&stream);

        let client = self.hooks.create_client(self).ok_or_else(|| {
            tracing::error!(ip = %ip, port = port, "Failed to create client");
            Error::ClientCreation
        })?;

        let id = self.manage(Arc::clone(&client));

        let stream = PrefixedStream::with_prefix(initial_buffer, stream);
        if let Err(e) = client.create_from_socket(stream, ip, port) {
            tracing::error!(ip = %ip, port = port, error = %e, "Failed to transfer connection");
            self.unmanage(id);
            return Err(Error::Accept(e));
        }

        tracing::debug!(client = id, ip = %ip, port = port, "Connection transferred");
        self.client_connected.emit(&client);

        Ok(())
    }

    fn configure_stream(&self, stream: &TcpStream) {
        if self.config.lock().tcp_nodelay {
            if let Err(e) = stream.set_nodelay(true) {
                tracing::debug!(error = %e, "Failed to set TCP_NODELAY");
            }
        }
    }

    /// Take ownership of `client` until it raises `closed`
    fn manage(self: &Arc<Self>, client: ClientRef) -> u64 {
        let id = self.registry.next_id();

        client.set_server(Some(Arc::clone(self)));

        let server = Arc::downgrade(self);
        let weak_client = Arc::downgrade(&client);
        let closed_handler: HandlerId = client.closed().connect(move |_| match server.upgrade() {
            Some(server) => server.unmanage(id),
            None => {
                if let Some(client) = weak_client.upgrade() {
                    client.set_server(None);
                }
            }
        });

        let count = self.registry.insert(id, client, closed_handler);
        tracing::debug!(client = id, clients = count, "Managing client");

        id
    }

    fn unmanage(&self, id: u64) {
        let Some(managed) = self.registry.remove(id) else {
            return;
        };

        managed.client.set_server(None);
        managed.client.closed().disconnect(managed.closed_handler);

        tracing::debug!(client = id, clients = self.registry.len(), "Client unmanaged");
    }

    /// Clients currently managed
    pub fn clients(&self) -> Vec<ClientRef> {
        self.registry.snapshot()
    }

    pub fn client_count(&self) -> usize {
        self.registry.len()
    }

    /// Raised after a client took over a connection
    ///
    /// The client may have closed and been unmanaged already.
    pub fn client_connected(&self) -> &Signal<ClientRef> {
        &self.client_connected
    }

    pub fn connect_client_connected<F>(&self, f: F) -> HandlerId
    where
        F: Fn(&ClientRef) + Send + Sync + 'static,
    {
        self.client_connected.connect(f)
    }
}

impl Drop for RtspServer {
    fn drop(&mut self) {
        tracing::debug!(addr = ?self.socket.get_mut().local_addr, "RTSP server dropped");
    }
}

impl std::fmt::Debug for RtspServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtspServer")
            .field("config", &*self.config.lock())
            .field("local_addr", &self.socket.lock().local_addr)
            .field("clients", &self.registry.len())
            .finish()
    }
}
