//! Listening socket setup
//!
//! Resolves an address/service pair into candidate socket addresses and binds
//! the first one that works. Resolution and binding are blocking calls.

use std::io;
use std::net::{SocketAddr, TcpListener as StdTcpListener, ToSocketAddrs};

use socket2::{Domain, Protocol, Socket, Type};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// System services database
const SERVICES_PATH: &str = "/etc/services";

/// Fallback for systems without a services database
const WELL_KNOWN_SERVICES: &[(&str, u16)] = &[
    ("http", 80),
    ("https", 443),
    ("rtsps", 322),
    ("rtsp", 554),
    ("rtsp-alt", 8554),
    ("http-alt", 8080),
];

/// Resolve a numeric port or a named TCP service
pub fn resolve_service(service: &str) -> Option<u16> {
    if let Ok(port) = service.parse::<u16>() {
        return Some(port);
    }

    std::fs::read_to_string(SERVICES_PATH)
        .ok()
        .and_then(|db| lookup_service(&db, service))
        .or_else(|| {
            WELL_KNOWN_SERVICES
                .iter()
                .find(|(name, _)| *name == service)
                .map(|(_, port)| *port)
        })
}

/// Find the TCP port of `name` in a services(5) style database
fn lookup_service(db: &str, name: &str) -> Option<u16> {
    for line in db.lines() {
        let line = line.split('#').next().unwrap_or_default();
        let mut fields = line.split_whitespace();

        let (Some(service), Some(port_proto)) = (fields.next(), fields.next()) else {
            continue;
        };
        let Some((port, proto)) = port_proto.split_once('/') else {
            continue;
        };
        if proto != "tcp" {
            continue;
        }

        if service == name || fields.any(|alias| alias == name) {
            if let Ok(port) = port.parse() {
                return Some(port);
            }
        }
    }

    None
}

/// Resolve `address` and `service` into bind candidates, in resolver order
pub fn resolve(address: &str, service: &str) -> Result<Vec<SocketAddr>> {
    let resolution_error = |source: io::Error| Error::SocketResolution {
        address: address.to_string(),
        service: service.to_string(),
        source,
    };

    let port = resolve_service(service).ok_or_else(|| {
        resolution_error(io::Error::new(
            io::ErrorKind::NotFound,
            format!("unknown service '{}'", service),
        ))
    })?;

    let candidates: Vec<SocketAddr> = (address, port)
        .to_socket_addrs()
        .map_err(resolution_error)?
        .collect();

    if candidates.is_empty() {
        return Err(resolution_error(io::Error::new(
            io::ErrorKind::NotFound,
            "no addresses found",
        )));
    }

    Ok(candidates)
}

/// Bind and listen on the first candidate for `address` and `service`
///
/// The returned listener is non-blocking, with keepalive enabled.
pub fn bind_listener(
    address: &str,
    service: &str,
    backlog: i32,
    cancel: Option<&CancellationToken>,
) -> Result<StdTcpListener> {
    let candidates = resolve(address, service)?;

    bind_candidates(&candidates, backlog, cancel).map_err(|e| {
        tracing::error!(address = %address, service = %service, error = %e, "Failed to bind");
        e
    })
}

/// Bind and listen on the first of `candidates` that accepts a bind
///
/// Only the first socket creation error and the first bind error are kept.
/// A bind error wins over a creation error.
pub fn bind_candidates(
    candidates: &[SocketAddr],
    backlog: i32,
    cancel: Option<&CancellationToken>,
) -> Result<StdTcpListener> {
    let mut create_error: Option<io::Error> = None;
    let mut bind_error: Option<io::Error> = None;
    let mut bound = None;

    for &addr in candidates {
        if cancel.is_some_and(|c| c.is_cancelled()) {
            return Err(Error::Cancelled);
        }

        let socket = match Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP)) {
            Ok(socket) => socket,
            Err(e) => {
                tracing::debug!(addr = %addr, error = %e, "Failed to create socket");
                create_error.get_or_insert(e);
                continue;
            }
        };

        #[cfg(not(windows))]
        {
            if let Err(e) = socket.set_reuse_address(true) {
                tracing::debug!(addr = %addr, error = %e, "Failed to enable address reuse");
            }
        }

        match socket.bind(&addr.into()) {
            Ok(()) => {
                bound = Some((socket, addr));
                break;
            }
            Err(e) => {
                tracing::debug!(addr = %addr, error = %e, "Failed to bind socket");
                bind_error.get_or_insert(e);
            }
        }
    }

    let (socket, addr) = match (bound, bind_error, create_error) {
        (Some(bound), _, _) => bound,
        (None, Some(e), _) => return Err(Error::Bind(e)),
        (None, None, Some(e)) => return Err(Error::SocketCreate(e)),
        (None, None, None) => {
            return Err(Error::SocketCreate(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                "no usable address",
            )))
        }
    };

    socket.set_keepalive(true).map_err(Error::Listen)?;
    socket.set_nonblocking(true).map_err(Error::Listen)?;
    socket.listen(backlog).map_err(|e| {
        tracing::error!(addr = %addr, error = %e, "Failed to listen");
        Error::Listen(e)
    })?;

    let listener: StdTcpListener = socket.into();
    tracing::info!(addr = %listener.local_addr().unwrap_or(addr), "RTSP server socket bound");

    Ok(listener)
}
