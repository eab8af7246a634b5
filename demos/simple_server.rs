//! Simple RTSP server example
//!
//! Run with: cargo run --example simple_server [ADDRESS] [SERVICE]
//!
//! Examples:
//!   cargo run --example simple_server                    # binds to 0.0.0.0:8554
//!   cargo run --example simple_server 127.0.0.1          # binds to 127.0.0.1:8554
//!   cargo run --example simple_server 127.0.0.1 rtsp     # binds to 127.0.0.1:554
//!
//! The toy client below understands just enough RTSP to show the server core
//! at work: it answers OPTIONS, DESCRIBE, SETUP, PLAY and TEARDOWN, looks up
//! factories through the media mapping and keeps medias in sessions. It does
//! not send any RTP.
//!
//! Try it with:
//!   ffprobe rtsp://localhost:8554/test
//!   printf 'OPTIONS * RTSP/1.0\r\nCSeq: 1\r\n\r\n' | nc localhost 8554

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

use rtsp_rs::media::{FactoryConfig, MediaFactory, MediaMapping};
use rtsp_rs::server::{RtspServer, ServerConfig, ServerHooks};
use rtsp_rs::session::SessionPool;
use rtsp_rs::{AuthRef, BoxError, Client, ClientRef, ClientStream, RtspUrl, Signal};

const LAUNCH: &str = "( videotestsrc is-live=true ! x264enc ! rtph264pay name=pay0 pt=96 \
                        audiotestsrc ! opusenc ! rtpopuspay name=pay1 pt=97 )";

#[derive(Default)]
struct ToyState {
    server: Mutex<Option<Arc<RtspServer>>>,
    pool: Mutex<Option<Arc<SessionPool>>>,
    mapping: Mutex<Option<Arc<MediaMapping>>>,
    closed: Signal<()>,
}

struct Request {
    method: String,
    uri: String,
    cseq: String,
    session: Option<String>,
}

struct Response {
    status: &'static str,
    headers: Vec<(String, String)>,
    body: String,
}

impl Response {
    fn new(status: &'static str) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    fn encode(&self, cseq: &str) -> String {
        let mut out = format!("RTSP/1.0 {}\r\nCSeq: {}\r\n", self.status, cseq);
        for (name, value) in &self.headers {
            out.push_str(&format!("{}: {}\r\n", name, value));
        }
        if !self.body.is_empty() {
            out.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        }
        out.push_str("\r\n");
        out.push_str(&self.body);
        out
    }
}

/// Minimal RTSP protocol engine
struct ToyClient {
    state: Arc<ToyState>,
}

impl ToyClient {
    fn serve(&self, stream: ClientStream, peer: String) {
        let state = Arc::clone(&self.state);

        tokio::spawn(async move {
            let mut sessions = Vec::new();
            let mut reader = BufReader::new(stream);

            loop {
                let request = match read_request(&mut reader).await {
                    Ok(Some(request)) => request,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::debug!(peer = %peer, error = %e, "Read failed");
                        break;
                    }
                };

                tracing::info!(peer = %peer, method = %request.method, uri = %request.uri, "Request");
                let response = handle_request(&state, &request, &mut sessions);

                let encoded = response.encode(&request.cseq);
                if let Err(e) = reader.get_mut().write_all(encoded.as_bytes()).await {
                    tracing::debug!(peer = %peer, error = %e, "Write failed");
                    break;
                }
            }

            let pool = state.pool.lock().clone();
            if let Some(pool) = pool {
                for id in sessions {
                    pool.remove(&id);
                }
            }

            tracing::info!(peer = %peer, "Client closed");
            state.closed.emit(&());
        });
    }
}

impl Client for ToyClient {
    fn set_server(&self, server: Option<Arc<RtspServer>>) {
        *self.state.server.lock() = server;
    }

    fn set_session_pool(&self, pool: Option<Arc<SessionPool>>) {
        *self.state.pool.lock() = pool;
    }

    fn set_media_mapping(&self, mapping: Option<Arc<MediaMapping>>) {
        *self.state.mapping.lock() = mapping;
    }

    fn set_auth(&self, _auth: Option<AuthRef>) {}

    fn accept(
        &self,
        stream: ClientStream,
        peer: SocketAddr,
        _cancel: Option<&CancellationToken>,
    ) -> Result<(), BoxError> {
        self.serve(stream, peer.to_string());
        Ok(())
    }

    fn create_from_socket(&self, stream: ClientStream, ip: &str, port: u16) -> Result<(), BoxError> {
        self.serve(stream, format!("{}:{}", ip, port));
        Ok(())
    }

    fn closed(&self) -> &Signal<()> {
        &self.state.closed
    }
}

async fn read_request(
    reader: &mut BufReader<ClientStream>,
) -> std::io::Result<Option<Request>> {
    let mut line = String::new();

    // Skip blank lines between requests
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        if !line.trim().is_empty() {
            break;
        }
    }

    let mut parts = line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let uri = parts.next().unwrap_or_default().to_string();

    let mut cseq = String::from("0");
    let mut session = None;

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        let header = line.trim();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            let value = value.trim();
            if name.eq_ignore_ascii_case("cseq") {
                cseq = value.to_string();
            } else if name.eq_ignore_ascii_case("session") {
                session = value.split(';').next().map(str::to_string);
            }
        }
    }

    Ok(Some(Request {
        method,
        uri,
        cseq,
        session,
    }))
}

fn handle_request(state: &ToyState, request: &Request, sessions: &mut Vec<String>) -> Response {
    if request.method == "OPTIONS" {
        return Response::new("200 OK").header("Public", "OPTIONS, DESCRIBE, SETUP, PLAY, TEARDOWN");
    }

    let Ok(url) = RtspUrl::parse(&request.uri) else {
        return Response::new("400 Bad Request");
    };

    let mapping = state.mapping.lock().clone();
    let pool = state.pool.lock().clone();
    let (Some(mapping), Some(pool)) = (mapping, pool) else {
        return Response::new("500 Internal Server Error");
    };

    match request.method.as_str() {
        "DESCRIBE" => {
            let Some(factory) = mapping.find_factory(&url) else {
                return Response::new("404 Not Found");
            };
            let media = match factory.construct(&url) {
                Ok(media) => media,
                Err(e) => {
                    tracing::error!(url = %url, error = %e, "Construct failed");
                    return Response::new("503 Service Unavailable");
                }
            };

            let mut sdp = String::from("v=0\r\no=- 0 0 IN IP4 0.0.0.0\r\ns=Session\r\nt=0 0\r\n");
            for stream in media.streams() {
                sdp.push_str(&format!(
                    "m=application 0 RTP/AVP 96\r\na=control:stream={}\r\n",
                    stream.index
                ));
            }
            media.release();

            let mut response = Response::new("200 OK")
                .header("Content-Type", "application/sdp")
                .header("Content-Base", url.canonical());
            response.body = sdp;
            response
        }
        "SETUP" => {
            let Some(factory) = mapping.find_factory(&url) else {
                return Response::new("404 Not Found");
            };

            let session = match request.session.as_deref().and_then(|id| pool.find(id)) {
                Some(session) => session,
                None => match pool.create() {
                    Ok(session) => {
                        sessions.push(session.id().to_string());
                        session
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "No session available");
                        return Response::new("503 Service Unavailable");
                    }
                },
            };

            if session.media(url.abspath()).is_none() {
                match factory.construct(&url) {
                    Ok(media) => session.manage_media(url.abspath(), media),
                    Err(e) => {
                        tracing::error!(url = %url, error = %e, "Construct failed");
                        return Response::new("503 Service Unavailable");
                    }
                }
            }

            Response::new("200 OK").header(
                "Session",
                format!("{};timeout={}", session.id(), session.timeout().as_secs()),
            )
        }
        "PLAY" => {
            let Some(session) = request.session.as_deref().and_then(|id| pool.find(id)) else {
                return Response::new("454 Session Not Found");
            };
            let Some(media) = session.media(url.abspath()) else {
                return Response::new("455 Method Not Valid In This State");
            };
            match media.prepare() {
                Ok(()) => Response::new("200 OK").header("Session", session.id()),
                Err(e) => {
                    tracing::error!(error = %e, "Prepare failed");
                    Response::new("500 Internal Server Error")
                }
            }
        }
        "TEARDOWN" => {
            let Some(id) = request.session.as_deref() else {
                return Response::new("454 Session Not Found");
            };
            pool.remove(id);
            sessions.retain(|s| s != id);
            Response::new("200 OK")
        }
        _ => Response::new("501 Not Implemented"),
    }
}

struct ToyHooks;

impl ServerHooks for ToyHooks {
    fn new_client(&self, _server: &Arc<RtspServer>) -> Option<ClientRef> {
        Some(Arc::new(ToyClient {
            state: Arc::new(ToyState::default()),
        }))
    }
}

fn print_usage() {
    eprintln!("Usage: simple_server [ADDRESS] [SERVICE]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  ADDRESS    Address to bind to (default: 0.0.0.0)");
    eprintln!("  SERVICE    Port or service name (default: 8554)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rtsp_rs=debug".parse()?)
                .add_directive("simple_server=debug".parse()?),
        )
        .init();

    let mut config = ServerConfig::default();
    if let Some(address) = args.get(1) {
        config = config.address(address.as_str());
    }
    if let Some(service) = args.get(2) {
        config = config.service(service.as_str());
    }

    let server = RtspServer::new(config, ToyHooks);

    let factory = MediaFactory::new(FactoryConfig::with_launch(LAUNCH).shared(true));
    factory.connect_media_constructed(|media| {
        tracing::info!(media = media.id(), streams = media.n_streams(), "Media constructed");
    });
    server.media_mapping().add_factory("/test", factory);

    server.connect_client_connected(|_| tracing::info!("Client connected"));

    let source = server.attach(&tokio::runtime::Handle::current())?;
    if let Some(port) = server.bound_port() {
        println!("Stream ready at rtsp://127.0.0.1:{}/test", port);
    }

    let pool = server.session_pool();
    let mut cleanup = tokio::time::interval(std::time::Duration::from_secs(5));

    loop {
        tokio::select! {
            _ = cleanup.tick() => {
                let removed = pool.cleanup();
                if removed > 0 {
                    tracing::info!(removed = removed, "Expired sessions removed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nShutting down...");
                break;
            }
        }
    }

    source.stop();
    source.join().await;

    Ok(())
}
