//! RTSP server core
//!
//! Connection acceptance and shared media construction for an RTSP server.
//! The crate does not parse RTSP itself: accepted connections are handed to a
//! [`Client`](client::Client) implementation supplied by the application.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use rtsp_rs::client::ClientRef;
//! use rtsp_rs::media::{FactoryConfig, MediaFactory};
//! use rtsp_rs::server::{RtspServer, ServerConfig, ServerHooks};
//!
//! struct Hooks;
//!
//! impl ServerHooks for Hooks {
//!     fn new_client(&self, _server: &Arc<RtspServer>) -> Option<ClientRef> {
//!         None // plug in a protocol engine here
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> rtsp_rs::Result<()> {
//!     let server = RtspServer::new(ServerConfig::default(), Hooks);
//!
//!     let factory = MediaFactory::new(
//!         FactoryConfig::with_launch("( videotestsrc ! x264enc ! rtph264pay name=pay0 pt=96 )")
//!             .shared(true),
//!     );
//!     server.media_mapping().add_factory("/test", factory);
//!
//!     let source = server.attach(&tokio::runtime::Handle::current())?;
//!     tokio::signal::ctrl_c().await?;
//!     source.stop();
//!     source.join().await;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod error;
pub mod media;
pub mod server;
pub mod session;
pub mod signal;
pub mod url;

pub use auth::{Auth, AuthRef};
pub use client::{Client, ClientRef, ClientStream, PrefixedStream};
pub use error::{BoxError, Error, Result};
pub use media::{FactoryConfig, FactoryHooks, Media, MediaFactory, MediaMapping};
pub use server::{RtspServer, ServerConfig, ServerHooks};
pub use session::{Session, SessionPool};
pub use signal::{HandlerId, Signal};
pub use crate::url::RtspUrl;
