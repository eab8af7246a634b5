//! RTSP server
//!
//! Socket setup, the accept loop and client management.

pub mod config;
pub mod listener;
mod registry;
pub mod socket;
pub mod source;

pub use config::ServerConfig;
pub use listener::{default_accept_client, default_create_client, RtspServer, ServerHooks};
pub use socket::{bind_candidates, bind_listener, resolve, resolve_service};
pub use source::{ListenSource, SourceHandle};
