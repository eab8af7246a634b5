//! Server configuration

use std::sync::Arc;

use crate::auth::AuthRef;
use crate::media::MediaMapping;
use crate::session::SessionPool;

/// Default bind address
pub const DEFAULT_ADDRESS: &str = "0.0.0.0";

/// Default service, a numeric port or a service name
pub const DEFAULT_SERVICE: &str = "8554";

/// Default listen backlog
pub const DEFAULT_BACKLOG: i32 = 5;

/// Server configuration options
#[derive(Clone)]
pub struct ServerConfig {
    /// Address (IP literal or host name) to bind to
    pub address: String,

    /// Port number or named service to listen on (`"0"` picks a free port)
    pub service: String,

    /// Listen backlog
    pub backlog: i32,

    /// Enable TCP_NODELAY on accepted connections
    pub tcp_nodelay: bool,

    /// Session pool handed to every client
    pub session_pool: Arc<SessionPool>,

    /// Media mapping handed to every client
    pub media_mapping: Arc<MediaMapping>,

    /// Authentication handed to every client
    pub auth: Option<AuthRef>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            service: DEFAULT_SERVICE.to_string(),
            backlog: DEFAULT_BACKLOG,
            tcp_nodelay: true,
            session_pool: Arc::new(SessionPool::new()),
            media_mapping: Arc::new(MediaMapping::new()),
            auth: None,
        }
    }
}

impl ServerConfig {
    /// Create a config listening on `address` and `service`
    pub fn with_addr(address: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            service: service.into(),
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Set the service
    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    /// Set the listen backlog
    pub fn backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    /// Enable or disable TCP_NODELAY
    pub fn tcp_nodelay(mut self, nodelay: bool) -> Self {
        self.tcp_nodelay = nodelay;
        self
    }

    /// Use `pool` for sessions
    pub fn session_pool(mut self, pool: Arc<SessionPool>) -> Self {
        self.session_pool = pool;
        self
    }

    /// Use `mapping` to find factories
    pub fn media_mapping(mut self, mapping: Arc<MediaMapping>) -> Self {
        self.media_mapping = mapping;
        self
    }

    /// Set the authentication
    pub fn auth(mut self, auth: AuthRef) -> Self {
        self.auth = Some(auth);
        self
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("address", &self.address)
            .field("service", &self.service)
            .field("backlog", &self.backlog)
            .field("tcp_nodelay", &self.tcp_nodelay)
            .field("auth", &self.auth.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.address, "0.0.0.0");
        assert_eq!(config.service, "8554");
        assert_eq!(config.backlog, 5);
        assert!(config.tcp_nodelay);
        assert!(config.auth.is_none());
        assert!(config.media_mapping.is_empty());
        assert!(config.session_pool.is_empty());
    }

    #[test]
    fn test_with_addr() {
        let config = ServerConfig::with_addr("127.0.0.1", "0");

        assert_eq!(config.address, "127.0.0.1");
        assert_eq!(config.service, "0");
        assert_eq!(config.backlog, DEFAULT_BACKLOG);
    }

    #[test]
    fn test_builder_backlog() {
        let config = ServerConfig::default().backlog(128);

        assert_eq!(config.backlog, 128);
    }

    #[test]
    fn test_builder_shares_mapping() {
        let mapping = Arc::new(MediaMapping::new());
        let config = ServerConfig::default().media_mapping(Arc::clone(&mapping));

        assert!(Arc::ptr_eq(&config.media_mapping, &mapping));
    }
}
