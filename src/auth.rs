//! Authentication capability
//!
//! The core never evaluates authentication policy. It only carries an
//! [`Auth`] implementation from the server to every client it creates, and
//! from a media factory to every media it builds.

use std::fmt;
use std::sync::Arc;

/// Authentication policy supplied by the hosting application
pub trait Auth: Send + Sync + fmt::Debug {
    /// Check the value of a request's `Authorization` header
    fn check(&self, authorization: Option<&str>) -> bool;

    /// Realm announced in `WWW-Authenticate` challenges
    fn realm(&self) -> &str {
        "RTSP server"
    }
}

/// Shared handle to an [`Auth`] implementation
pub type AuthRef = Arc<dyn Auth>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{FactoryConfig, MediaFactory};
    use crate::url::RtspUrl;

    #[derive(Debug)]
    struct Token(&'static str);

    impl Auth for Token {
        fn check(&self, authorization: Option<&str>) -> bool {
            authorization == Some(self.0)
        }
    }

    #[test]
    fn test_factory_passes_auth_to_media() {
        let factory = MediaFactory::new(FactoryConfig::with_launch("src ! rtpL16pay name=pay0"));
        let auth: AuthRef = Arc::new(Token("Basic abc"));
        factory.set_auth(Some(Arc::clone(&auth)));

        let url = RtspUrl::parse("rtsp://localhost/test").unwrap();
        let media = factory.construct(&url).unwrap();
        let media_auth = media.auth().unwrap();

        assert!(media_auth.check(Some("Basic abc")));
        assert!(!media_auth.check(None));
        assert_eq!(media_auth.realm(), "RTSP server");
    }
}
