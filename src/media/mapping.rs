//! Path to factory mapping
//!
//! Clients resolve the factory for a request through the media mapping. Paths
//! are matched exactly against the absolute path of the request URL.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::url::RtspUrl;

use super::factory::MediaFactory;

/// Table of mount paths
#[derive(Default)]
pub struct MediaMapping {
    factories: RwLock<HashMap<String, Arc<MediaFactory>>>,
}

impl MediaMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount `factory` at `path`, replacing any factory already there
    pub fn add_factory(&self, path: impl Into<String>, factory: Arc<MediaFactory>) {
        let path = path.into();
        tracing::debug!(path = %path, "Factory mounted");
        self.factories.write().insert(path, factory);
    }

    /// Unmount the factory at `path`
    pub fn remove_factory(&self, path: &str) -> Option<Arc<MediaFactory>> {
        let removed = self.factories.write().remove(path);
        if removed.is_some() {
            tracing::debug!(path = %path, "Factory unmounted");
        }
        removed
    }

    /// Factory mounted at the absolute path of `url`
    pub fn find_factory(&self, url: &RtspUrl) -> Option<Arc<MediaFactory>> {
        let factories = self.factories.read();
        let found = factories.get(url.abspath()).cloned();
        if found.is_none() {
            tracing::debug!(path = %url.abspath(), "No factory for path");
        }
        found
    }

    pub fn len(&self) -> usize {
        self.factories.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.read().is_empty()
    }
}

impl std::fmt::Debug for MediaMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let factories = self.factories.read();
        f.debug_struct("MediaMapping")
            .field("paths", &factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
