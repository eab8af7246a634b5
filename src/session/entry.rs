//! Session entry

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::media::Media;

/// Default session timeout
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(60);

/// Extra time given to a client after its timeout before the session expires
pub const EXPIRE_GRACE: Duration = Duration::from_secs(5);

struct SessionInner {
    timeout: Duration,
    last_access: Instant,
    expire_prevented: usize,
    medias: Vec<(String, Arc<Media>)>,
}

/// One RTSP session
pub struct Session {
    id: String,
    inner: Mutex<SessionInner>,
}

impl Session {
    pub(crate) fn new(id: String) -> Self {
        Self {
            id,
            inner: Mutex::new(SessionInner {
                timeout: DEFAULT_SESSION_TIMEOUT,
                last_access: Instant::now(),
                expire_prevented: 0,
                medias: Vec::new(),
            }),
        }
    }

    /// Session id as sent in the `Session` header
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn timeout(&self) -> Duration {
        self.inner.lock().timeout
    }

    pub fn set_timeout(&self, timeout: Duration) {
        self.inner.lock().timeout = timeout;
    }

    /// Mark the session as used now
    pub fn touch(&self) {
        self.inner.lock().last_access = Instant::now();
    }

    /// Keep the session alive until a matching [`allow_expire`](Self::allow_expire)
    pub fn prevent_expire(&self) {
        self.inner.lock().expire_prevented += 1;
    }

    pub fn allow_expire(&self) {
        let mut inner = self.inner.lock();
        inner.expire_prevented = inner.expire_prevented.saturating_sub(1);
    }

    /// Time left before the session expires, zero once it has
    pub fn next_timeout(&self, now: Instant) -> Duration {
        let inner = self.inner.lock();
        if inner.expire_prevented > 0 {
            return inner.timeout + EXPIRE_GRACE;
        }
        let deadline = inner.last_access + inner.timeout + EXPIRE_GRACE;
        deadline.saturating_duration_since(now)
    }

    /// Whether the session expired at `now`
    pub fn is_expired(&self, now: Instant) -> bool {
        let inner = self.inner.lock();
        inner.expire_prevented == 0 && now >= inner.last_access + inner.timeout + EXPIRE_GRACE
    }

    /// Take ownership of one user of `media`, set up for `path`
    pub fn manage_media(&self, path: impl Into<String>, media: Arc<Media>) {
        let path = path.into();
        tracing::debug!(session = %self.id, path = %path, media = media.id(), "Session manages media");
        self.inner.lock().medias.push((path, media));
    }

    /// Media set up for `path`
    pub fn media(&self, path: &str) -> Option<Arc<Media>> {
        self.inner
            .lock()
            .medias
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, media)| Arc::clone(media))
    }

    /// Give back the media set up for `path`. Returns whether the session
    /// still has medias.
    pub fn release_media(&self, path: &str) -> bool {
        let (released, remaining) = {
            let mut inner = self.inner.lock();
            let released = inner
                .medias
                .iter()
                .position(|(p, _)| p == path)
                .map(|pos| inner.medias.remove(pos));
            (released, !inner.medias.is_empty())
        };

        if let Some((_, media)) = released {
            media.release();
        }
        remaining
    }

    pub fn n_medias(&self) -> usize {
        self.inner.lock().medias.len()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let medias = std::mem::take(&mut self.inner.get_mut().medias);
        for (_, media) in medias {
            media.release();
        }
        tracing::debug!(session = %self.id, "Session dropped");
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("timeout", &inner.timeout)
            .field("medias", &inner.medias.len())
            .finish()
    }
}
