//! Session pool

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use rand::distributions::Alphanumeric;
use rand::Rng;

use super::entry::Session;
use super::SessionError;

/// Length of generated session ids
pub const SESSION_ID_LEN: usize = 16;

/// Pool of active sessions
#[derive(Default)]
pub struct SessionPool {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
    /// Maximum number of sessions, 0 for unlimited
    max_sessions: AtomicUsize,
}

impl SessionPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_sessions(max_sessions: usize) -> Self {
        let pool = Self::new();
        pool.set_max_sessions(max_sessions);
        pool
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions.load(Ordering::Relaxed)
    }

    pub fn set_max_sessions(&self, max_sessions: usize) {
        self.max_sessions.store(max_sessions, Ordering::Relaxed);
    }

    /// Create a session with a fresh random id
    pub fn create(&self) -> Result<Arc<Session>, SessionError> {
        let mut sessions = self.sessions.lock();

        let max = self.max_sessions();
        if max > 0 && sessions.len() >= max {
            tracing::warn!(max_sessions = max, "Session pool full");
            return Err(SessionError::PoolFull(max));
        }

        let id = loop {
            let id = generate_id();
            if !sessions.contains_key(&id) {
                break id;
            }
        };

        let session = Arc::new(Session::new(id.clone()));
        sessions.insert(id, Arc::clone(&session));

        tracing::debug!(session = %session.id(), sessions = sessions.len(), "Session created");
        Ok(session)
    }

    /// Find a session and mark it as used
    pub fn find(&self, id: &str) -> Option<Arc<Session>> {
        let session = self.sessions.lock().get(id).cloned()?;
        session.touch();
        Some(session)
    }

    /// Remove a session from the pool
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.lock().remove(id);
        match removed {
            Some(_) => {
                tracing::debug!(session = %id, "Session removed");
                true
            }
            None => false,
        }
    }

    /// Remove every expired session, returning how many were removed
    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Instant::now())
    }

    fn cleanup_at(&self, now: Instant) -> usize {
        let expired: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.lock();
            let ids: Vec<String> = sessions
                .iter()
                .filter(|(_, session)| session.is_expired(now))
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        // Sessions release their medias on drop, outside the pool lock
        let count = expired.len();
        if count > 0 {
            tracing::debug!(count = count, "Expired sessions removed");
        }
        count
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

impl std::fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPool")
            .field("sessions", &self.len())
            .field("max_sessions", &self.max_sessions())
            .finish()
    }
}

fn generate_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_ID_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_create_and_find() {
        let pool = SessionPool::new();
        let session = pool.create().unwrap();

        assert_eq!(session.id().len(), SESSION_ID_LEN);
        assert!(session.id().chars().all(|c| c.is_ascii_alphanumeric()));

        let found = pool.find(session.id()).unwrap();
        assert!(Arc::ptr_eq(&found, &session));
        assert!(pool.find("missing").is_none());
    }

    #[test]
    fn test_max_sessions() {
        let pool = SessionPool::with_max_sessions(2);
        let first = pool.create().unwrap();
        pool.create().unwrap();

        assert_eq!(pool.create().unwrap_err(), SessionError::PoolFull(2));

        assert!(pool.remove(first.id()));
        assert!(pool.create().is_ok());
    }

    #[test]
    fn test_cleanup_expired() {
        let pool = SessionPool::new();
        let short = pool.create().unwrap();
        short.set_timeout(Duration::from_secs(1));
        let kept = pool.create().unwrap();
        kept.prevent_expire();

        let later = Instant::now() + Duration::from_secs(120);
        assert_eq!(pool.cleanup_at(later), 1);
        assert_eq!(pool.len(), 1);
        assert!(pool.find(kept.id()).is_some());
        assert!(pool.find(short.id()).is_none());
    }

    #[test]
    fn test_cleanup_keeps_fresh_sessions() {
        let pool = SessionPool::new();
        pool.create().unwrap();

        assert_eq!(pool.cleanup(), 0);
        assert_eq!(pool.len(), 1);
    }
}
