//! RTSP sessions
//!
//! A session groups the medias a client set up under one session id. The
//! [`SessionPool`] hands out ids, looks sessions up and reaps the ones whose
//! timeout expired.

pub mod entry;
pub mod pool;

use thiserror::Error;

pub use entry::{Session, DEFAULT_SESSION_TIMEOUT, EXPIRE_GRACE};
pub use pool::{SessionPool, SESSION_ID_LEN};

/// Session pool errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The pool reached its maximum number of sessions
    #[error("session pool is full ({0} sessions)")]
    PoolFull(usize),
}
