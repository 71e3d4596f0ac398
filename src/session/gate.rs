//! Read path for protected actions.

use std::sync::Arc;

use super::store::{SessionError, SessionStore};
use super::{Credentials, UserKey};

/// Why a protected action may not run.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// No live session. Callers should prompt the user to log in.
    #[error("not authenticated")]
    NotAuthenticated,
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Thin guard in front of [`SessionStore`] for protected actions.
#[derive(Debug, Clone)]
pub struct SessionGate {
    store: Arc<SessionStore>,
}

impl SessionGate {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }

    /// Credentials for `key`, or [`GateError::NotAuthenticated`].
    pub fn require_session(&self, key: &UserKey) -> Result<Credentials, GateError> {
        self.store.get(key)?.ok_or(GateError::NotAuthenticated)
    }

    /// Seconds left on the session for `key`; 0 when there is none.
    pub fn remaining_secs(&self, key: &UserKey) -> Result<u64, SessionError> {
        self.store.remaining_secs(key)
    }
}
