//! Credential sessions: who is logged in, with what, and for how long.
//!
//! - [`store`]: encrypted write-through store with lazy expiry
//! - [`gate`]: guard used by protected actions
//! - [`backend`]: durable document storage (JSON file or in-memory)
//! - [`clock`]: injectable time source

pub mod backend;
pub mod clock;
pub mod gate;
pub mod store;

use std::fmt;

pub use backend::{JsonFileBackend, MemoryBackend, SessionBackend, SessionDocument};
pub use clock::{Clock, ManualClock, SystemClock};
pub use gate::{GateError, SessionGate};
pub use store::{SessionError, SessionStore, DEFAULT_SESSION_TIMEOUT_SECS};

/// Canonical identity of the chat user a session belongs to.
///
/// Platform ids arrive as numbers or strings; both collapse to one trimmed
/// string form so `42`, `"42"` and `" 42 "` address the same session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserKey(String);

impl UserKey {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserKey {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for UserKey {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<i64> for UserKey {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<u64> for UserKey {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// Decrypted portal credentials handed to protected actions.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub identifier: String,
    pub secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_key_forms_agree() {
        assert_eq!(UserKey::from(42i64), UserKey::from("42"));
        assert_eq!(UserKey::from(42u64), UserKey::new(" 42\n"));
        assert_eq!(UserKey::from(-7i64).as_str(), "-7");
    }

    #[test]
    fn credentials_debug_hides_secret() {
        let creds = Credentials {
            identifier: "21A81R0001".into(),
            secret: "topsecret".into(),
        };
        let shown = format!("{creds:?}");
        assert!(!shown.contains("topsecret"));
    }
}
