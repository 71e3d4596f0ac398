//! Encrypted, time-bounded credential session store.
//!
//! One sealed [`CredentialRecord`] per [`UserKey`], mirrored write-through
//! to a [`SessionBackend`]. Expiry is lazy: there is no background sweeper,
//! an entry past its timeout is evicted the first time anything looks at it.
//!
//! Locking: all mutations (including evictions) hold the entry lock across
//! the durable rewrite. Sealing and opening tokens happen outside the lock.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use super::backend::{SessionBackend, SessionDocument};
use super::clock::{Clock, SystemClock};
use super::{Credentials, UserKey};
use crate::security::{Cipher, CipherError, CredentialRecord};

/// Default session lifetime: 24 hours.
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 24 * 3600;

/// Store failures that callers must handle.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The durable write failed; the in-memory store was rolled back.
    #[error("session storage write failed: {0:#}")]
    Storage(anyhow::Error),
    #[error(transparent)]
    Encrypt(#[from] CipherError),
}

/// Result of reading one entry.
enum Lookup {
    Absent,
    Live {
        record: CredentialRecord,
        remaining_ms: u64,
    },
}

/// Keyed store of encrypted sessions.
pub struct SessionStore {
    cipher: Cipher,
    backend: Box<dyn SessionBackend>,
    clock: Arc<dyn Clock>,
    timeout_ms: u64,
    entries: Mutex<HashMap<UserKey, String>>,
}

impl SessionStore {
    /// Open a store backed by `backend`, loading whatever it already holds.
    pub fn open(
        cipher: Cipher,
        backend: impl SessionBackend + 'static,
        timeout_secs: u64,
    ) -> anyhow::Result<Self> {
        Self::with_clock(cipher, backend, timeout_secs, Arc::new(SystemClock))
    }

    /// Same as [`SessionStore::open`] with an explicit time source.
    pub fn with_clock(
        cipher: Cipher,
        backend: impl SessionBackend + 'static,
        timeout_secs: u64,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let document = backend.load()?;
        let mut entries: HashMap<UserKey, String> = HashMap::with_capacity(document.len());
        for (raw, token) in document {
            let key = UserKey::new(&raw);
            if entries.insert(key.clone(), token).is_some() {
                tracing::warn!(
                    user_key = %key,
                    "Duplicate session keys collapse after trimming; keeping the last one"
                );
            }
        }

        tracing::info!(sessions = entries.len(), timeout_secs, "Session store loaded");

        Ok(Self {
            cipher,
            backend: Box::new(backend),
            clock,
            timeout_ms: timeout_secs.saturating_mul(1000),
            entries: Mutex::new(entries),
        })
    }

    /// Session lifetime in seconds.
    pub fn timeout_secs(&self) -> u64 {
        self.timeout_ms / 1000
    }

    /// Store credentials for `key`, replacing any existing session.
    pub fn put(&self, key: &UserKey, identifier: &str, secret: &str) -> Result<(), SessionError> {
        let record = CredentialRecord {
            identifier: identifier.to_string(),
            secret: secret.to_string(),
            issued_at_ms: self.clock.now_ms(),
        };
        let token = self.cipher.encrypt(&record)?;
        drop(record);

        let mut entries = self.entries.lock();
        let previous = entries.insert(key.clone(), token);
        if let Err(err) = self.persist(&entries) {
            match previous {
                Some(prev) => entries.insert(key.clone(), prev),
                None => entries.remove(key),
            };
            tracing::error!(user_key = %key, "Failed to persist session, rolled back: {err:#}");
            return Err(SessionError::Storage(err));
        }

        tracing::info!(user_key = %key, "Session stored");
        Ok(())
    }

    /// Fetch live credentials for `key`. Expired or undecodable entries are
    /// evicted and reported as absent.
    pub fn get(&self, key: &UserKey) -> Result<Option<Credentials>, SessionError> {
        Ok(match self.lookup(key)? {
            Lookup::Absent => None,
            Lookup::Live { record, .. } => Some(Credentials {
                identifier: record.identifier,
                secret: record.secret,
            }),
        })
    }

    /// Whether `key` has a live session. Evicts like [`SessionStore::get`].
    pub fn has(&self, key: &UserKey) -> Result<bool, SessionError> {
        Ok(self.get(key)?.is_some())
    }

    /// Remove the session for `key`. Returns whether one existed.
    pub fn delete(&self, key: &UserKey) -> Result<bool, SessionError> {
        let mut entries = self.entries.lock();
        let Some(removed) = entries.remove(key) else {
            return Ok(false);
        };

        if let Err(err) = self.persist(&entries) {
            entries.insert(key.clone(), removed);
            tracing::error!(user_key = %key, "Failed to persist session removal: {err:#}");
            return Err(SessionError::Storage(err));
        }

        tracing::info!(user_key = %key, "Session deleted");
        Ok(true)
    }

    /// Whole seconds left on the session for `key`; 0 when there is none.
    pub fn remaining_secs(&self, key: &UserKey) -> Result<u64, SessionError> {
        Ok(match self.lookup(key)? {
            Lookup::Absent => 0,
            Lookup::Live { remaining_ms, .. } => remaining_ms / 1000,
        })
    }

    /// Evict every expired or undecodable entry in one pass.
    /// Returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize, SessionError> {
        let snapshot: Vec<(UserKey, String)> = self
            .entries
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let now = self.clock.now_ms();
        let stale: Vec<(UserKey, String)> = snapshot
            .into_iter()
            .filter(|(_, token)| match self.cipher.decrypt(token) {
                Ok(record) => now.saturating_sub(record.issued_at_ms) >= self.timeout_ms,
                Err(_) => true,
            })
            .collect();

        if stale.is_empty() {
            return Ok(0);
        }

        let mut entries = self.entries.lock();
        let mut removed = Vec::new();
        for (key, token) in stale {
            if entries.get(&key) == Some(&token) {
                entries.remove(&key);
                removed.push((key, token));
            }
        }

        if removed.is_empty() {
            return Ok(0);
        }

        if let Err(err) = self.persist(&entries) {
            for (key, token) in removed {
                entries.insert(key, token);
            }
            tracing::error!("Failed to persist session purge: {err:#}");
            return Err(SessionError::Storage(err));
        }

        tracing::info!(purged = removed.len(), "Expired sessions purged");
        Ok(removed.len())
    }

    /// Keys with a stored entry, live or not, sorted.
    pub fn keys(&self) -> Vec<UserKey> {
        let mut keys: Vec<UserKey> = self.entries.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of stored entries, including ones not yet lazily evicted.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn lookup(&self, key: &UserKey) -> Result<Lookup, SessionError> {
        let Some(token) = self.entries.lock().get(key).cloned() else {
            return Ok(Lookup::Absent);
        };

        let record = match self.cipher.decrypt(&token) {
            Ok(record) => record,
            Err(failure) => {
                tracing::warn!(user_key = %key, %failure, "Undecodable session entry, evicting");
                self.evict(key, &token)?;
                return Ok(Lookup::Absent);
            }
        };

        let elapsed = self.clock.now_ms().saturating_sub(record.issued_at_ms);
        if elapsed >= self.timeout_ms {
            tracing::debug!(user_key = %key, "Session expired, evicting");
            self.evict(key, &token)?;
            return Ok(Lookup::Absent);
        }

        Ok(Lookup::Live {
            record,
            remaining_ms: self.timeout_ms - elapsed,
        })
    }

    /// Remove `key` only if it still holds `token`. A concurrent `put`
    /// that replaced the entry wins over a stale eviction.
    fn evict(&self, key: &UserKey, token: &str) -> Result<bool, SessionError> {
        let mut entries = self.entries.lock();
        if entries.get(key).map(String::as_str) != Some(token) {
            return Ok(false);
        }
        let Some(removed) = entries.remove(key) else {
            return Ok(false);
        };

        if let Err(err) = self.persist(&entries) {
            entries.insert(key.clone(), removed);
            tracing::error!(user_key = %key, "Failed to persist session eviction: {err:#}");
            return Err(SessionError::Storage(err));
        }
        Ok(true)
    }

    fn persist(&self, entries: &HashMap<UserKey, String>) -> anyhow::Result<()> {
        let document: SessionDocument = entries
            .iter()
            .map(|(key, token)| (key.as_str().to_string(), token.clone()))
            .collect();
        self.backend.save(&document)
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.len())
            .field("timeout_ms", &self.timeout_ms)
            .finish_non_exhaustive()
    }
}
