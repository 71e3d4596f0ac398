//! Durable storage for the session document.
//!
//! The whole store is a single JSON object mapping user keys to cipher
//! tokens. It is read once at startup and rewritten in full on every
//! mutation, which is fine for a few hundred users and not meant for more.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// Serialized form of the store: user key -> cipher token.
pub type SessionDocument = BTreeMap<String, String>;

/// Where the session document lives between process runs.
pub trait SessionBackend: Send + Sync {
    /// Load the full document. A backend with nothing stored yet returns an empty map.
    fn load(&self) -> Result<SessionDocument>;

    /// Replace the full document.
    fn save(&self, document: &SessionDocument) -> Result<()>;
}

/// JSON file on local disk.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "sessions.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SessionBackend for JsonFileBackend {
    fn load(&self) -> Result<SessionDocument> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No session file yet, starting empty");
                return Ok(SessionDocument::new());
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read session file {}", self.path.display())
                })
            }
        };

        if contents.trim().is_empty() {
            return Ok(SessionDocument::new());
        }

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse session file {}", self.path.display()))
    }

    fn save(&self, document: &SessionDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create session directory {}", parent.display())
                })?;
            }
        }

        let json = serde_json::to_string_pretty(document)?;

        // Write aside and rename so a crash never leaves a half-written document.
        let tmp = self.temp_path();
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
        }

        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

/// In-process backend for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    document: Mutex<SessionDocument>,
    fail_writes: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing document, as if reloaded after a restart.
    pub fn with_document(document: SessionDocument) -> Self {
        Self {
            document: Mutex::new(document),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make every subsequent `save` fail until switched back.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Copy of what is currently "on disk".
    pub fn snapshot(&self) -> SessionDocument {
        self.document.lock().clone()
    }
}

impl SessionBackend for MemoryBackend {
    fn load(&self) -> Result<SessionDocument> {
        Ok(self.document.lock().clone())
    }

    fn save(&self, document: &SessionDocument) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("simulated storage failure");
        }
        *self.document.lock() = document.clone();
        Ok(())
    }
}

impl<B: SessionBackend + ?Sized> SessionBackend for std::sync::Arc<B> {
    fn load(&self) -> Result<SessionDocument> {
        (**self).load()
    }

    fn save(&self, document: &SessionDocument) -> Result<()> {
        (**self).save(document)
    }
}
