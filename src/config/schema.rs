use anyhow::{bail, Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::login::LoginPolicy;
use crate::security::Cipher;
use crate::session::DEFAULT_SESSION_TIMEOUT_SECS;

/// Environment variable carrying the base64 session key.
pub const ENV_KEY: &str = "ATTENDANCE_BOT_KEY";
/// Environment variable overriding the session file location.
pub const ENV_STORE: &str = "ATTENDANCE_BOT_STORE";
/// Environment variable overriding the session lifetime in seconds.
pub const ENV_SESSION_TIMEOUT: &str = "ATTENDANCE_BOT_SESSION_TIMEOUT";

/// Directory under the home directory holding config and state.
const APP_DIR: &str = ".attendance-bot";

/// Top-level bot configuration (`config.toml`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where this config was loaded from. Not serialized.
    #[serde(skip)]
    pub config_path: PathBuf,
    /// Session document path; `~` is expanded.
    pub store_path: String,
    /// Base64-encoded 32-byte AES-256 key.
    pub encryption_key: Option<String>,
    /// Alternative to `encryption_key`: file holding the raw 32 key bytes.
    pub key_file: Option<String>,
    /// Session lifetime in seconds.
    pub session_timeout_secs: u64,
    /// Minimum roll number length accepted by the login conversation.
    pub min_identifier_len: usize,
    /// Minimum password length accepted by the login conversation.
    pub min_secret_len: usize,
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_level: String,
    pub portal: PortalConfig,
    pub console: ConsoleConfig,
}

/// Settings for the offline portal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Artificial delay added to every portal call, in milliseconds.
    pub latency_ms: u64,
}

/// Settings for the console channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Sender id used for lines without a `user:` prefix.
    pub default_user: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            default_user: "console".into(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: PathBuf::new(),
            store_path: format!("~/{APP_DIR}/credentials_store.json"),
            encryption_key: None,
            key_file: None,
            session_timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS,
            min_identifier_len: 8,
            min_secret_len: 4,
            log_level: "attendance_bot=info".into(),
            portal: PortalConfig::default(),
            console: ConsoleConfig::default(),
        }
    }
}

impl Config {
    /// Default config location: `~/.attendance-bot/config.toml`.
    pub fn default_path() -> Result<PathBuf> {
        let home = UserDirs::new()
            .map(|u| u.home_dir().to_path_buf())
            .context("Could not find home directory")?;
        Ok(home.join(APP_DIR).join("config.toml"))
    }

    /// Load config from `path` (or the default location), then apply
    /// environment overrides. A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };

        let mut config = if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config {}", config_path.display()))?;
            toml::from_str::<Config>(&contents)
                .with_context(|| format!("Failed to parse config {}", config_path.display()))?
        } else {
            Config::default()
        };
        config.config_path = config_path;

        config.apply_env_overrides_from(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup function.
    pub fn apply_env_overrides_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<()> {
        if let Some(key) = lookup(ENV_KEY).filter(|v| !v.trim().is_empty()) {
            self.encryption_key = Some(key);
        }
        if let Some(store) = lookup(ENV_STORE).filter(|v| !v.trim().is_empty()) {
            self.store_path = store;
        }
        if let Some(timeout) = lookup(ENV_SESSION_TIMEOUT) {
            self.session_timeout_secs = timeout
                .trim()
                .parse()
                .with_context(|| format!("{ENV_SESSION_TIMEOUT} must be a whole number of seconds"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.session_timeout_secs == 0 {
            bail!("session_timeout_secs must be greater than zero");
        }
        if self.min_identifier_len == 0 {
            bail!("min_identifier_len must be at least 1");
        }
        if self.store_path.trim().is_empty() {
            bail!("store_path cannot be empty");
        }
        Ok(())
    }

    /// Session document path with `~` expanded.
    pub fn resolved_store_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.store_path).into_owned())
    }

    /// Build the session cipher from `encryption_key` or `key_file`.
    pub fn cipher(&self) -> Result<Cipher> {
        if let Some(ref encoded) = self.encryption_key {
            return Cipher::from_base64(encoded).context("Invalid encryption_key");
        }
        if let Some(ref key_file) = self.key_file {
            let path = PathBuf::from(shellexpand::tilde(key_file).into_owned());
            return Cipher::from_key_file(&path)
                .with_context(|| format!("Invalid key file {}", path.display()));
        }
        bail!(
            "No encryption key configured. Run `attendance-bot keygen` and set \
             `encryption_key` in the config or {ENV_KEY} in the environment"
        )
    }

    pub fn login_policy(&self) -> LoginPolicy {
        LoginPolicy {
            min_identifier_len: self.min_identifier_len,
            min_secret_len: self.min_secret_len,
        }
    }
}
