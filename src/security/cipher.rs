//! AES-256-GCM codec for credential records.
//!
//! Every stored session is a serialized [`CredentialRecord`] sealed with a
//! process-wide 256-bit key. Output tokens are text so they can live inside
//! the JSON session document:
//!
//! ```text
//! aes256:<base64(nonce || ciphertext || tag)>
//! ```
//!
//! A fresh 96-bit nonce is drawn for every call, so sealing the same record
//! twice never yields the same token. Losing the key makes every stored
//! token undecodable; callers treat that the same as an expired session.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Nonce size for AES-256-GCM (12 bytes / 96 bits).
const NONCE_SIZE: usize = 12;

/// Key size for AES-256-GCM.
pub const KEY_SIZE: usize = 32;

/// Prefix carried by every token this codec produces.
const TOKEN_PREFIX: &str = "aes256:";

/// Plaintext credential record. Only ever exists inside a single
/// encrypt or decrypt call and in the value handed back to the caller.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub identifier: String,
    pub secret: String,
    /// Issuance time, Unix epoch milliseconds.
    pub issued_at_ms: u64,
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("identifier", &self.identifier)
            .field("secret", &"<redacted>")
            .field("issued_at_ms", &self.issued_at_ms)
            .finish()
    }
}

/// Why a token could not be opened. Never carries any plaintext.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeFailure {
    #[error("missing aes256 token prefix")]
    MissingPrefix,
    #[error("token is not valid base64")]
    Encoding,
    #[error("token too short")]
    Truncated,
    #[error("authentication tag mismatch")]
    Authentication,
    #[error("decrypted payload is not a credential record")]
    Payload,
}

/// Failures on the sealing side.
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("credential record serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("AES-256-GCM encryption failed")]
    Encrypt,
}

/// Errors raised while loading key material.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("encryption key must be exactly {KEY_SIZE} bytes, got {0}")]
    Length(usize),
    #[error("encryption key is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("failed to read key file: {0}")]
    Io(#[from] std::io::Error),
}

/// Symmetric codec holding the fixed session key.
#[derive(Clone)]
pub struct Cipher {
    cipher: Aes256Gcm,
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cipher(<key redacted>)")
    }
}

impl Cipher {
    /// Create a codec from raw key bytes.
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(&key);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    /// Create a codec from a standard base64 key string.
    pub fn from_base64(encoded: &str) -> Result<Self, KeyError> {
        let bytes = base64::engine::general_purpose::STANDARD.decode(encoded.trim())?;
        Self::from_slice(&bytes)
    }

    /// Create a codec by loading the raw 32-byte key from a file.
    pub fn from_key_file(path: &Path) -> Result<Self, KeyError> {
        let bytes = std::fs::read(path)?;
        Self::from_slice(&bytes)
    }

    fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        let key: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| KeyError::Length(bytes.len()))?;
        Ok(Self::new(key))
    }

    /// Generate a fresh random key, base64 encoded.
    pub fn generate_key() -> String {
        let key = Aes256Gcm::generate_key(OsRng);
        base64::engine::general_purpose::STANDARD.encode(key)
    }

    /// Generate a fresh random key, write the raw bytes to `path` and return
    /// the matching codec.
    pub fn generate_key_file(path: &Path) -> Result<Self, KeyError> {
        let key = Aes256Gcm::generate_key(OsRng);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, key.as_slice())?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(Self {
            cipher: Aes256Gcm::new(&key),
        })
    }

    /// Seal a record into an opaque token.
    pub fn encrypt(&self, record: &CredentialRecord) -> Result<String, CipherError> {
        let plaintext = serde_json::to_vec(record)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_slice())
            .map_err(|_| CipherError::Encrypt)?;

        let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(&nonce);
        combined.extend_from_slice(&ciphertext);

        let encoded = base64::engine::general_purpose::STANDARD.encode(&combined);
        Ok(format!("{TOKEN_PREFIX}{encoded}"))
    }

    /// Open a token produced by [`Cipher::encrypt`].
    pub fn decrypt(&self, token: &str) -> Result<CredentialRecord, DecodeFailure> {
        let encoded = token
            .strip_prefix(TOKEN_PREFIX)
            .ok_or(DecodeFailure::MissingPrefix)?;

        let combined = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|_| DecodeFailure::Encoding)?;

        if combined.len() <= NONCE_SIZE {
            return Err(DecodeFailure::Truncated);
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| DecodeFailure::Authentication)?;

        serde_json::from_slice(&plaintext).map_err(|_| DecodeFailure::Payload)
    }

    /// Check if a string carries this codec's token prefix.
    pub fn is_token(value: &str) -> bool {
        value.starts_with(TOKEN_PREFIX)
    }
}
