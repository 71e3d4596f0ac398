//! Attendance bot: portal login over chat with encrypted, expiring sessions.
//!
//! ## Architecture
//!
//! ```text
//! Channel ─▸ dispatch lanes ─▸ Bot ─┬─▸ LoginFlow ─▸ Portal::authenticate
//!                                   │        └────▸ SessionStore::put
//!                                   └─▸ SessionGate ─▸ SessionStore::get ─▸ Portal::fetch_attendance
//!
//! SessionStore ─▸ Cipher (AES-256-GCM) ─▸ SessionBackend (JSON file)
//! ```
//!
//! Credentials live only inside the cipher boundary: the session file holds
//! one sealed token per chat user, and sessions expire lazily after the
//! configured timeout.

pub mod bot;
pub mod channels;
pub mod config;
pub mod login;
pub mod portal;
pub mod security;
pub mod session;

pub use bot::Bot;
pub use config::Config;
