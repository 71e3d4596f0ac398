//! Cryptographic primitives for the session store.
//!
//! Sessions are sealed with AES-256-GCM under a single key supplied at
//! process start (see [`cipher`]).

pub mod cipher;

pub use cipher::{Cipher, CipherError, CredentialRecord, DecodeFailure, KeyError};
