//! Authentication module for the session token and the guard that reads it.
//!
//! This module provides:
//! - `CredentialStore`: the single persisted `token` slot, with file,
//!   OS keychain and in-memory backends
//! - `SessionGuard`: allow/deny decisions for protected views
//!
//! The token is opaque. It is never validated or refreshed here; presence
//! alone decides whether a protected view may render.

pub mod credentials;
pub mod guard;

pub use credentials::{
    CredentialStore, FileBackend, KeyringBackend, MemoryBackend, TokenBackend, TOKEN_KEY,
};
pub use guard::{Gate, SessionGuard, Verdict, DEFAULT_LOGIN_PATH};
