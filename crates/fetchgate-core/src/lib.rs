//! Race-safe data fetching and session gating.
//!
//! - [`request`]: one outbound call paired with a cancellation signal
//! - [`controller`]: the generation-tagged fetch lifecycle built on top
//! - [`auth`]: the persisted session token and the guard that reads it
//! - [`api`], [`models`], [`config`]: the demo endpoints and their settings

pub mod api;
pub mod auth;
pub mod config;
pub mod controller;
pub mod error;
pub mod models;
pub mod request;

pub use auth::{CredentialStore, Gate, SessionGuard, Verdict};
pub use config::Config;
pub use controller::{FetchState, RequestController, Settlement, Snapshot, Status};
pub use error::RequestError;
pub use request::{CancelableRequest, HttpRequest, Outcome};
