//! REST API module for the demo data sources.
//!
//! `ApiClient` does not send anything itself: each method builds an
//! [`HttpRequest`](crate::request::HttpRequest) that a
//! [`RequestController`](crate::controller::RequestController) starts and
//! cancels.

pub mod client;

pub use client::ApiClient;
