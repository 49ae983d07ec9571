//! fetchgate - command-line views over guarded, cancelable fetches.
//!
//! Each invocation navigates to one route. Data views mount a request
//! controller, render while it loads and tear it down on Ctrl-C; the
//! dashboard route sits behind the session guard.

mod app;
mod router;
mod views;

use std::io;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fetchgate_core::Config;

use app::App;
use router::Route;

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            Config::default()
        }
    };

    let args: Vec<String> = std::env::args().skip(1).collect();
    let route = Route::parse(&args)?;
    info!(?route, "Navigating");

    let mut app = App::new(config)?;
    app.navigate(route).await
}
