//! # Parley Server
//!
//! Room-scoped realtime chat gateway.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! parley
//!
//! # Run with a specific config file
//! parley --config /path/to/parley.toml
//!
//! # Override settings from the environment
//! PARLEY_PORT=8080 PARLEY_HOST=0.0.0.0 PARLEY_LIMITS__MAX_CONNECTIONS=5000 parley
//! ```

mod config;
mod handlers;
mod metrics;
mod seed;

use anyhow::{bail, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let mut args = std::env::args().skip(1);
    let config = match (args.next().as_deref(), args.next()) {
        (None, _) => config::Config::load()?,
        (Some("--config"), Some(path)) => config::Config::from_file(path)?,
        (Some(arg), _) => bail!("Unexpected argument: {}", arg),
    };

    tracing::info!("Starting Parley server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
