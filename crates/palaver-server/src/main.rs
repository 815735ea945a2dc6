//! # Palaver Server
//!
//! Group chat hub serving the same ordered message log to polling and
//! streaming clients.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! palaver
//!
//! # Run with custom config
//! palaver --config /path/to/palaver.toml
//!
//! # Run with environment variables
//! PALAVER_PORT=9000 PALAVER_HOST=0.0.0.0 palaver
//! ```

mod config;
mod handlers;
mod metrics;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "palaver=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting Palaver server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
