//! Sharecast - data availability share retrieval node
//!
//! Serves shares and extended data squares through a cascade of getters.

use sharecast_core::{run_node, Config};
use std::error::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Parse CLI arguments and build config
    let config = Config::from_cli()?;

    init_logging(&config.log_level);

    tracing::info!("Starting Sharecast node on network {}...", config.network);

    run_node(config).await?;

    Ok(())
}

fn init_logging(level: &str) {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(level))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
