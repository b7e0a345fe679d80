mod bootstrap;
mod chain;
mod config;
mod error;
mod guard;
mod retry;
mod secrets;
mod settlement;
mod store;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,settlement_engine=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!("🚀 Starting escrow settlement engine");

    dotenv::dotenv().ok();
    let config = config::Config::from_env()?;

    let _handles = bootstrap::start_engine(&config).await?;

    info!("🌐 Engine running; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    Ok(())
}
