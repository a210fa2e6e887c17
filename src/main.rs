use chatline::config::Config;
use chatline::runtime;
use chatline::server_log::TracingSink;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        max_connections = config.max_connections,
        max_frame_size = config.max_frame_size,
        "Starting chatline server"
    );

    let mut server = runtime::start(&config, Arc::new(TracingSink))?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    server.stop()?;
    Ok(())
}
