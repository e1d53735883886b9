use std::sync::Arc;

use agent_host::{Cli, HostConfig, InstanceRegistry};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn init_telemetry() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(filter).with(fmt::layer().with_target(false)).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_telemetry();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => HostConfig::from_toml(&std::fs::read_to_string(path)?)?,
        None => HostConfig::default(),
    };
    let config = cli.apply(config);

    let listen_addr = config.listen_addr.clone();
    let registry = Arc::new(InstanceRegistry::new(Arc::new(config)));

    let app = agent_host::http::router(registry.clone());

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    info!(addr = %listen_addr, "agent-host listening");

    let shutdown_registry = registry.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down, draining instance registry");
            shutdown_registry.shutdown_all().await;
        })
        .await?;

    Ok(())
}
