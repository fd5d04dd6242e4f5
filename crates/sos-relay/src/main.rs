//! SOS chat relay server

mod config;
mod rate_limit;
mod registry;
mod room;
mod routes;
mod store;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::RelayConfig;
use crate::registry::Registry;
use crate::store::Store;

#[derive(Parser)]
#[command(name = "sos-relay")]
#[command(about = "SOS Chat Relay Server", long_about = None)]
struct Cli {
    /// Host to bind to
    #[arg(long, env = "SOS_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(long, env = "SOS_PORT", default_value_t = 8899)]
    port: u16,

    /// Optional Redis URL backing the room registry
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = RelayConfig {
        host: cli.host,
        port: cli.port,
        redis_url: cli.redis_url,
    };

    let store = Store::connect(config.redis_url.as_deref()).await;
    info!(backing = store.describe(), "room storage ready");

    let registry = Arc::new(Registry::new(store));
    registry.spawn_sweeper(CancellationToken::new());

    let app = routes::router(Arc::clone(&registry));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("SOS relay listening on http://{addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server exited")?;

    Ok(())
}
