use quatro::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), QuatroError> {
    init_tracing();

    let config = ServerConfig::load();
    let server = QuatroServerBuilder::new()
        .config(config)
        .build(DevTokenResolver, MemoryStore::new())
        .await?;
    tracing::info!(addr = %server.local_addr()?, "listening");

    server.run_until(shutdown_signal()).await
}

/// Log filter from `RUST_LOG`, `info` when unset.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for ctrl-c; running until killed");
        std::future::pending::<()>().await;
    }
}
