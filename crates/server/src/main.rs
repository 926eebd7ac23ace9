use std::{net::SocketAddr, sync::Arc};

use server::{
    config::{load_settings, prepare_data_dir},
    serve, AppState,
};
use storage::LocalStores;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = load_settings();
    let data_dir = prepare_data_dir(&settings.data_dir)?;
    let state = AppState {
        stores: LocalStores::in_dir(&data_dir),
    };

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, data_dir = %data_dir.display(), "replication server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve(listener, Arc::new(state)).await?;
    Ok(())
}
