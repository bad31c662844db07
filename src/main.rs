use std::net::SocketAddr;

use adgram_ledger::{AppState, Config, PgStore, init_pool, init_router};
use anyhow::Result;
use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    let pool = init_pool(&config.database_url).await?;
    let store = PgStore::new(pool);
    store.migrate().await?;

    let addr: SocketAddr = ([0, 0, 0, 0], config.server_port).into();
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("listening on {addr}");

    let app = init_router(AppState { store, config });
    axum::serve(listener, app).await?;
    Ok(())
}
