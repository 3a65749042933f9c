use reqlog::{create_router, error, logging, AppState, Config, Loggers};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let config = Config::from_env();

    let _guard = logging::init(&config.log.dir)?;
    error::install_panic_hook();
    let loggers = Loggers::open(&config.log)?;

    let state = Arc::new(AppState {
        config: config.clone(),
        loggers,
    });
    let app = create_router(state);

    info!(address = %config.server_address, log_dir = %config.log.dir.display(), "starting server");
    let listener = tokio::net::TcpListener::bind(&config.server_address).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutting down");
}
