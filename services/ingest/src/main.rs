use std::env;

use ingest::config::Config;
use ingest::consumer;
use ingest::handlers::HandlerContext;
use ingest::state::AppState;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .init();

    let config = Config::from_env();

    info!("connecting to catalog...");
    let catalog = catalog_client::create_pool(&config.mysql_uri).await?;

    info!("connecting to document store...");
    let store = doc_store::DocStore::connect(&config.mongo_uri).await?;
    store.create_indexes().await?;
    info!("document store indexes ensured");

    let tire_api = tire_api_client::TireApiClient::new(
        config.smarttyre.base_url.clone(),
        config.smarttyre.client_id.clone(),
        config.smarttyre.client_secret.clone(),
        config.smarttyre.sign_key.clone(),
    );

    let state = AppState::new(catalog, store, tire_api);

    let bus_consumer = consumer::build_consumer(&config.kafka)?;
    let ctx = HandlerContext {
        catalog: &state.catalog,
        tire_api: state.tire_api.as_ref(),
        cache: state.cache.as_ref(),
        store: &state.store,
        hub: state.hub.as_ref(),
    };

    let router = ingest::build_router(state.clone());
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "ingest service listening");

    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.cancel();
    });

    let server = axum::serve(listener, router).with_graceful_shutdown(state.shutdown.clone().cancelled_owned());
    let bus = consumer::run(bus_consumer, ctx, state.shutdown.clone().cancelled_owned());

    let (server_result, ()) = tokio::join!(server, bus);
    server_result?;
    info!("ingest service shut down gracefully");
    Ok(())
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
