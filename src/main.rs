use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use energy_monitor_service::{
    aggregator::Aggregator,
    alerts::AlertEngine,
    api::{self, AppState},
    config::Config,
    db,
    facade::Facade,
    ingest::IngestService,
    store::{PgStore, PowerStore},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Env vars may be set externally, so a missing .env is fine
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;

    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    db::run_migrations(&pool).await?;
    info!(max_connections = config.db_max_connections, "Database ready");

    let store: Arc<dyn PowerStore> = Arc::new(PgStore::new(pool));
    let engine = Arc::new(AlertEngine::with_thresholds(&config.thresholds));
    let state = AppState {
        facade: Facade::new(
            store.clone(),
            Aggregator::new(store.clone(), config.history.clone()),
        ),
        ingest: IngestService::new(store, engine),
    };

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, "HTTP server listening");

    let app = api::router(state).layer(TraceLayer::new_for_http());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
