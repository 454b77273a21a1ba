use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use eskimoe_server::config::Config;
use eskimoe_server::db::memory::MemoryStore;
use eskimoe_server::db::postgres::PgStore;
use eskimoe_server::db::store::EntityStore;
use eskimoe_server::gateway::hub::{Hub, HubConfig, HubHandle};
use eskimoe_server::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing, env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    let store: Arc<dyn EntityStore> = match &config.database_url {
        Some(url) => {
            let pool = eskimoe_server::db::pool::connect(url).expect("failed to create database pool");
            Arc::new(PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using the in-memory store, data is lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    let server = eskimoe_server::db::seed::ensure_server(store.as_ref(), &config)
        .await
        .expect("failed to initialise server record");
    tracing::info!(name = %server.name, mode = %server.mode, "eskimoe-server configured");

    let (hub, hub_task) = Hub::start(HubConfig::from(&config));

    let state = AppState {
        store,
        hub: hub.clone(),
        config: Arc::new(config),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(eskimoe_server::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "eskimoe-server listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(hub.clone()))
        .await
        .expect("server error");

    hub.stop();
    if let Err(err) = hub_task.await {
        tracing::error!(%err, "hub task ended abnormally");
    }
    tracing::info!("eskimoe-server stopped");
}

/// Resolves on ctrl-c. Stopping the hub here releases open websockets so the
/// graceful shutdown is not held up by them.
async fn shutdown_signal(hub: HubHandle) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
    hub.stop();
}
