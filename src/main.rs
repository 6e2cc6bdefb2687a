//! Pool scoring backend binary entrypoint wiring REST, SSE and the match store.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pool_scoring_back::{
    config::AppConfig,
    dao::match_store::memory::MemoryMatchStore,
    routes,
    services::seed,
    state::{AppState, SharedState},
};

/// Selects the storage backend (`memory` or `couch`).
const STORE_ENV: &str = "POOL_SCORING_STORE";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let app_state = AppState::new(config);

    start_store(&app_state).await?;
    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Install the configured match store. CouchDB is supervised in the
/// background; the server starts degraded until it is reachable.
async fn start_store(state: &SharedState) -> anyhow::Result<()> {
    let backend = env::var(STORE_ENV).unwrap_or_else(|_| default_backend().into());

    match backend.as_str() {
        "memory" => {
            let store = MemoryMatchStore::new();
            if let Some(path) = state.config().seed_path() {
                seed::load_file(&store, path)
                    .await
                    .with_context(|| format!("loading seed data from {}", path.display()))?;
            }
            info!("using in-memory match store");
            state.install_match_store(Arc::new(store)).await;
        }
        #[cfg(feature = "couch-store")]
        "couch" => {
            use pool_scoring_back::{
                dao::{
                    match_store::{
                        MatchStore,
                        couchdb::{CouchConfig, CouchMatchStore},
                    },
                    storage::StorageError,
                },
                services::storage_supervisor,
            };

            let couch = CouchConfig::from_env().context("reading CouchDB configuration")?;
            info!(database = %couch.database, "using CouchDB match store");
            tokio::spawn(storage_supervisor::run(state.clone(), move || {
                let couch = couch.clone();
                async move {
                    let store = CouchMatchStore::connect(couch)
                        .await
                        .map_err(StorageError::from)?;
                    Ok(Arc::new(store) as Arc<dyn MatchStore>)
                }
            }));
        }
        other => anyhow::bail!("unknown {STORE_ENV} value `{other}`"),
    }

    Ok(())
}

fn default_backend() -> &'static str {
    if env::var("COUCH_BASE_URL").is_ok() && cfg!(feature = "couch-store") {
        "couch"
    } else {
        warn!("no CouchDB configured; falling back to the in-memory store");
        "memory"
    }
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
