use crate::acquisition::{self, HttpDownloader, JobRunner, JobStore, ProgressChannel, Transcoder};
use crate::config::{Config, StoreKind};
use crate::sources::SourceResolver;
use crate::streaming::StreamRelay;
use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use relaycast_store::{HttpObjectStore, HttpStoreSettings, LocalObjectStore, ObjectStore};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

pub mod error;
pub mod routes_acquisition;
pub mod routes_library;
pub mod routes_stream;

pub use error::AppError;

/// How often finished, unobserved jobs are swept.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    /// Backing object store
    pub objects: Arc<dyn ObjectStore>,
    pub relay: StreamRelay,
    pub runner: JobRunner,
    pub progress: ProgressChannel,
}

impl AppContext {
    /// Wire the context from already-built collaborators.
    pub fn new(
        config: Config,
        objects: Arc<dyn ObjectStore>,
        resolver: SourceResolver,
        transcoder: Arc<dyn Transcoder>,
        client: reqwest::Client,
    ) -> Self {
        let acq = &config.acquisition;
        let jobs = JobStore::new(acq.delivery_grace(), acq.orphan_ttl());
        let downloader = HttpDownloader::new(client, acq.download_idle_timeout());

        let runner = JobRunner::new(
            jobs.clone(),
            Arc::new(resolver),
            downloader,
            transcoder,
            objects.clone(),
        )
        .with_temp_root(acq.temp_dir.clone())
        .with_default_destination(acq.default_destination.clone());

        let progress = ProgressChannel::new(jobs, acq.poll_interval());

        Self {
            relay: StreamRelay::new(objects.clone()),
            config: Arc::new(config),
            objects,
            runner,
            progress,
        }
    }

    /// Build every collaborator from configuration.
    pub async fn from_config(config: Config) -> Result<Self> {
        let objects = open_store(&config).await?;

        let client = http_client()?;

        let resolver = SourceResolver::from_config(&config.sources, client.clone());
        let transcoder = acquisition::transcode::from_config(&config.transcode);

        Ok(Self::new(config, objects, resolver, transcoder, client))
    }
}

/// Outbound client shared by source lookups and downloads.
///
/// Only connecting is bounded here. Callers bound their own waits: the
/// resolver times each provider call and the downloader applies its idle
/// timeout to the response headers and to every body chunk.
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("relaycast/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .context("Failed to build HTTP client")
}

/// Open the configured backing store.
pub async fn open_store(config: &Config) -> Result<Arc<dyn ObjectStore>> {
    let store = &config.store;
    match store.kind {
        StoreKind::Http => {
            let base_url = store
                .base_url
                .clone()
                .context("store.base_url is required for the http store")?;
            tracing::info!("Using HTTP object store at {}", base_url);
            let settings = HttpStoreSettings {
                base_url,
                token: store.token.clone(),
                max_connections: store.max_connections,
                connect_timeout: Duration::from_secs(store.connect_timeout_secs),
                request_timeout: Duration::from_secs(store.request_timeout_secs),
                ..HttpStoreSettings::default()
            };
            Ok(Arc::new(HttpObjectStore::new(settings)?))
        }
        StoreKind::Local => {
            tracing::info!("Using local object store at {:?}", store.root);
            Ok(Arc::new(LocalObjectStore::open(&store.root).await?))
        }
    }
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    let origins = &ctx.config.server.cors_origins;
    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };

    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::RANGE])
        .expose_headers([
            header::CONTENT_RANGE,
            header::CONTENT_LENGTH,
            header::ACCEPT_RANGES,
        ]);

    Router::new()
        .route("/health", get(health_check))
        .merge(routes_stream::stream_routes())
        .merge(routes_acquisition::acquisition_routes())
        .merge(routes_library::library_routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Start the HTTP server
pub async fn start_server(config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let ctx = AppContext::from_config(config).await?;
    let sweeper = acquisition::spawn_sweeper(ctx.runner.jobs().clone(), SWEEP_INTERVAL);

    let app = create_router(ctx);

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
