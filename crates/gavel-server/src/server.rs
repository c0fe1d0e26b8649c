use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{delete, get, post},
};
use gavel_storage::{DynStore, StoreError};
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::auction::AuctionService;
use crate::cache::{CacheInterceptor, CacheService, CacheSettings};
use crate::config::AppConfig;
use crate::lock::LockService;
use crate::routes::{bids, buckets, items};
use crate::store::{create_quorum_nodes, create_store};
use crate::{handlers, middleware as app_middleware};

/// Shared services handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: DynStore,
    pub cache: Arc<CacheService>,
    pub interceptor: CacheInterceptor,
    pub locks: Arc<LockService>,
    pub auction: Arc<AuctionService>,
}

impl AppState {
    /// Wires the services over an existing primary store and quorum nodes.
    pub fn new(store: DynStore, quorum_nodes: Vec<DynStore>, config: &AppConfig) -> Self {
        let cache = Arc::new(CacheService::new(
            store.clone(),
            CacheSettings::from(&config.cache),
        ));
        let locks = Arc::new(LockService::from_config(
            store.clone(),
            quorum_nodes,
            &config.lock,
        ));
        let auction = Arc::new(AuctionService::from_config(
            store.clone(),
            locks.clone(),
            &config.lock,
        ));
        Self {
            store,
            interceptor: CacheInterceptor::new(cache.clone()),
            cache,
            locks,
            auction,
        }
    }

    /// Connects the stores described by `config.redis`.
    pub async fn from_config(config: &AppConfig) -> Result<Self, StoreError> {
        let store = create_store(&config.redis).await;
        let quorum_nodes = create_quorum_nodes(&config.redis, &store).await?;
        Ok(Self::new(store, quorum_nodes, config))
    }
}

pub struct GavelServer {
    addr: SocketAddr,
    app: Router,
}

pub fn build_app(state: AppState, cfg: &AppConfig) -> Router {
    let body_limit = cfg.server.body_limit_bytes;
    Router::new()
        // Health and info endpoints
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/metrics", get(handlers::metrics))
        // Items
        .route("/items", post(items::create_item))
        .route("/items/{id}", get(items::read_item))
        // Bids, one endpoint per lock strategy
        .route("/bids/no-lock", post(bids::bid_no_lock))
        .route("/bids/spin-lock", post(bids::bid_spin_lock))
        .route("/bids/quorum-lock", post(bids::bid_quorum_lock))
        // Bucket administration
        .route("/bucket", get(buckets::list_buckets))
        .route("/bucket/{ids}", delete(buckets::delete_buckets))
        // Route layer so the matched path is known to the metrics middleware
        .route_layer(middleware::from_fn(app_middleware::track_metrics))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(|req: &axum::http::Request<_>| {
                            use tracing::field::Empty;
                            tracing::info_span!(
                                "http.request",
                                http.method = %req.method(),
                                http.target = %req.uri(),
                                http.status_code = Empty,
                            )
                        })
                        .on_response(
                            |res: &axum::http::Response<_>,
                             latency: std::time::Duration,
                             span: &tracing::Span| {
                                span.record(
                                    "http.status_code",
                                    tracing::field::display(res.status().as_u16()),
                                );
                                tracing::info!(
                                    http.status = %res.status().as_u16(),
                                    elapsed_ms = %latency.as_millis(),
                                    "request handled"
                                );
                            },
                        ),
                )
                .layer(CompressionLayer::new())
                .layer(CorsLayer::permissive()),
        )
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
    state: Option<AppState>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
            state: None,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Uses prebuilt services instead of connecting from the config.
    pub fn with_state(mut self, state: AppState) -> Self {
        self.state = Some(state);
        self
    }

    pub async fn build(self) -> anyhow::Result<GavelServer> {
        let state = match self.state {
            Some(state) => state,
            None => AppState::from_config(&self.config).await?,
        };
        tracing::info!(
            store = state.store.backend_name(),
            compression = self.config.cache.enable_compression,
            "services initialized"
        );

        Ok(GavelServer {
            addr: self.addr,
            app: build_app(state, &self.config),
        })
    }
}

impl GavelServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
