//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the axum router for both path families
//! - Wire up middleware (request id, tracing, timeout, body limit)
//! - Serve over plain TCP or rustls until shutdown

use axum::{
    body::Body,
    http::Request,
    routing::{get, post},
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::RelayConfig;
use crate::http::handlers::{self, AppState};
use crate::relay::RelayService;

/// HTTP server for the relay.
pub struct HttpServer {
    router: Router,
    config: RelayConfig,
}

impl HttpServer {
    pub fn new(config: RelayConfig, service: Arc<RelayService>) -> Self {
        let router = Self::build_router(&config, AppState { service });
        Self { router, config }
    }

    #[allow(deprecated)]
    fn build_router(config: &RelayConfig, state: AppState) -> Router {
        Router::new()
            .route("/send/prepare", post(handlers::prepare_generic))
            .route("/api/prepare", post(handlers::prepare_generic))
            .route("/send/confirm", post(handlers::confirm_generic))
            .route("/api/confirm", post(handlers::confirm_generic))
            .route("/send/{chain}/prepare", post(handlers::prepare_for_chain))
            .route("/api/{chain}/prepare", post(handlers::prepare_for_chain))
            .route("/send/{chain}/confirm", post(handlers::confirm_for_chain))
            .route("/api/{chain}/confirm", post(handlers::confirm_for_chain))
            .route("/send/transactions/{id}", get(handlers::get_transaction))
            .route("/api/transactions/{id}", get(handlers::get_transaction))
            .route("/health", get(handlers::health))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                        let request_id = request
                            .headers()
                            .get("x-request-id")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("unknown");
                        tracing::info_span!(
                            "request",
                            method = %request.method(),
                            path = %request.uri().path(),
                            request_id = %request_id,
                        )
                    }))
                    // Timeout needs a defaultable response body, so it sits innermost
                    .layer(RequestBodyLimitLayer::new(config.relay.max_body_bytes))
                    .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs))),
            )
    }

    /// The assembled router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve plain HTTP on `listener` until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Serve HTTPS on `addr` until `shutdown` fires.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        mut shutdown: broadcast::Receiver<()>,
    ) -> std::io::Result<()> {
        tracing::info!(address = %addr, "HTTPS server starting");

        let handle = axum_server::Handle::new();
        let drain = Duration::from_secs(self.config.timeouts.shutdown_secs);
        let watcher = handle.clone();
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            watcher.graceful_shutdown(Some(drain));
        });

        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(self.router.into_make_service())
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }
}
