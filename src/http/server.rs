//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, timeout, request ID)
//! - Bind server to listener
//! - Relay `/api/*` requests through the forwarder

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, Request},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::EdgeConfig;
use crate::http::request::{into_descriptor, request_id, InboundSettings, X_REQUEST_ID};
use crate::http::response::not_found;
use crate::proxy::ProxyForwarder;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub forwarder: Arc<ProxyForwarder>,
    pub inbound: Arc<InboundSettings>,
}

/// HTTP server for the edge proxy.
pub struct HttpServer {
    router: Router,
    config: EdgeConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: EdgeConfig) -> Self {
        let state = AppState {
            forwarder: Arc::new(ProxyForwarder::new(&config.backend)),
            inbound: Arc::new(InboundSettings {
                path_prefix: config.backend.path_prefix.clone(),
                public_scheme: config.listener.public_scheme.clone(),
                max_body_size: config.security.max_body_size,
            }),
        };

        let router = Self::build_router(&config, state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &EdgeConfig, state: AppState) -> Router {
        let request_id_header = HeaderName::from_static(X_REQUEST_ID);
        let proxy_route = format!("{}/{{*rest}}", config.backend.path_prefix);

        Router::new()
            .route(&proxy_route, any(proxy_handler))
            .route("/healthz", get(healthz))
            .fallback(not_found)
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(request_id_header.clone(), MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::new(request_id_header))
                    .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs))),
            )
    }

    /// The router, for embedding or in-process tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until a shutdown signal is received.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            backend = %self.config.backend.origin,
            prefix = %self.config.backend.path_prefix,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &EdgeConfig {
        &self.config
    }
}

/// Relays one `/api/*` request.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let request_id = request_id(request.headers());
    let path = request.uri().path().to_string();
    let method = request.method().clone();

    let inbound = match into_descriptor(request, &state.inbound).await {
        Ok(descriptor) => descriptor,
        Err(rejection) => {
            tracing::warn!(
                request_id = %request_id,
                method = %method,
                path = %path,
                status = rejection.status.as_u16(),
                "Request rejected before forwarding"
            );
            return rejection.into_response();
        }
    };

    let response = state.forwarder.forward(inbound).await;

    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status.as_u16(),
        set_cookies = response.set_cookies().count(),
        "Relayed request"
    );

    response.into_response()
}

/// Liveness probe.
async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "success": true,
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
        }
    }))
}
