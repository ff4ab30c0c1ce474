//! # Service Bus Gateway HTTP Service
//!
//! HTTP surface over a [`BrokerGateway`] bound to one queue.
//!
//! This service provides:
//! - Raw and typed publish endpoints
//! - Destructive receive and non-destructive peek endpoints, each with an
//!   optional `metadata=true` view
//! - Health, readiness and Prometheus metrics endpoints

pub mod config;
pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod presentation;
pub mod responses;
pub mod telemetry;

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

use axum::{
    extract::{DefaultBodyLimit, MatchedPath, State},
    middleware,
    response::Response,
    routing::{get, post},
    Router,
};
use servicebus_gateway_core::BrokerGateway;
use std::{sync::Arc, time::Instant};
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, instrument, warn};

// Re-export for convenience
pub use config::{load_config, LoggingConfig, ServerConfig, ServiceBusConfig, ServiceConfig};
pub use errors::{ApiError, ConfigError, ServiceError};
pub use metrics::ServiceMetrics;
pub use presentation::MessageView;
pub use responses::{PublishRequest, PublishResponse};
pub use telemetry::init_tracing;

/// Header carrying the request correlation ID
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration for the service
    pub config: Arc<ServiceConfig>,

    /// Gateway bound to the configured queue
    pub gateway: Arc<BrokerGateway>,

    /// Metrics collector for observability
    pub metrics: Arc<ServiceMetrics>,
}

impl AppState {
    pub fn new(
        config: ServiceConfig,
        gateway: Arc<BrokerGateway>,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            gateway,
            metrics,
        }
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Create HTTP router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let publish_routes = Router::new()
        .route("/servicebus", post(handlers::publish_raw))
        .route("/servicebus/typed", post(handlers::publish_typed));

    let receive_routes = Router::new()
        .route("/servicebus/receive", get(handlers::receive))
        .route(
            "/servicebus/receive-messages",
            get(handlers::receive_messages),
        )
        .route("/servicebus/receive-typed", get(handlers::receive_typed))
        .route(
            "/servicebus/receive-typed-messages",
            get(handlers::receive_typed_messages),
        );

    let peek_routes = Router::new()
        .route("/servicebus/peek", get(handlers::peek))
        .route("/servicebus/peek-messages", get(handlers::peek_messages))
        .route("/servicebus/peek-typed", get(handlers::peek_typed))
        .route(
            "/servicebus/peek-typed-messages",
            get(handlers::peek_typed_messages),
        );

    let observability_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .route("/metrics", get(handlers::metrics));

    let mut router = Router::new()
        .merge(publish_routes)
        .merge(receive_routes)
        .merge(peek_routes)
        .merge(observability_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(state.config.server.max_body_size))
                .layer(middleware::from_fn(request_logging_middleware))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    metrics_middleware,
                ))
                .into_inner(),
        );

    if state.config.server.enable_compression {
        router = router.layer(CompressionLayer::new());
    }
    if state.config.server.enable_cors {
        router = router.layer(CorsLayer::permissive());
    }

    router.with_state(state)
}

/// Serve `gateway` until SIGINT or SIGTERM
pub async fn start_server(
    config: ServiceConfig,
    gateway: Arc<BrokerGateway>,
) -> Result<(), ServiceError> {
    let metrics = ServiceMetrics::new().map_err(|e| {
        ServiceError::Configuration(ConfigError::Invalid {
            message: format!("Failed to initialize metrics: {}", e),
        })
    })?;

    let address = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(config, gateway, metrics);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(|e| ServiceError::BindFailed {
            address: address.clone(),
            message: e.to_string(),
        })?;

    info!(address = %address, "Starting HTTP server");

    // In-flight requests finish before the server returns
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ServiceError::ServerFailed {
            message: e.to_string(),
        })?;

    info!("HTTP server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C), initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}

// ============================================================================
// Middleware
// ============================================================================

/// Request logging middleware
///
/// Reuses the caller's `x-correlation-id` or generates one, records it on the
/// span and echoes it in the response headers.
#[instrument(skip(request, next), fields(
    method = %request.method(),
    uri = %request.uri(),
    correlation_id
))]
async fn request_logging_middleware(
    mut request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let correlation_id = request
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    tracing::Span::current().record("correlation_id", correlation_id.as_str());
    request.extensions_mut().insert(correlation_id.clone());

    let mut response = next.run(request).await;
    let duration = start.elapsed();

    if let Ok(header_value) = correlation_id.parse() {
        response
            .headers_mut()
            .insert(CORRELATION_ID_HEADER, header_value);
    }

    let status = response.status().as_u16();
    let elapsed_ms = duration.as_millis() as u64;
    match response.status() {
        s if s.is_server_error() => error!(
            correlation_id = %correlation_id,
            %method,
            %uri,
            status,
            elapsed_ms,
            "Request failed"
        ),
        s if s.is_client_error() => warn!(
            correlation_id = %correlation_id,
            %method,
            %uri,
            status,
            elapsed_ms,
            "Request rejected"
        ),
        _ => info!(
            correlation_id = %correlation_id,
            %method,
            %uri,
            status,
            elapsed_ms,
            "Request completed"
        ),
    }

    response
}

/// Count requests by route template so IDs in paths cannot explode cardinality
async fn metrics_middleware(
    State(state): State<AppState>,
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;

    state
        .metrics
        .record_http_request(&method, &path, response.status().as_u16(), start.elapsed());

    response
}
