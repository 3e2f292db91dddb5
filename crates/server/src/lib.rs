//! Server crate provides HTTP server functionality.
//!
//! This module implements the HTTP boundary of the order lifecycle engine:
//! order creation, evidence upload, status transitions, role-scoped listings,
//! and the admin settlement ledger. Authentication happens upstream; the
//! handlers only consume the already-authenticated `(user id, role)` pair.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{FromRequestParts, Path as AxumPath, State},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use model::{GeoPoint, NewOrder, OrderStatus, PhotoType, UserRole};
use prometheus::{CounterVec, HistogramOpts, HistogramVec, Opts, Registry};
use serde::Deserialize;
use service::{OrderService, ServiceError};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

/// Server represents the HTTP server for working with orders.
pub struct Server {
    service: Arc<dyn OrderService>,
    port: String,
    metrics: Arc<Metrics>,
}

/// Metrics collects and exposes HTTP server metrics.
struct Metrics {
    registry: Registry,
    http_requests_total: CounterVec,
    http_request_duration_seconds: HistogramVec,
    errors_total: CounterVec,
}

impl Metrics {
    fn new() -> Self {
        let registry = Registry::new();

        let http_requests_total = CounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "endpoint", "status"],
        )
        .expect("Failed to create http_requests_total metric");

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request duration in seconds",
            ),
            &["method", "endpoint"],
        )
        .expect("Failed to create http_request_duration_seconds metric");

        let errors_total = CounterVec::new(
            Opts::new("errors_total", "Total number of errors"),
            &["source", "endpoint"],
        )
        .expect("Failed to create errors_total metric");

        registry
            .register(Box::new(http_requests_total.clone()))
            .expect("Failed to register http_requests_total metric");
        registry
            .register(Box::new(http_request_duration_seconds.clone()))
            .expect("Failed to register http_request_duration_seconds metric");
        registry
            .register(Box::new(errors_total.clone()))
            .expect("Failed to register errors_total metric");

        Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            errors_total,
        }
    }

    fn record_request(&self, method: &str, endpoint: &str, status: u16, duration: Duration) {
        self.http_requests_total
            .with_label_values(&[method, endpoint, &status.to_string()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, endpoint])
            .observe(duration.as_secs_f64());
    }

    fn record_error(&self, source: &str, endpoint: &str) {
        self.errors_total
            .with_label_values(&[source, endpoint])
            .inc();
    }
}

/// Application state shared between request handlers
#[derive(Clone)]
struct AppState {
    service: Arc<dyn OrderService>,
    metrics: Arc<Metrics>,
}

/// The authenticated `(user id, role)` pair the lifecycle engine trusts.
///
/// The fronting auth layer injects `X-User-Id` and `X-User-Role`; requests
/// without a valid pair are rejected with 401.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub role: UserRole,
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.is_empty())
            .ok_or((StatusCode::UNAUTHORIZED, "missing X-User-Id header"))?
            .to_string();

        let role = parts
            .headers
            .get("x-user-role")
            .and_then(|v| v.to_str().ok())
            .and_then(UserRole::parse)
            .ok_or((StatusCode::UNAUTHORIZED, "missing or invalid X-User-Role header"))?;

        Ok(Self { id, role })
    }
}

#[derive(Debug, Deserialize)]
struct ChangeStatusBody {
    status: OrderStatus,
    lat: Option<f64>,
    lon: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct AddPhotoBody {
    url: String,
    #[serde(rename = "type")]
    kind: PhotoType,
}

/// Maps a service error onto an HTTP response. Infrastructure errors are
/// logged and returned without detail.
fn error_response(err: ServiceError) -> Response {
    let status = match &err {
        ServiceError::Validation(_) | ServiceError::IllegalTransition { .. } => {
            StatusCode::BAD_REQUEST
        }
        ServiceError::NotFound => StatusCode::NOT_FOUND,
        ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
        ServiceError::Upstream(_) => StatusCode::BAD_GATEWAY,
        ServiceError::Db(_) | ServiceError::Pool(_) | ServiceError::Unexpected(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    if status.is_server_error() {
        error!("Request failed: {err}");
        return (status, "internal error").into_response();
    }
    (status, err.to_string()).into_response()
}

fn forbidden_role() -> Response {
    (StatusCode::FORBIDDEN, "insufficient role").into_response()
}

impl Server {
    /// Creates a new Server instance.
    ///
    /// # Arguments
    ///
    /// * `port` - The port on which the server will listen
    /// * `service` - The order lifecycle service handling all operations
    pub fn new(port: String, service: Arc<dyn OrderService>) -> Self {
        info!("Initializing HTTP server on port {}", port);

        Self {
            service,
            port,
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Starts the server and blocks until it's shut down.
    pub async fn start(&self) -> Result<()> {
        let app = self.create_router();

        let listener = TcpListener::bind(format!("0.0.0.0:{}", self.port))
            .await
            .context("Failed to bind to port")?;

        info!("HTTP server listening on port {}", self.port);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("Server error")?;

        info!("HTTP server shut down gracefully");
        Ok(())
    }

    fn create_router(&self) -> Router {
        let metrics = self.metrics.clone();

        Router::new()
            .route("/orders", post(Self::handle_create_order))
            .route("/orders/{id}/photos", post(Self::handle_add_photo))
            .route("/orders/{id}/status", patch(Self::handle_change_status))
            .route("/orders/my/client", get(Self::handle_get_for_client))
            .route("/orders/my/store", get(Self::handle_get_for_store))
            .route("/orders/my/courier", get(Self::handle_get_for_courier))
            .route(
                "/orders/available/courier",
                get(Self::handle_available_for_courier),
            )
            .route(
                "/orders/admin/transactions",
                get(Self::handle_transactions),
            )
            .route("/health", get(Self::handle_health))
            .route("/metrics", get(Self::handle_metrics))
            .layer(axum::middleware::from_fn_with_state(
                metrics.clone(),
                Self::metrics_middleware,
            ))
            .with_state(AppState {
                service: self.service.clone(),
                metrics,
            })
    }

    /// Middleware for collecting metrics on HTTP requests
    async fn metrics_middleware(
        State(metrics): State<Arc<Metrics>>,
        req: axum::extract::Request,
        next: axum::middleware::Next,
    ) -> Response {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();

        let start = std::time::Instant::now();
        let response = next.run(req).await;
        let status = response.status().as_u16();

        metrics.record_request(&method, &path, status, start.elapsed());
        if status >= 400 {
            metrics.record_error("http", &path);
        }

        response
    }

    async fn handle_create_order(
        State(state): State<AppState>,
        user: AuthUser,
        Json(body): Json<NewOrder>,
    ) -> Response {
        if user.role != UserRole::Client {
            return forbidden_role();
        }
        info!(client_id = %user.id, store_id = %body.store_id, "Received create-order request");

        match state.service.create_order(&user.id, &body).await {
            Ok(created) => (StatusCode::CREATED, Json(created)).into_response(),
            Err(e) => error_response(e),
        }
    }

    async fn handle_add_photo(
        State(state): State<AppState>,
        AxumPath(order_id): AxumPath<String>,
        user: AuthUser,
        Json(body): Json<AddPhotoBody>,
    ) -> Response {
        if !matches!(user.role, UserRole::Store | UserRole::Courier) {
            return forbidden_role();
        }

        match state
            .service
            .add_order_photo(&order_id, &body.url, body.kind)
            .await
        {
            Ok(photo) => (StatusCode::CREATED, Json(photo)).into_response(),
            Err(e) => error_response(e),
        }
    }

    async fn handle_change_status(
        State(state): State<AppState>,
        AxumPath(order_id): AxumPath<String>,
        user: AuthUser,
        Json(body): Json<ChangeStatusBody>,
    ) -> Response {
        info!(order_id = %order_id, next = %body.status, role = user.role.as_str(),
              "Received status change request");

        let metadata = match (body.lat, body.lon) {
            (Some(lat), Some(lon)) => Some(GeoPoint { lat, lon }),
            _ => None,
        };

        match state
            .service
            .change_status(&order_id, body.status, &user.id, user.role, metadata)
            .await
        {
            Ok(order) => Json(order).into_response(),
            Err(e) => {
                warn!(order_id = %order_id, "Status change rejected: {e}");
                error_response(e)
            }
        }
    }

    async fn handle_get_for_client(State(state): State<AppState>, user: AuthUser) -> Response {
        if user.role != UserRole::Client {
            return forbidden_role();
        }
        match state.service.get_for_client(&user.id).await {
            Ok(orders) => Json(orders).into_response(),
            Err(e) => error_response(e),
        }
    }

    async fn handle_get_for_store(State(state): State<AppState>, user: AuthUser) -> Response {
        if user.role != UserRole::Store {
            return forbidden_role();
        }
        match state.service.get_for_store(&user.id).await {
            Ok(orders) => Json(orders).into_response(),
            Err(e) => error_response(e),
        }
    }

    async fn handle_get_for_courier(State(state): State<AppState>, user: AuthUser) -> Response {
        if user.role != UserRole::Courier {
            return forbidden_role();
        }
        match state.service.get_for_courier(&user.id).await {
            Ok(orders) => Json(orders).into_response(),
            Err(e) => error_response(e),
        }
    }

    async fn handle_available_for_courier(
        State(state): State<AppState>,
        user: AuthUser,
    ) -> Response {
        if user.role != UserRole::Courier {
            return forbidden_role();
        }
        match state.service.get_available_for_courier().await {
            Ok(orders) => Json(orders).into_response(),
            Err(e) => error_response(e),
        }
    }

    async fn handle_transactions(State(state): State<AppState>, user: AuthUser) -> Response {
        if user.role != UserRole::Admin {
            return forbidden_role();
        }
        match state.service.get_transactions().await {
            Ok(entries) => Json(entries).into_response(),
            Err(e) => error_response(e),
        }
    }

    async fn handle_health() -> &'static str {
        "OK"
    }

    async fn handle_metrics(State(state): State<AppState>) -> Response {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();

        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&state.metrics.registry.gather(), &mut buffer) {
            error!("Failed to encode metrics: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response();
        }

        match String::from_utf8(buffer) {
            Ok(metrics_text) => (StatusCode::OK, metrics_text).into_response(),
            Err(e) => {
                error!("Failed to convert metrics to UTF-8: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Invalid metrics data").into_response()
            }
        }
    }
}

/// Waits for a shutdown signal (Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
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
