//! `HubServer`: the axum upgrade surface and the hub's background tasks.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::json;
use tableside_core::Role;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::broadcast::Broadcaster;
use crate::config::{HubConfig, SessionConfig};
use crate::delivery::DeliveryFeed;
use crate::errors::HubError;
use crate::health::{self, ConnectionsResponse, HealthResponse};
use crate::order::{OrderBridge, OrderService};
use crate::protocol::DeliveryUpdate;
use crate::registry::Registry;
use crate::router::Dispatcher;
use crate::session::{Credentials, SessionInfo, run_session};
use crate::shutdown::ShutdownCoordinator;

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    registry: Registry,
    dispatcher: Arc<Dispatcher>,
    deliveries: DeliveryFeed,
    session: SessionConfig,
    max_connections: usize,
    max_message_size: usize,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

/// Query string of a WebSocket upgrade.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeQuery {
    /// Room to join.
    pub room_id: Option<String>,
    /// Bearer token.
    pub token: Option<String>,
    /// Table access token.
    pub table_token: Option<String>,
}

/// The hub: registry, delivery feed and routes, served over axum.
pub struct HubServer {
    config: HubConfig,
    registry: Registry,
    broadcaster: Broadcaster,
    dispatcher: Arc<Dispatcher>,
    deliveries: DeliveryFeed,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

impl HubServer {
    /// Start the registry and delivery feed and build the route table.
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(config: HubConfig, orders: Arc<dyn OrderService>) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new());

        let (registry, registry_task) = Registry::spawn(shutdown.child_token());
        shutdown.track(registry_task);

        let broadcaster = Broadcaster::new(registry.clone());
        let (deliveries, feed_task) = DeliveryFeed::spawn(
            broadcaster.clone(),
            config.delivery_queue_capacity,
            shutdown.child_token(),
        );
        shutdown.track(feed_task);

        let bridge = Arc::new(OrderBridge::new(orders, config.order_timeout));
        let dispatcher = Arc::new(Dispatcher::with_default_routes(broadcaster.clone(), bridge));

        Self {
            config,
            registry,
            broadcaster,
            dispatcher,
            deliveries,
            shutdown,
            metrics: None,
            start_time: Instant::now(),
        }
    }

    /// Serve `/metrics` from this recorder handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: self.registry.clone(),
            dispatcher: Arc::clone(&self.dispatcher),
            deliveries: self.deliveries.clone(),
            session: self.config.session,
            max_connections: self.config.max_connections,
            max_message_size: self.config.max_message_size,
            metrics: self.metrics.clone(),
            start_time: self.start_time,
        };

        Router::new()
            .route("/ws/{role}/{id}", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/api/connections", get(connections_handler))
            .route("/api/deliveries", post(delivery_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind the configured address.
    pub async fn bind(&self) -> std::io::Result<TcpListener> {
        TcpListener::bind(self.config.bind_addr()).await
    }

    /// Serve until `signal` resolves or shutdown is requested, then close
    /// every session and join the background tasks.
    pub async fn serve(
        self,
        listener: TcpListener,
        signal: impl Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        info!(%addr, routes = ?self.dispatcher.routes(), "tableside hub listening");

        let trigger = Arc::clone(&self.shutdown);
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                tokio::select! {
                    () = signal => info!("shutdown signal received"),
                    () = trigger.cancelled() => {}
                }
                trigger.shutdown();
            })
            .await?;

        self.shutdown.graceful_shutdown(None).await;
        info!("tableside hub stopped");
        Ok(())
    }

    /// The connection registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Message-level fan-out.
    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Delivery feed producer.
    pub fn deliveries(&self) -> &DeliveryFeed {
        &self.deliveries
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &HubConfig {
        &self.config
    }
}

/// GET /ws/{role}/{id}
async fn ws_handler(
    Path((role, id)): Path<(String, String)>,
    Query(query): Query<UpgradeQuery>,
    State(state): State<AppState>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let Ok(role) = role.parse::<Role>() else {
        debug!(%role, "upgrade for unknown role");
        return StatusCode::NOT_FOUND.into_response();
    };
    match state.registry.live_count().await {
        Ok(live) if live < state.max_connections => {}
        Ok(live) => {
            warn!(live, max = state.max_connections, "connection limit reached, refusing upgrade");
            return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
        }
        Err(_) => return StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
    let ws = match upgrade {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let info = SessionInfo::new(id, role, query.room_id).with_credentials(Credentials {
        token: query.token,
        table_token: query.table_token,
    });
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| async move {
            let _ = run_session(socket, info, state.registry, state.dispatcher, state.session).await;
        })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Response {
    match state
        .registry
        .inspect(|s| (s.len(), s.room_count()))
        .await
    {
        Ok((connections, rooms)) => {
            Json::<HealthResponse>(health::health_check(state.start_time, connections, rooms))
                .into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// GET /api/connections
async fn connections_handler(State(state): State<AppState>) -> Response {
    match state.registry.role_counts().await {
        Ok(counts) => Json(ConnectionsResponse::from_counts(&counts)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// POST /api/deliveries
async fn delivery_handler(
    State(state): State<AppState>,
    Json(update): Json<DeliveryUpdate>,
) -> Response {
    match state.deliveries.publish(update) {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

fn error_response(error: &HubError) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "code": error.code(), "message": error.to_string() })),
    )
        .into_response()
}
