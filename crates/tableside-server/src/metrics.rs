//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Call once at startup,
/// before any metric is recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

// Metric name constants to avoid typos across modules.

/// WebSocket sessions opened (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket sessions closed (counter, labels: reason).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Live WebSocket sessions (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Sessions evicted for a full outbound queue (counter).
pub const WS_BROADCAST_EVICTIONS_TOTAL: &str = "ws_broadcast_evictions_total";
/// Inbound frames dropped as undecodable (counter).
pub const WS_DECODE_ERRORS_TOTAL: &str = "ws_decode_errors_total";
/// Inbound messages dispatched (counter, labels: type).
pub const WS_MESSAGES_DISPATCHED_TOTAL: &str = "ws_messages_dispatched_total";
/// Direct orders bridged to the order service (counter, labels: outcome).
pub const ORDERS_BRIDGED_TOTAL: &str = "orders_bridged_total";
/// Order service call latency (histogram).
pub const ORDER_SERVICE_DURATION_SECONDS: &str = "order_service_duration_seconds";
