//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`,
//! so a settings file only needs the keys it changes.

use serde::{Deserialize, Serialize};
use tableside_core::LogFormat;

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9000 },
///   "keepalive": { "pingIntervalMs": 25000, "readTimeoutMs": 30000 }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TablesideSettings {
    /// Listener settings.
    pub server: ServerSettings,
    /// Registry and queue sizing.
    pub hub: HubSettings,
    /// Keepalive deadlines.
    pub keepalive: KeepaliveSettings,
    /// Downstream order service.
    pub orders: OrderServiceSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl TablesideSettings {
    /// Reject combinations that cannot work at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.hub.outbound_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "hub.outboundQueueCapacity must be positive".into(),
            ));
        }
        if self.hub.delivery_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "hub.deliveryQueueCapacity must be positive".into(),
            ));
        }
        let ka = &self.keepalive;
        if ka.ping_interval_ms >= ka.read_timeout_ms {
            return Err(SettingsError::InvalidValue(format!(
                "keepalive.pingIntervalMs ({}) must be below keepalive.readTimeoutMs ({})",
                ka.ping_interval_ms, ka.read_timeout_ms
            )));
        }
        if ka.write_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "keepalive.writeTimeoutMs must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// HTTP/WebSocket listener settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` picks a free port).
    pub port: u16,
    /// Upgrades beyond this many live connections are refused.
    pub max_connections: usize,
    /// Largest accepted inbound frame in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8888,
            max_connections: 10_000,
            max_message_size: 64 * 1024,
        }
    }
}

/// Registry sizing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubSettings {
    /// Per-session outbound queue depth. A session whose queue is full when a
    /// message arrives is evicted.
    pub outbound_queue_capacity: usize,
    /// Depth of the delivery-update feed.
    pub delivery_queue_capacity: usize,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            outbound_queue_capacity: 256,
            delivery_queue_capacity: 100,
        }
    }
}

/// Keepalive triad, in milliseconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeepaliveSettings {
    /// Interval between server pings.
    pub ping_interval_ms: u64,
    /// A session with no inbound frame for this long is closed.
    pub read_timeout_ms: u64,
    /// Bound on a single frame write.
    pub write_timeout_ms: u64,
}

impl Default for KeepaliveSettings {
    fn default() -> Self {
        Self {
            ping_interval_ms: 54_000,
            read_timeout_ms: 60_000,
            write_timeout_ms: 10_000,
        }
    }
}

/// Order service client settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderServiceSettings {
    /// Base URL of the order service.
    pub service_url: String,
    /// Path of the create-order endpoint.
    pub create_path: String,
    /// Deadline for one create-order call.
    pub timeout_ms: u64,
}

impl Default for OrderServiceSettings {
    fn default() -> Self {
        Self {
            service_url: "http://127.0.0.1:8080".into(),
            create_path: "/api/order".into(),
            timeout_ms: 10_000,
        }
    }
}

impl OrderServiceSettings {
    /// Full create-order URL.
    pub fn create_url(&self) -> String {
        format!(
            "{}/{}",
            self.service_url.trim_end_matches('/'),
            self.create_path.trim_start_matches('/')
        )
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Compact,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
