//! Runtime configuration for the hub.

use std::time::Duration;

use tableside_settings::TablesideSettings;

/// Keepalive deadlines for one session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeepaliveConfig {
    /// How often the outbound pump pings the peer, busy or not.
    pub ping_interval: Duration,
    /// How long the inbound pump waits for any frame (pongs included).
    pub read_timeout: Duration,
    /// Bound on one frame write.
    pub write_timeout: Duration,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(54),
            read_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(10),
        }
    }
}

/// Per-session settings handed to [`run_session`](crate::session::run_session).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Depth of the outbound queue.
    pub queue_capacity: usize,
    /// Keepalive triad.
    pub keepalive: KeepaliveConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            keepalive: KeepaliveConfig::default(),
        }
    }
}

/// Configuration for the hub server.
#[derive(Clone, Debug)]
pub struct HubConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Upgrades beyond this many live connections are refused.
    pub max_connections: usize,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Session queue and keepalive settings.
    pub session: SessionConfig,
    /// Depth of the delivery-update feed.
    pub delivery_queue_capacity: usize,
    /// Create-order endpoint.
    pub order_service_url: String,
    /// Deadline for one create-order call.
    pub order_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self::from_settings(&TablesideSettings::default())
    }
}

impl HubConfig {
    /// Build the runtime view of loaded settings.
    pub fn from_settings(settings: &TablesideSettings) -> Self {
        let ka = &settings.keepalive;
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            max_connections: settings.server.max_connections,
            max_message_size: settings.server.max_message_size,
            session: SessionConfig {
                queue_capacity: settings.hub.outbound_queue_capacity,
                keepalive: KeepaliveConfig {
                    ping_interval: Duration::from_millis(ka.ping_interval_ms),
                    read_timeout: Duration::from_millis(ka.read_timeout_ms),
                    write_timeout: Duration::from_millis(ka.write_timeout_ms),
                },
            },
            delivery_queue_capacity: settings.hub.delivery_queue_capacity,
            order_service_url: settings.orders.create_url(),
            order_timeout: Duration::from_millis(settings.orders.timeout_ms),
        }
    }

    /// `host:port` for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keepalive_triad_defaults() {
        let ka = KeepaliveConfig::default();
        assert_eq!(ka.ping_interval, Duration::from_secs(54));
        assert_eq!(ka.read_timeout, Duration::from_secs(60));
        assert_eq!(ka.write_timeout, Duration::from_secs(10));
        assert!(ka.ping_interval < ka.read_timeout);
    }

    #[test]
    fn defaults_match_settings_defaults() {
        let cfg = HubConfig::default();
        assert_eq!(cfg.session, SessionConfig::default());
        assert_eq!(cfg.delivery_queue_capacity, 100);
        assert_eq!(cfg.order_timeout, Duration::from_secs(10));
        assert_eq!(cfg.order_service_url, "http://127.0.0.1:8080/api/order");
    }

    #[test]
    fn from_settings_converts_millis() {
        let mut settings = TablesideSettings::default();
        settings.keepalive.ping_interval_ms = 1_500;
        settings.hub.outbound_queue_capacity = 8;
        let cfg = HubConfig::from_settings(&settings);
        assert_eq!(cfg.session.keepalive.ping_interval, Duration::from_millis(1_500));
        assert_eq!(cfg.session.queue_capacity, 8);
    }

    #[test]
    fn bind_addr_format() {
        let cfg = HubConfig {
            host: "127.0.0.1".into(),
            port: 9000,
            ..HubConfig::default()
        };
        assert_eq!(cfg.bind_addr(), "127.0.0.1:9000");
    }
}
