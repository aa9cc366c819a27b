//! # tableside
//!
//! Tableside hub binary: loads settings, wires the order service client and
//! serves the realtime hub until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tableside_core::{LogFormat, init_subscriber};
use tableside_server::HubServer;
use tableside_server::config::HubConfig;
use tableside_server::metrics::install_recorder;
use tableside_server::order::HttpOrderService;
use tableside_settings::{TablesideSettings, load_settings, load_settings_from_path};
use tracing::{info, warn};

/// Realtime restaurant connection hub.
#[derive(Parser, Debug)]
#[command(name = "tableside", about = "Realtime restaurant connection hub")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file. Defaults to `~/.tableside/settings.json`.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log filter used when `RUST_LOG` is unset (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    log_json: bool,

    /// Base URL of the order service (overrides settings).
    #[arg(long)]
    order_service_url: Option<String>,
}

impl Cli {
    fn load(&self) -> Result<TablesideSettings> {
        let mut settings = match &self.settings {
            Some(path) => load_settings_from_path(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => load_settings().context("Failed to load settings")?,
        };
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.log_json {
            settings.logging.format = LogFormat::Json;
        }
        if let Some(url) = &self.order_service_url {
            settings.orders.service_url.clone_from(url);
        }
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.load()?;
    init_subscriber(&settings.logging.level, settings.logging.format);

    let config = HubConfig::from_settings(&settings);
    info!(
        order_service = %config.order_service_url,
        queue_capacity = config.session.queue_capacity,
        "configuration loaded"
    );

    let orders = Arc::new(HttpOrderService::new(config.order_service_url.clone()));
    let mut server = HubServer::new(config, orders);
    match install_recorder() {
        Ok(handle) => server = server.with_metrics(handle),
        Err(e) => warn!(error = %e, "metrics recorder unavailable, /metrics disabled"),
    }

    let listener = server
        .bind()
        .await
        .with_context(|| format!("Failed to bind {}", server.config().bind_addr()))?;

    server
        .serve(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await
        .context("Server error")?;

    Ok(())
}
