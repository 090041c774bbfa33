//! # tether
//!
//! JSON-RPC 2.0 over WebSocket server binary: loads settings, installs
//! logging, registers the demo handlers and serves until ctrl-c.

#![deny(unsafe_code)]

mod demo;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tether_rpc::{EmitterRegistry, MethodRegistry};
use tether_server::TetherServer;
use tether_settings::TetherSettings;
use tether_telemetry::TelemetryConfig;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Tether JSON-RPC WebSocket server.
#[derive(Parser, Debug)]
#[command(name = "tether", about = "JSON-RPC 2.0 over WebSocket server")]
struct Cli {
    /// Settings file (defaults to `~/.tether/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Route accepting WebSocket upgrades.
    #[arg(long)]
    path: Option<String>,
}

impl Cli {
    fn load_settings(&self) -> Result<TetherSettings> {
        let path = self.config.clone().unwrap_or_else(tether_settings::settings_path);
        let mut settings = tether_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;

        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(route) = &self.path {
            settings.server.path.clone_from(route);
        }
        settings
            .server
            .validate()
            .context("Invalid command-line overrides")?;
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.load_settings()?;

    tether_telemetry::init_telemetry(&TelemetryConfig::from(&settings.logging))
        .context("Failed to install tracing subscriber")?;

    let mut methods = MethodRegistry::new();
    let mut emitters = EmitterRegistry::new();
    demo::register(&mut methods, &mut emitters);
    let method_count = methods.len();
    let emitter_count = emitters.len();

    let server = TetherServer::new(settings.server, methods, emitters);
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;

    tracing::info!(
        path = %server.settings().path,
        "Tether listening on ws://{addr} ({method_count} methods, {emitter_count} emitters)"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let drained = server
        .shutdown()
        .graceful_shutdown(handle, Some(SHUTDOWN_TIMEOUT))
        .await;
    tracing::info!(drained, "Shutdown complete");
    Ok(())
}
