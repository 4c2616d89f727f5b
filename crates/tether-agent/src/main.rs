//! # tether-agent
//!
//! tether daemon binary: loads settings, starts the HTTP/WebSocket server and
//! waits for a shutdown signal.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tether_core::ResourceId;
use tether_core::logging::{init_json_subscriber, init_subscriber};
use tether_server::{ServerConfig, TetherServer};
use tether_settings::TetherSettings;
use tracing::info;

/// tether daemon.
#[derive(Parser, Debug)]
#[command(name = "tether-agent", about = "Supervised WebSocket sessions for managed servers")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (defaults to `~/.tether/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log filter when `RUST_LOG` is unset (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,

    /// Create a resource with this id at startup. Repeatable.
    #[arg(long = "server", value_name = "ID")]
    servers: Vec<String>,
}

impl Cli {
    fn settings_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(tether_settings::settings_path)
    }

    /// Settings with CLI flags applied on top.
    fn server_config(&self, settings: &TetherSettings) -> ServerConfig {
        let mut config = ServerConfig::from_settings(settings);
        if let Some(host) = &self.host {
            config.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        config
    }

    fn log_level(&self, settings: &TetherSettings) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| settings.logging.level.clone())
    }
}

/// Resolve when Ctrl-C or (on unix) SIGTERM arrives.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("Failed to listen for ctrl-c")?,
            _ = terminate.recv() => info!("received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args.settings_path();
    let settings =
        tether_settings::load_settings_from_path(&settings_path).context("Failed to load settings")?;

    let level = args.log_level(&settings);
    if args.json_logs || settings.logging.json {
        init_json_subscriber(&level);
    } else {
        init_subscriber(&level);
    }

    let metrics_handle = tether_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let config = args.server_config(&settings);
    let shutdown_timeout = config.shutdown_timeout();
    let server = TetherServer::new(config, metrics_handle);
    for id in &args.servers {
        let _ = server.resources().create(ResourceId::from(id.as_str()));
    }

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    info!(
        "tether agent listening on http://{addr} ({} resources)",
        server.resources().len()
    );

    shutdown_signal().await?;

    info!("Shutting down...");
    server
        .shutdown()
        .graceful_shutdown(vec![handle], shutdown_timeout)
        .await;
    info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;

    #[test]
    fn cli_defaults_defer_to_settings() {
        let cli = Cli::parse_from(["tether-agent"]);
        let settings = TetherSettings::default();
        let config = cli.server_config(&settings);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(cli.log_level(&settings), "info");
        assert!(cli.servers.is_empty());
        assert!(!cli.json_logs);
    }

    #[test]
    fn cli_flags_override_settings() {
        let cli = Cli::parse_from([
            "tether-agent",
            "--host",
            "127.0.0.1",
            "--port",
            "0",
            "--log-level",
            "debug",
            "--server",
            "srv-1",
            "--server",
            "srv-2",
        ]);
        let config = cli.server_config(&TetherSettings::default());
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 0);
        assert_eq!(cli.log_level(&TetherSettings::default()), "debug");
        assert_eq!(cli.servers, vec!["srv-1", "srv-2"]);
    }

    #[test]
    fn explicit_config_path_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": 9191}}"#).unwrap();

        let cli = Cli::parse_from(["tether-agent", "--config", path.to_str().unwrap()]);
        assert_eq!(cli.settings_path(), path);
        let settings = tether_settings::load_settings_from_path(&cli.settings_path()).unwrap();
        assert_eq!(cli.server_config(&settings).port, 9191);
    }

    #[tokio::test]
    async fn server_graceful_shutdown() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let server = TetherServer::new(ServerConfig::default(), handle);
        let _ = server.resources().create(ResourceId::from("srv-1"));
        let (_, serve) = server.listen().await.unwrap();

        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            server
                .shutdown()
                .graceful_shutdown(vec![serve], std::time::Duration::from_secs(2)),
        )
        .await
        .expect("shutdown timed out");
        assert!(server.shutdown().is_shutting_down());
    }
}
