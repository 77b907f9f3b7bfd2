use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tracing::{info, warn};

use pandapwr_app::api::{router, AppState};
use pandapwr_app::{ChannelRegistry, IntegrationConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config_path = config_path_from(env::args().skip(1));
    let config = IntegrationConfig::load_with_path(config_path).context("load config failed")?;
    config.validate().context("config validation failed")?;

    let metrics = if config.metrics_enabled {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("metrics recorder install failed")?;
        Some(handle)
    } else {
        None
    };

    let registry = Arc::new(ChannelRegistry::new(
        config.client.clone(),
        config.poller.clone(),
    ));
    for entry in &config.devices {
        if let Err(err) = registry.setup_entry(entry.clone()).await {
            warn!(
                entry_id = %entry.entry_id,
                ip = %entry.ip_address,
                reason = err.code(),
                error = %err,
                "device setup failed"
            );
        }
    }
    if registry.device_count().await == 0 {
        warn!("no devices set up");
    }

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("bind {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "http surface listening");

    let app = router(AppState {
        registry: registry.clone(),
        metrics,
    });

    notify_ready();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    registry.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "ctrl-c listener failed");
    }
    info!("shutdown signal received");
}

/// Config path from `--config <path>`, `--config=<path>` or `-c <path>`.
fn config_path_from<I>(args: I) -> Option<String>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => return args.next(),
            other => {
                if let Some(path) = other.strip_prefix("--config=") {
                    return Some(path.to_string());
                }
            }
        }
    }
    None
}

/// Tells systemd the HTTP surface is accepting connections.
fn notify_ready() {
    #[cfg(target_os = "linux")]
    match sd_notify::notify(true, &[sd_notify::NotifyState::Ready]) {
        Ok(()) => tracing::debug!("systemd notified ready"),
        Err(err) => warn!(error = %err, "systemd ready notify failed"),
    };
}

#[cfg(test)]
mod tests {
    use super::config_path_from;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn config_path_forms() {
        assert_eq!(config_path_from(args(&["--config", "a.toml"])), Some("a.toml".to_string()));
        assert_eq!(config_path_from(args(&["-c", "b.json"])), Some("b.json".to_string()));
        assert_eq!(config_path_from(args(&["--config=c.toml"])), Some("c.toml".to_string()));
        assert_eq!(config_path_from(args(&["--verbose"])), None);
        assert_eq!(config_path_from(args(&["--config"])), None);
    }
}
