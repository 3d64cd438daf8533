//! OCPP 1.6-J Central System entry point.
//!
//! Reads configuration from `OCPP_CONFIG` (or the per-user default path),
//! installs structured logging and, if configured, a Prometheus metrics
//! listener and a newline-delimited-JSON audit sink, then runs the
//! station-facing WebSocket acceptor until a shutdown signal arrives.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use ocpp_central::acceptor::{Acceptor, AcceptorConfig};
use ocpp_central::config::AppConfig;
use ocpp_central::observer::{spawn_audit_forwarder, JsonlAuditSink, ObserverBus};
use ocpp_central::pipeline::{AutoRemoteStartConfig, PipelineCatalog};
use ocpp_central::session::Registry;
use ocpp_central::store::{InMemoryStore, Store};
use ocpp_central::support::shutdown::ShutdownCoordinator;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::var("OCPP_CONFIG")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| ocpp_central::default_config_path());

    let app_cfg = match AppConfig::load(&config_path) {
        Ok(cfg) => {
            init_tracing(&cfg.logging.level);
            info!(path = %config_path.display(), "configuration loaded");
            cfg
        }
        Err(e) => {
            init_tracing("info");
            warn!(error = %e, "failed to load config, using defaults");
            AppConfig::default()
        }
    };

    if let Some(metrics_addr) = &app_cfg.metrics.listen_addr {
        match metrics_addr.parse() {
            Ok(addr) => {
                if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new()
                    .with_http_listener(addr)
                    .install()
                {
                    error!(error = %e, "failed to install Prometheus metrics listener");
                } else {
                    info!(%metrics_addr, "Prometheus metrics listener installed");
                }
            }
            Err(e) => error!(%metrics_addr, error = %e, "invalid metrics listen_addr, skipping"),
        }
    }

    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let observer = ObserverBus::new();

    if let Some(path) = &app_cfg.audit.file_path {
        spawn_audit_forwarder(&observer, JsonlAuditSink::new(path.clone()));
        info!(path = %path.display(), "audit sink enabled");
    }

    let registry = Arc::new(Registry::new());
    let catalog = Arc::new(PipelineCatalog::build());

    let auto_remote_start = app_cfg.session.auto_remote_start.as_ref().map(|cfg| AutoRemoteStartConfig {
        id_tag: cfg.id_tag.clone(),
        delay: Duration::from_millis(cfg.delay_ms),
    });

    let shutdown = ShutdownCoordinator::new(30);
    let shutdown_signal = shutdown.signal();
    shutdown.start_signal_listener();

    let acceptor_config = AcceptorConfig {
        listen_addr: app_cfg.server.listen_addr.clone(),
        heartbeat_interval_secs: app_cfg.session.heartbeat_interval_secs,
        outbound_delay: app_cfg.session.outbound_delay(),
        outbound_reply_timeout: app_cfg.session.outbound_reply_timeout(),
        auto_remote_start,
    };

    let acceptor = Arc::new(Acceptor::new(
        acceptor_config,
        registry.clone(),
        store.clone(),
        observer.clone(),
        catalog.clone(),
        shutdown_signal.clone(),
    ));

    info!("OCPP central system starting");
    if let Err(e) = acceptor.run().await {
        error!(error = %e, "acceptor exited with error");
        return Err(Box::new(e));
    }

    info!("OCPP central system shutdown complete");
    Ok(())
}

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();
}
