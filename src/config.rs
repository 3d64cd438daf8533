//! Application configuration (SPEC_FULL.md "AMBIENT STACK / Configuration")
//!
//! TOML configuration loaded at startup. Resolution order mirrors the
//! teacher's `main.rs`: an `OCPP_CONFIG` env var pointing at a file, falling
//! back to a per-user config directory resolved via `dirs-next`. A missing or
//! unparseable file falls back to `AppConfig::default()` with a logged
//! warning rather than failing startup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration, deserialized directly from the TOML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub metrics: MetricsConfig,
    pub audit: AuditConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the station-facing WebSocket acceptor binds to.
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:9000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Heartbeat interval (seconds) handed to stations in BootNotification's
    /// reply; the watchdog deadline is `3 * this` (spec.md §4.3).
    pub heartbeat_interval_secs: u64,
    /// Minimum delay before an outbound command is transmitted (spec.md §4.3).
    pub outbound_delay_ms: u64,
    /// How long the outbound queue waits for a correlated reply before
    /// timing out and advancing (spec.md §4.3).
    pub outbound_reply_timeout_secs: u64,
    /// When set, StatusNotification transitions to `Preparing` queue a
    /// RemoteStartTransaction back to the station (spec.md §4.5 AutoRemoteStart).
    pub auto_remote_start: Option<AutoRemoteStartConfig>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 300,
            outbound_delay_ms: 1000,
            outbound_reply_timeout_secs: 30,
            auto_remote_start: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AutoRemoteStartConfig {
    pub id_tag: String,
    #[serde(default = "default_auto_remote_start_delay_ms")]
    pub delay_ms: u64,
}

fn default_auto_remote_start_delay_ms() -> u64 {
    2000
}

impl SessionConfig {
    pub fn outbound_delay(&self) -> Duration {
        Duration::from_millis(self.outbound_delay_ms)
    }

    pub fn outbound_reply_timeout(&self) -> Duration {
        Duration::from_secs(self.outbound_reply_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// When set, a Prometheus exposition listener binds here (SPEC_FULL.md
    /// "Metrics exposition"). Left unset, no metrics HTTP listener starts —
    /// the `metrics` facade calls are simply uncollected.
    pub listen_addr: Option<String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { listen_addr: None }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// When set, a newline-delimited-JSON audit sink is opened at this path
    /// (spec.md §6 "Audit sink").
    pub file_path: Option<PathBuf>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self { file_path: None }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            session: SessionConfig::default(),
            metrics: MetricsConfig::default(),
            audit: AuditConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads and parses the TOML file at `path`. Callers that want the
    /// teacher's "fall back to defaults on any error" behavior should match
    /// on the `Err` case themselves (see `main.rs`) rather than unwrap here,
    /// since the two failure paths (missing file vs malformed TOML) are
    /// worth logging differently.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config file {0:?}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("could not parse config file {0:?}: {1}")]
    Parse(PathBuf, toml::de::Error),
}

/// Per-user default config path, mirroring the teacher's `default_config_path`.
pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ocpp-central")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_md_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.session.heartbeat_interval_secs, 300);
        assert_eq!(cfg.session.outbound_delay(), Duration::from_secs(1));
        assert_eq!(cfg.session.outbound_reply_timeout(), Duration::from_secs(30));
        assert!(cfg.metrics.listen_addr.is_none());
        assert!(cfg.audit.file_path.is_none());
    }

    #[test]
    fn partial_toml_fills_remaining_fields_with_defaults() {
        let toml_text = r#"
            [server]
            listen_addr = "127.0.0.1:9000"

            [session]
            heartbeat_interval_secs = 60
        "#;
        let cfg: AppConfig = toml::from_str(toml_text).unwrap();
        assert_eq!(cfg.server.listen_addr, "127.0.0.1:9000");
        assert_eq!(cfg.session.heartbeat_interval_secs, 60);
        assert_eq!(cfg.session.outbound_delay_ms, 1000);
    }

    #[test]
    fn missing_file_yields_read_error() {
        let err = AppConfig::load(Path::new("/nonexistent/path/config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read(_, _)));
    }
}
