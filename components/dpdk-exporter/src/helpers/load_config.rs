// Local crates
use crate::telemetry::{
    connection::{DEFAULT_MAX_CONNECT_ATTEMPTS, DEFAULT_SOCKET_PATH},
    transport::{DEFAULT_MAX_RESPONSE_SIZE, DEFAULT_READ_BUFFER_SIZE, FrameLimits},
};

// External crates
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::instrument;

/// Exporter configuration. Every field has a default, so an empty file (or no
/// file at all) yields a working setup pointed at the standard DPDK socket.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub general: GeneralConfig,
    pub telemetry: TelemetryConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default, deny_unknown_fields)]
pub struct GeneralConfig {
    /// Value of the `node_name` label on graph statistics.
    pub hostname: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    pub socket_path: PathBuf,
    pub max_connect_attempts: u32,
    pub connect_retry_delay_secs: u64,
    /// Per-read deadline, `0` disables it.
    pub read_timeout_secs: u64,
    pub read_buffer_size: usize,
    pub max_response_size: usize,
    pub poll_interval_secs: u64,
    pub include_virtsvc: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            max_connect_attempts: DEFAULT_MAX_CONNECT_ATTEMPTS,
            connect_retry_delay_secs: 10,
            read_timeout_secs: 10,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
            poll_interval_secs: 20,
            include_virtsvc: true,
        }
    }
}

impl TelemetryConfig {
    pub fn connect_retry_delay(&self) -> Duration {
        Duration::from_secs(self.connect_retry_delay_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn frame_limits(&self) -> FrameLimits {
        FrameLimits {
            read_buffer_size: self.read_buffer_size,
            max_response_size: self.max_response_size,
            read_timeout: (self.read_timeout_secs > 0)
                .then(|| Duration::from_secs(self.read_timeout_secs)),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 9064)),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    pub json: bool,
    /// Directory for a daily-rolling log file next to stdout output.
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            json: false,
            log_dir: None,
        }
    }
}

impl Config {
    /// Load and parse the configuration file
    #[instrument(
        name = "config_loader",
        target = "helpers::load_config",
        level = "trace",
        skip_all
    )]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        tracing::trace!(
            configuration_file_path = %path_ref.display(),
            "Loading DPDK exporter configuration file"
        );

        let config_str = fs::read_to_string(path_ref)
            .with_context(|| format!("Failed to read config file at {:?}", path_ref))?;
        let config = Self::from_toml(&config_str)
            .with_context(|| format!("Failed to parse TOML from {:?}", path_ref))?;

        tracing::trace!(
            configuration_file_path = %path_ref.display(),
            "DPDK exporter configuration file loaded successfully"
        );
        Ok(config)
    }

    /// Load `path` when given, otherwise fall back to defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(source: &str) -> Result<Self> {
        let config: Config = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let telemetry = &self.telemetry;
        anyhow::ensure!(
            telemetry.max_connect_attempts > 0,
            "telemetry.max_connect_attempts must be at least 1"
        );
        anyhow::ensure!(
            telemetry.read_buffer_size > 0,
            "telemetry.read_buffer_size must be greater than 0"
        );
        anyhow::ensure!(
            telemetry.max_response_size >= telemetry.read_buffer_size,
            "telemetry.max_response_size must not be smaller than telemetry.read_buffer_size"
        );
        anyhow::ensure!(
            telemetry.poll_interval_secs > 0,
            "telemetry.poll_interval_secs must be greater than 0"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(
            config.telemetry.socket_path,
            PathBuf::from("/var/run/dpdk/rte/dpdk_telemetry.v2")
        );
        assert_eq!(config.telemetry.max_connect_attempts, 5);
        assert_eq!(config.telemetry.poll_interval(), Duration::from_secs(20));
        assert_eq!(config.server.listen_addr.port(), 9064);
        assert!(config.telemetry.include_virtsvc);
        assert!(config.general.hostname.is_none());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::from_toml(
            r#"
            [telemetry]
            socket_path = "/tmp/dpdk.sock"
            poll_interval_secs = 5
            include_virtsvc = false

            [server]
            listen_addr = "127.0.0.1:9100"
            "#,
        )
        .unwrap();

        assert_eq!(config.telemetry.socket_path, PathBuf::from("/tmp/dpdk.sock"));
        assert_eq!(config.telemetry.poll_interval_secs, 5);
        assert!(!config.telemetry.include_virtsvc);
        assert_eq!(config.telemetry.connect_retry_delay_secs, 10);
        assert_eq!(config.server.listen_addr.port(), 9100);
    }

    #[test]
    fn zero_read_timeout_disables_deadline() {
        let config = Config::from_toml("[telemetry]\nread_timeout_secs = 0\n").unwrap();
        assert_eq!(config.telemetry.frame_limits().read_timeout, None);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::from_toml("[telemetry]\nsocket = \"/tmp/x\"\n").is_err());
    }

    #[test]
    fn zero_attempts_are_rejected() {
        assert!(Config::from_toml("[telemetry]\nmax_connect_attempts = 0\n").is_err());
    }

    #[test]
    fn shipped_sample_config_is_valid() {
        let config = Config::from_toml(include_str!("../../config/dpdk_exporter.toml")).unwrap();
        assert_eq!(config.telemetry.frame_limits(), FrameLimits::default());
        assert_eq!(config.server.listen_addr.port(), 9064);
    }
}
