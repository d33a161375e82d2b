use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use vtest_common::platform::{DEFAULT_SHM_DIR, DEFAULT_SOCKET_PATH};
use vtest_protocol::commands::PutLength;

use crate::error::CoreError;

/// Top-level client configuration, loaded from vtest.toml.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VtestConfig {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub fence: FenceConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub protocol: ProtocolConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Renderer socket: a Unix socket path, or `host:port` for TCP
    #[serde(default = "default_socket")]
    pub socket: String,
    /// Shared-memory directory for the ring transport (None = plain stream)
    pub ring: Option<PathBuf>,
    /// Extra connection attempts after the first one fails
    #[serde(default)]
    pub connect_retries: u32,
    /// Delay between connection attempts
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Identifier announced to the renderer (None = process name)
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// How long a released buffer stays available for reuse
    #[serde(default = "default_retention_ms")]
    pub retention_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FenceConfig {
    /// Sleep between busy polls during a bounded fence wait
    #[serde(default = "default_poll_interval_us")]
    pub poll_interval_us: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Push the window rectangle to the renderer on every flush
    #[serde(default)]
    pub sync_coords: bool,
    /// Always read the frame back and present it locally
    #[serde(default)]
    pub always_readback: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Length declared in TRANSFER_PUT headers
    #[serde(default)]
    pub put_length: PutLengthMode,
}

/// Serializable mirror of [`PutLength`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PutLengthMode {
    #[default]
    #[serde(rename = "legacy")]
    Legacy,
    #[serde(rename = "words")]
    Words,
}

impl From<PutLengthMode> for PutLength {
    fn from(mode: PutLengthMode) -> Self {
        match mode {
            PutLengthMode::Legacy => PutLength::Legacy,
            PutLengthMode::Words => PutLength::Words,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            socket: default_socket(),
            ring: None,
            connect_retries: 0,
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            retention_ms: default_retention_ms(),
        }
    }
}

impl Default for FenceConfig {
    fn default() -> Self {
        Self {
            poll_interval_us: default_poll_interval_us(),
        }
    }
}

impl TransportConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl CacheConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_millis(self.retention_ms)
    }
}

impl FenceConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_micros(self.poll_interval_us)
    }
}

impl VtestConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, CoreError> {
        let config: VtestConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file if it exists, otherwise return defaults.
    pub fn load_or_default(path: &str) -> Self {
        Self::load(path).unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.transport.socket.is_empty() {
            return Err(CoreError::ConfigError("transport.socket is empty".to_string()));
        }
        if let Some(name) = &self.client.name {
            if name.is_empty() || name.contains('\0') {
                return Err(CoreError::ConfigError(format!(
                    "client.name must be non-empty and free of NUL bytes: {:?}",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Apply `VTEST_SOCK`, `VTEST_RING` and `VTEST_DT_OPTIONS` from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(sock) = lookup("VTEST_SOCK").filter(|s| !s.is_empty()) {
            self.transport.socket = sock;
        }

        if let Some(ring) = lookup("VTEST_RING") {
            self.transport.ring = match ring.as_str() {
                "" => self.transport.ring.take(),
                r if r.starts_with('0') => None,
                "1" => Some(PathBuf::from(DEFAULT_SHM_DIR)),
                dir => Some(PathBuf::from(dir)),
            };
        }

        if let Some(options) = lookup("VTEST_DT_OPTIONS") {
            for opt in options.split([',', ':', ' ']).filter(|o| !o.is_empty()) {
                match opt {
                    "sync_coords" => self.display.sync_coords = true,
                    "always_readback" => self.display.always_readback = true,
                    // Window-system specific switches belong to the presenter.
                    other => debug!(option = other, "display option left to the presenter"),
                }
            }
        }
    }
}

/// Returns the default config file path based on platform conventions.
/// Search order:
/// 1. System-wide config: `/etc/vtest/vtest.toml`
/// 2. Local fallback: `./vtest.toml`
pub fn default_config_path() -> String {
    let system_path = "/etc/vtest/vtest.toml";
    if std::path::Path::new(system_path).exists() {
        return system_path.to_string();
    }
    "vtest.toml".to_string()
}

fn default_socket() -> String {
    DEFAULT_SOCKET_PATH.to_string()
}

fn default_retry_delay_ms() -> u64 {
    100
}

fn default_retention_ms() -> u64 {
    1000
}

fn default_poll_interval_us() -> u64 {
    10
}
