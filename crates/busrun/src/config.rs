//! # Hosting configuration
//!
//! Process-level knobs shared by every hosted service. Loadable from a TOML
//! file; keys that are absent keep their defaults.
//!
//! ```toml
//! base_port = 2200
//! host = "localhost"
//! config_dir = "/etc/services"
//! call_timeout_secs = 30
//! stop_timeout_secs = 10
//! deployment_user = "svc-bus"
//! ```

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

pub const DEFAULT_BASE_PORT: u16 = 2200;
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub enum ConfigError {
    Io { path: String, error: String },
    Parse(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, error } => write!(f, "Failed to read {}: {}", path, error),
            Self::Parse(e) => write!(f, "Failed to parse hosting config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, PartialEq)]
pub struct HostingConfig {
    /// First port handed out by the port allocator.
    pub base_port: u16,
    /// Host component of every derived endpoint.
    pub host: String,
    /// Directory searched for `<Consumer>.config` override files.
    pub config_dir: PathBuf,
    /// Deadline for a single call into an isolation context.
    pub call_timeout: Duration,
    /// How long unloading waits for an isolation context to wind down.
    pub stop_timeout: Duration,
    /// Principal recorded by initial deployment. Falls back to the
    /// `USER`/`USERNAME` environment variables.
    pub deployment_user: Option<String>,
}

impl Default for HostingConfig {
    fn default() -> Self {
        Self {
            base_port: DEFAULT_BASE_PORT,
            host: DEFAULT_HOST.to_string(),
            config_dir: PathBuf::from("."),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            deployment_user: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    base_port: Option<u16>,
    host: Option<String>,
    config_dir: Option<PathBuf>,
    call_timeout_secs: Option<u64>,
    stop_timeout_secs: Option<u64>,
    deployment_user: Option<String>,
}

impl HostingConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let defaults = Self::default();

        Ok(Self {
            base_port: file.base_port.unwrap_or(defaults.base_port),
            host: file.host.unwrap_or(defaults.host),
            config_dir: file.config_dir.unwrap_or(defaults.config_dir),
            call_timeout: file
                .call_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.call_timeout),
            stop_timeout: file
                .stop_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.stop_timeout),
            deployment_user: file.deployment_user.or(defaults.deployment_user),
        })
    }

    pub fn with_base_port(mut self, port: u16) -> Self {
        self.base_port = port;
        self
    }

    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = dir.into();
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn with_deployment_user(mut self, user: impl Into<String>) -> Self {
        self.deployment_user = Some(user.into());
        self
    }

    /// The principal initial deployment runs as.
    pub fn deployment_principal(&self) -> String {
        self.deployment_user
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .or_else(|| std::env::var("USERNAME").ok())
            .unwrap_or_else(|| "unknown".to_string())
    }
}
