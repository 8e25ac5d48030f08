//! Server configuration.
//!
//! Sources, lowest precedence first:
//! - Built-in defaults
//! - TOML configuration file (explicit `--config`, or the first of
//!   `chorus.toml`, `/etc/chorus/chorus.toml`, `~/.config/chorus/chorus.toml`)
//! - Environment variables (`CHORUS_PORT`, `CHORUS_HUB__QUEUE_CAPACITY`, ...)
//! - Command line flags

use crate::cli::Cli;
use anyhow::{Context, Result};
use chorus_core::{FormatFailurePolicy, HistoryRetention, HubConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "CHORUS";

const CONFIG_PATHS: [&str; 3] = [
    "chorus.toml",
    "/etc/chorus/chorus.toml",
    "~/.config/chorus/chorus.toml",
];

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Hub tuning.
    #[serde(default)]
    pub hub: HubSettings,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Message template.
    #[serde(default)]
    pub template: TemplateConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path for the WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,
}

/// Hub tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubSettings {
    /// Per-session queue slots for live messages.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// History kept for replay: `"unbounded"` or `{ bounded = N }`.
    #[serde(default)]
    pub history: HistoryRetention,

    /// How long a connection waits for the hub to accept a request.
    #[serde(default)]
    pub accept_timeout_ms: Option<u64>,

    /// `"skip"` or `"abort"` when a message cannot be formatted.
    #[serde(default)]
    pub format_failure: FormatFailurePolicy,
}

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of concurrent connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Maximum inbound message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

/// Message template configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateConfig {
    /// HTML template file with `{{client_id}}` and `{{text}}` placeholders.
    /// The built-in template is used when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable the Prometheus exporter.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Exporter port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_queue_capacity() -> usize {
    chorus_core::hub::DEFAULT_QUEUE_CAPACITY
}

fn default_max_connections() -> usize {
    10_000
}

fn default_max_message_size() -> usize {
    chorus_protocol::MAX_MESSAGE_SIZE
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: TransportConfig::default(),
            hub: HubSettings::default(),
            limits: LimitsConfig::default(),
            template: TemplateConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket_path: default_ws_path(),
        }
    }
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            history: HistoryRetention::default(),
            accept_timeout_ms: None,
            format_failure: FormatFailurePolicy::default(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration for the given command line.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed, or an
    /// environment variable has the wrong type.
    pub fn load(cli: &Cli) -> Result<Self> {
        let environment = config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true);

        let mut config = Self::load_from(cli.config.as_deref(), environment)?;
        config.apply_cli(cli);
        Ok(config)
    }

    /// Layer an optional file and an environment source over the defaults.
    ///
    /// When `file` is `None` the default search paths are tried.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be read or deserialized.
    pub fn load_from(file: Option<&Path>, environment: config::Environment) -> Result<Self> {
        let mut builder = config::Config::builder();

        let file = match file {
            Some(path) => Some(path.to_path_buf()),
            None => find_config_file(),
        };
        if let Some(path) = &file {
            tracing::debug!(path = %path.display(), "Loading config file");
            builder = builder.add_source(config::File::from(path.as_path()).required(true));
        }

        let config = builder
            .add_source(environment)
            .build()
            .and_then(|c| c.try_deserialize::<Self>())
            .with_context(|| match &file {
                Some(path) => format!("Failed to load config from {}", path.display()),
                None => "Failed to load config from environment".to_string(),
            })?;

        Ok(config)
    }

    /// Load configuration from a single TOML file, ignoring other sources.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Render the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Apply command line overrides.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(host) = &cli.host {
            self.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.port = port;
        }
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a valid address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }

    /// Hub configuration derived from the `[hub]` section.
    #[must_use]
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            queue_capacity: self.hub.queue_capacity,
            history: self.hub.history,
            accept_timeout: self.hub.accept_timeout_ms.map(Duration::from_millis),
            format_failure: self.hub.format_failure,
        }
    }
}

fn find_config_file() -> Option<PathBuf> {
    CONFIG_PATHS
        .iter()
        .map(|path| PathBuf::from(shellexpand::tilde(path).as_ref()))
        .find(|path| path.exists())
}
