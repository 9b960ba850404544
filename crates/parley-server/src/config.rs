//! Server configuration.
//!
//! Configuration is layered, later sources winning:
//! - Built-in defaults
//! - The first TOML file found in the search path
//! - Environment variables (`PARLEY_PORT`, `PARLEY_LIMITS__MAX_CONNECTIONS`, ...)
//!
//! `--config <path>` replaces the search path with one file; the
//! environment still applies on top of it.

use ::config::{Environment, File, FileFormat};
use anyhow::{Context, Result};
use parley_core::{FilterConfig, GatewayConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::seed::SeedConfig;

/// Files searched by [`Config::load`], in order.
const CONFIG_PATHS: [&str; 3] = [
    "parley.toml",
    "/etc/parley/parley.toml",
    "~/.config/parley/parley.toml",
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

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Heartbeat configuration.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Notification dispatch.
    #[serde(default)]
    pub notifications: NotificationsConfig,

    /// Additions to the built-in content filter lists.
    #[serde(default)]
    pub filter: FilterConfig,

    /// Rooms, members and credentials loaded into the in-memory store.
    #[serde(default)]
    pub seed: SeedConfig,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path for the WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,
}

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Maximum WebSocket frame size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Maximum size of message content in bytes.
    #[serde(default = "default_max_content_bytes")]
    pub max_content_bytes: usize,

    /// Maximum number of rooms in one join request.
    #[serde(default = "default_max_rooms_per_join")]
    pub max_rooms_per_join: usize,

    /// Maximum length of an attachment URL.
    #[serde(default = "default_max_attachment_url_length")]
    pub max_attachment_url_length: usize,

    /// Outbound queue capacity per connection.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

/// Heartbeat configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Heartbeat interval advertised to clients, in milliseconds.
    #[serde(default = "default_heartbeat_interval")]
    pub interval_ms: u64,

    /// A connection silent for this long is closed, in milliseconds.
    #[serde(default = "default_heartbeat_timeout")]
    pub timeout_ms: u64,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// Notification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    /// Pending notification jobs before new ones are dropped.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Characters of message content copied into a notification.
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

// Default value functions
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

fn default_max_connections() -> usize {
    100_000
}

fn default_max_message_size() -> usize {
    64 * 1024
}

fn default_max_content_bytes() -> usize {
    GatewayConfig::default().max_content_bytes
}

fn default_max_rooms_per_join() -> usize {
    GatewayConfig::default().max_rooms_per_join
}

fn default_max_attachment_url_length() -> usize {
    GatewayConfig::default().max_attachment_url_length
}

fn default_outbound_buffer() -> usize {
    GatewayConfig::default().outbound_buffer
}

fn default_heartbeat_interval() -> u64 {
    30_000
}

fn default_heartbeat_timeout() -> u64 {
    60_000
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_queue_capacity() -> usize {
    GatewayConfig::default().notification_queue
}

fn default_preview_chars() -> usize {
    GatewayConfig::default().notification_preview_chars
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: TransportConfig::default(),
            limits: LimitsConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            metrics: MetricsConfig::default(),
            notifications: NotificationsConfig::default(),
            filter: FilterConfig::default(),
            seed: SeedConfig::default(),
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

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_message_size: default_max_message_size(),
            max_content_bytes: default_max_content_bytes(),
            max_rooms_per_join: default_max_rooms_per_join(),
            max_attachment_url_length: default_max_attachment_url_length(),
            outbound_buffer: default_outbound_buffer(),
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_heartbeat_interval(),
            timeout_ms: default_heartbeat_timeout(),
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

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            preview_chars: default_preview_chars(),
        }
    }
}

impl Config {
    /// Load configuration from the first file found, then the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed, or if
    /// an environment override has the wrong type.
    pub fn load() -> Result<Self> {
        let path = CONFIG_PATHS
            .iter()
            .map(|path| PathBuf::from(shellexpand::tilde(path).as_ref()))
            .find(|path| path.exists());

        Self::layered(path.as_deref(), None)
    }

    /// Load configuration from a specific file, then the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or cannot be parsed, or if an
    /// environment override has the wrong type.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }
        Self::layered(Some(path), None)
    }

    /// Merge an optional file with `PARLEY_*` variables.
    ///
    /// `env` replaces the process environment when given.
    fn layered(path: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }

        let env = Environment::with_prefix("PARLEY")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .source(env);

        let config = builder
            .add_source(env)
            .build()
            .context("Failed to assemble configuration")?;

        match path {
            Some(path) => config
                .try_deserialize()
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
            None => config
                .try_deserialize()
                .context("Failed to parse environment configuration"),
        }
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }

    /// Gateway settings derived from the limits, heartbeat and notification sections.
    #[must_use]
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            max_content_bytes: self.limits.max_content_bytes,
            max_rooms_per_join: self.limits.max_rooms_per_join,
            max_attachment_url_length: self.limits.max_attachment_url_length,
            outbound_buffer: self.limits.outbound_buffer,
            notification_queue: self.notifications.queue_capacity,
            notification_preview_chars: self.notifications.preview_chars,
            heartbeat_interval_ms: u32::try_from(self.heartbeat.interval_ms).unwrap_or(u32::MAX),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::Role;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.transport.websocket_path, "/ws");
        assert!(config.seed.rooms.is_empty());
    }

    #[test]
    fn test_config_bind_addr() {
        let config = Config::default();
        let addr = config.bind_addr().unwrap();
        assert_eq!(addr.port(), 8080);

        let bad = Config {
            host: "not a host".to_string(),
            ..Config::default()
        };
        assert!(bad.bind_addr().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9000

            [limits]
            max_connections = 50000
            max_rooms_per_join = 10

            [filter]
            extra_profanity = ["frak"]

            [[seed.rooms]]
            id = "general"
            name = "General"
            members = [
                { user_id = "alice", role = "owner" },
                { user_id = "bob" },
            ]

            [[seed.users]]
            token = "t-alice"
            user_id = "alice"
            handle = "ally"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.limits.max_connections, 50000);
        assert_eq!(config.limits.max_rooms_per_join, 10);
        assert_eq!(config.limits.max_message_size, 64 * 1024);
        assert_eq!(config.filter.extra_profanity, vec!["frak".to_string()]);

        let room = &config.seed.rooms[0];
        assert_eq!(room.members[0].role, Role::Owner);
        assert_eq!(room.members[1].role, Role::Member);
        assert_eq!(config.seed.users[0].handle.as_deref(), Some("ally"));
    }

    #[test]
    fn test_gateway_config() {
        let mut config = Config::default();
        config.limits.max_content_bytes = 512;
        config.notifications.preview_chars = 20;
        config.heartbeat.interval_ms = u64::MAX;

        let gateway = config.gateway_config();
        assert_eq!(gateway.max_content_bytes, 512);
        assert_eq!(gateway.notification_preview_chars, 20);
        assert_eq!(gateway.heartbeat_interval_ms, u32::MAX);
    }

    #[test]
    fn test_environment_overrides_file() {
        let path = std::env::temp_dir().join(format!("parley-config-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            r#"
                port = 9000

                [limits]
                max_connections = 10
            "#,
        )
        .unwrap();

        let env = HashMap::from([
            ("PARLEY_PORT".to_string(), "9100".to_string()),
            ("PARLEY_METRICS__ENABLED".to_string(), "false".to_string()),
            ("OTHER_PORT".to_string(), "1".to_string()),
        ]);

        let config = Config::layered(Some(&path), Some(env));
        std::fs::remove_file(&path).unwrap();
        let config = config.unwrap();

        assert_eq!(config.port, 9100);
        assert_eq!(config.limits.max_connections, 10);
        assert!(!config.metrics.enabled);
        assert_eq!(config.host, "127.0.0.1");
    }

    #[test]
    fn test_layered_defaults_without_sources() {
        let config = Config::layered(None, Some(HashMap::new())).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.heartbeat.timeout_ms, 60_000);
    }

    #[test]
    fn test_from_file_uses_layered_loader() {
        let path =
            std::env::temp_dir().join(format!("parley-from-file-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            r#"
                [transport]
                websocket_path = "/chat"

                [notifications]
                preview_chars = 40
            "#,
        )
        .unwrap();

        let from_file = Config::from_file(&path);
        let layered = Config::layered(Some(&path), None);
        std::fs::remove_file(&path).unwrap();

        let (from_file, layered) = (from_file.unwrap(), layered.unwrap());
        assert_eq!(from_file.transport.websocket_path, "/chat");
        assert_eq!(from_file.notifications.preview_chars, 40);
        assert_eq!(from_file.port, layered.port);
        assert_eq!(from_file.limits.max_connections, layered.limits.max_connections);
    }

    #[test]
    fn test_from_file_missing() {
        assert!(Config::from_file("/nonexistent/parley.toml").is_err());
    }
}
