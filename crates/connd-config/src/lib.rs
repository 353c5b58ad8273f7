//! Shared configuration for the connectivity daemon.
//!
//! Values are layered by `ortho_config`: built-in defaults, then an optional
//! TOML file (`--config-path` or `CONND_CONFIG_PATH`), then `CONND_*`
//! environment variables, then command-line flags.

mod attributes;
mod defaults;
mod logging;
mod runtime;
mod socket;

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use attributes::{
    NetworkAttributes, NetworkAttributesParseError, default_network_attributes,
};
pub use defaults::{
    DEFAULT_CLEANUP_DELAY_MS, DEFAULT_COMMAND_TIMEOUT_MS, DEFAULT_LINGER_DELAY_MS,
    DEFAULT_LOG_FILTER, DEFAULT_MAX_REQUESTS_PER_CLIENT, DEFAULT_RECONNECT_BACKOFF_MS,
    DEFAULT_RESPONSE_QUEUE_CAPACITY, DEFAULT_RESTORE_DEFAULT_NETWORK_DELAY_MS, DEFAULT_TCP_PORT,
    default_log_filter, default_log_filter_string, default_log_format, default_resolver_socket,
    default_runtime_directory,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use runtime::{RuntimePaths, RuntimePathsError};
pub use socket::{SocketEndpoint, SocketParseError};

/// Resolved daemon configuration.
#[derive(Debug, Clone, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "CONND")]
pub struct Config {
    /// Endpoint of the native mDNS resolver daemon.
    #[ortho_config(default = default_resolver_socket())]
    pub resolver_socket: SocketEndpoint,
    /// Directory for the lock and pid files. Derived when unset.
    pub runtime_dir: Option<Utf8PathBuf>,
    /// `tracing_subscriber::EnvFilter` expression.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Log output format.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// Idle period before the discovery daemon is stopped.
    #[ortho_config(default = DEFAULT_CLEANUP_DELAY_MS)]
    pub cleanup_delay_ms: u64,
    /// Outstanding discovery operations allowed per client.
    #[ortho_config(default = DEFAULT_MAX_REQUESTS_PER_CLIENT)]
    pub max_requests_per_client: usize,
    /// Route discovery and resolution through the multi-socket engine.
    #[ortho_config(default = false)]
    pub use_discovery_manager: bool,
    /// Grace period for a network that stopped winning any request.
    #[ortho_config(default = DEFAULT_LINGER_DELAY_MS)]
    pub linger_delay_ms: u64,
    /// Per-command timeout for the resolver connector.
    #[ortho_config(default = DEFAULT_COMMAND_TIMEOUT_MS)]
    pub command_timeout_ms: u64,
    /// Delay between resolver reconnect attempts.
    #[ortho_config(default = DEFAULT_RECONNECT_BACKOFF_MS)]
    pub reconnect_backoff_ms: u64,
    /// Pending-command bound of the connector response queue.
    #[ortho_config(default = DEFAULT_RESPONSE_QUEUE_CAPACITY)]
    pub response_queue_capacity: usize,
    /// Lifetime of a legacy network feature request before it is restored.
    #[ortho_config(default = DEFAULT_RESTORE_DEFAULT_NETWORK_DELAY_MS)]
    pub restore_default_network_delay_ms: u64,
    /// Allow only one default-capable network to stay up at a time.
    #[ortho_config(default = false)]
    pub single_default_mode: bool,
    /// Preferred legacy network type name, such as `wifi`.
    pub network_preference: Option<String>,
    /// Legacy network attribute table.
    #[ortho_config(skip_cli, default = default_network_attributes())]
    pub network_attributes: Vec<NetworkAttributes>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resolver_socket: default_resolver_socket(),
            runtime_dir: None,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            cleanup_delay_ms: DEFAULT_CLEANUP_DELAY_MS,
            max_requests_per_client: DEFAULT_MAX_REQUESTS_PER_CLIENT,
            use_discovery_manager: false,
            linger_delay_ms: DEFAULT_LINGER_DELAY_MS,
            command_timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
            reconnect_backoff_ms: DEFAULT_RECONNECT_BACKOFF_MS,
            response_queue_capacity: DEFAULT_RESPONSE_QUEUE_CAPACITY,
            restore_default_network_delay_ms: DEFAULT_RESTORE_DEFAULT_NETWORK_DELAY_MS,
            single_default_mode: false,
            network_preference: None,
            network_attributes: default_network_attributes(),
        }
    }
}

impl Config {
    /// Resolver daemon endpoint.
    #[must_use]
    pub fn resolver_socket(&self) -> &SocketEndpoint {
        &self.resolver_socket
    }

    /// Explicit runtime directory, when one was configured.
    #[must_use]
    pub fn runtime_dir(&self) -> Option<&Utf8Path> {
        self.runtime_dir.as_deref()
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Discovery daemon idle debounce.
    #[must_use]
    pub fn cleanup_delay(&self) -> Duration {
        Duration::from_millis(self.cleanup_delay_ms)
    }

    /// Linger grace period.
    #[must_use]
    pub fn linger_delay(&self) -> Duration {
        Duration::from_millis(self.linger_delay_ms)
    }

    /// Connector command timeout.
    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Connector reconnect delay.
    #[must_use]
    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    /// Legacy feature restore delay.
    #[must_use]
    pub fn restore_default_network_delay(&self) -> Duration {
        Duration::from_millis(self.restore_default_network_delay_ms)
    }

    /// Legacy attributes for the configured preference, when it names a
    /// known network type.
    #[must_use]
    pub fn preferred_network(&self) -> Option<&NetworkAttributes> {
        let wanted = self.network_preference.as_deref()?.trim();
        self.network_attributes
            .iter()
            .find(|attrs| attrs.name.eq_ignore_ascii_case(wanted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_documented_values() {
        let config = Config::default();
        assert_eq!(config.cleanup_delay(), Duration::from_secs(10));
        assert_eq!(config.command_timeout(), Duration::from_secs(60));
        assert_eq!(config.reconnect_backoff(), Duration::from_secs(5));
        assert_eq!(config.max_requests_per_client, 10);
        assert_eq!(config.response_queue_capacity, 10);
        assert_eq!(config.log_filter(), "info");
        assert_eq!(config.log_format(), LogFormat::Json);
        assert!(config.runtime_dir().is_none());
    }

    #[test]
    fn preference_resolves_case_insensitively() {
        let config = Config {
            network_preference: Some(" WiFi ".to_string()),
            ..Config::default()
        };
        let preferred = config.preferred_network().expect("wifi is in the default table");
        assert_eq!(preferred.name, "wifi");
    }

    #[test]
    fn unknown_preference_is_ignored() {
        let config = Config {
            network_preference: Some("carrier-pigeon".to_string()),
            ..Config::default()
        };
        assert!(config.preferred_network().is_none());
    }
}
