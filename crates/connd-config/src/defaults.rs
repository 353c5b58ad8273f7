use std::env;
use std::path::PathBuf;

use camino::Utf8PathBuf;

#[cfg(unix)]
use dirs::runtime_dir;
#[cfg(unix)]
use libc::geteuid;

use crate::logging::LogFormat;
use crate::socket::SocketEndpoint;

/// Resolver TCP port used when Unix domain sockets are not available.
pub const DEFAULT_TCP_PORT: u16 = 5354;

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Idle debounce before the discovery daemon is stopped.
pub const DEFAULT_CLEANUP_DELAY_MS: u64 = 10_000;

/// Outstanding discovery operations per client.
pub const DEFAULT_MAX_REQUESTS_PER_CLIENT: usize = 10;

/// Linger grace period.
pub const DEFAULT_LINGER_DELAY_MS: u64 = 30_000;

/// Connector per-command timeout.
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 60_000;

/// Connector reconnect delay.
pub const DEFAULT_RECONNECT_BACKOFF_MS: u64 = 5_000;

/// Connector pending-command bound.
pub const DEFAULT_RESPONSE_QUEUE_CAPACITY: usize = 10;

/// Legacy network feature auto-restore delay.
pub const DEFAULT_RESTORE_DEFAULT_NETWORK_DELAY_MS: u64 = 60_000;

const RUNTIME_NAMESPACE: &str = "connd";

/// Default log filter expression.
#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

/// Default logging format.
#[must_use]
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Resolver endpoint used when none is configured.
#[must_use]
pub fn default_resolver_socket() -> SocketEndpoint {
    #[cfg(unix)]
    {
        let base = Utf8PathBuf::from_path_buf(default_runtime_directory())
            .unwrap_or_else(|_| Utf8PathBuf::from("/tmp").join(RUNTIME_NAMESPACE));
        SocketEndpoint::unix(base.join("mdnsd.sock"))
    }

    #[cfg(not(unix))]
    {
        SocketEndpoint::tcp("127.0.0.1", DEFAULT_TCP_PORT)
    }
}

/// `<XDG runtime>/connd`, or `<tmp>/connd/uid-N` when no runtime directory
/// exists.
#[must_use]
pub fn default_runtime_directory() -> PathBuf {
    #[cfg(unix)]
    {
        if let Some(mut dir) = runtime_dir() {
            dir.push(RUNTIME_NAMESPACE);
            return dir;
        }
        let mut dir = env::temp_dir();
        dir.push(RUNTIME_NAMESPACE);
        dir.push(user_namespace());
        dir
    }

    #[cfg(not(unix))]
    {
        let mut dir = env::temp_dir();
        dir.push(RUNTIME_NAMESPACE);
        dir
    }
}

#[cfg(unix)]
fn user_namespace() -> String {
    let uid = unsafe { geteuid() };
    format!("uid-{uid}")
}
