//! The connd daemon.
//!
//! connd hosts three services: a connector to the native mDNS resolver
//! daemon, the network [arbiter](connd_arbiter) and the service
//! [discovery](connd_nsd) multiplexer. Bootstrap loads configuration through
//! [`connd_config`], installs structured telemetry and takes the
//! single-instance lock before any service starts. Services are started
//! through a [`ServiceProvider`] in dependency order and stopped in reverse
//! once a termination signal arrives.
//!
//! Health hooks report every lifecycle step so operators can see where a
//! start went wrong.

mod bootstrap;
mod health;
mod process;
mod services;
mod system;
mod telemetry;

pub use bootstrap::{BootstrapError, ConfigLoader, Daemon, SystemConfigLoader, bootstrap_with};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{
    GuardError, InstanceGuard, LaunchError, ShutdownError, ShutdownSignal, SystemShutdownSignal,
    run_daemon,
};
pub use services::{
    ManagedServices, ServiceKind, ServiceKindParseError, ServiceProvider, ServiceStartupError,
};
pub use system::{
    ArbiterInterfaces, LoggingBroadcastSink, LoggingDnsSink, LoggingStateObserver, RESOLVER_NAME,
    SystemServiceProvider,
};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
