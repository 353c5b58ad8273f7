//! Foreground run loop.

use std::sync::Arc;

use tracing::info;

use crate::bootstrap::{ConfigLoader, bootstrap_with};
use crate::health::HealthReporter;
use crate::services::ServiceProvider;

use super::PROCESS_TARGET;
use super::errors::LaunchError;
use super::shutdown::ShutdownSignal;

/// Bootstraps the daemon, starts every service and serves until `signal`
/// fires. Services are then stopped in reverse order and the instance lock
/// released.
///
/// A service that fails to start stops the ones already running before the
/// error is returned.
///
/// # Errors
///
/// Returns [`LaunchError`] when bootstrap, a service start or the signal
/// listener fails.
pub fn run_daemon<P>(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    provider: P,
    signal: &dyn ShutdownSignal,
) -> Result<(), LaunchError>
where
    P: ServiceProvider,
{
    let mut daemon = bootstrap_with(loader, reporter, provider)?;
    if let Err(error) = daemon.start_all() {
        daemon.shutdown();
        return Err(error.into());
    }
    info!(
        target: PROCESS_TARGET,
        pid = daemon.guard().pid(),
        "daemon running"
    );
    let waited = signal.wait();
    let stopped = daemon.shutdown();
    info!(target: PROCESS_TARGET, stopped = stopped.len(), "daemon stopped");
    waited.map_err(LaunchError::from)
}
