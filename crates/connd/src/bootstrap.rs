//! Daemon bootstrap orchestration.

use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;

use connd_config::{Config, RuntimePaths, RuntimePathsError};

use crate::health::HealthReporter;
use crate::process::{GuardError, InstanceGuard};
use crate::services::{ManagedServices, ServiceKind, ServiceProvider, ServiceStartupError};
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

/// Source of the daemon configuration.
pub trait ConfigLoader: Send + Sync {
    /// Loads the daemon configuration.
    ///
    /// # Errors
    ///
    /// Returns the layered loader's error when a source is invalid.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The runtime directory could not be prepared.
    #[error("failed to prepare runtime directory: {source}")]
    RuntimePaths {
        /// Underlying path error.
        #[source]
        source: RuntimePathsError,
    },
    /// Another daemon holds the lock, or the lock could not be taken.
    #[error("failed to acquire the daemon lock: {source}")]
    Guard {
        /// Underlying guard error.
        #[source]
        source: GuardError,
    },
}

/// A bootstrapped daemon holding the instance lock.
pub struct Daemon<P> {
    services: ManagedServices<P>,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
    guard: InstanceGuard,
}

impl<P> Daemon<P> {
    /// Resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        self.services.config()
    }

    /// Telemetry installed during bootstrap.
    #[must_use]
    pub const fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// The held single-instance guard.
    #[must_use]
    pub const fn guard(&self) -> &InstanceGuard {
        &self.guard
    }

    /// Services currently running, in start order.
    #[must_use]
    pub fn started_services(&self) -> &[ServiceKind] {
        self.services.started()
    }

    /// Mutable access to the service provider.
    pub fn provider_mut(&mut self) -> &mut P {
        self.services.provider_mut()
    }
}

impl<P> Daemon<P>
where
    P: ServiceProvider,
{
    /// Ensures `kind` is running, starting it and its dependencies on demand.
    ///
    /// # Errors
    ///
    /// Returns the [`ServiceStartupError`] reported by the provider.
    pub fn ensure_service(&mut self, kind: ServiceKind) -> Result<(), ServiceStartupError> {
        self.reporter.service_starting(kind);
        match self.services.ensure_started(kind) {
            Ok(()) => {
                self.reporter.service_ready(kind);
                Ok(())
            }
            Err(error) => {
                self.reporter.service_failed(&error);
                Err(error)
            }
        }
    }

    /// Starts every service in dependency order.
    ///
    /// # Errors
    ///
    /// Stops at the first [`ServiceStartupError`]; services already started
    /// keep running.
    pub fn start_all(&mut self) -> Result<(), ServiceStartupError> {
        for kind in ServiceKind::ALL {
            self.ensure_service(kind)?;
        }
        Ok(())
    }

    /// Stops all services in reverse start order and releases the lock.
    pub fn shutdown(mut self) -> Vec<ServiceKind> {
        let stopped = self.services.stop_all();
        for kind in &stopped {
            self.reporter.service_stopped(*kind);
        }
        stopped
    }
}

/// Bootstraps the daemon using the supplied collaborators.
///
/// Configuration is loaded first, then telemetry is installed and the
/// instance lock taken. No service is started.
///
/// # Errors
///
/// Returns [`BootstrapError`] for the first step that fails; the reporter
/// sees the same error.
pub fn bootstrap_with<P>(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    provider: P,
) -> Result<Daemon<P>, BootstrapError>
where
    P: ServiceProvider,
{
    reporter.bootstrap_starting();
    let fail = |error: BootstrapError| {
        reporter.bootstrap_failed(&error);
        error
    };

    let config = loader
        .load()
        .map_err(|source| fail(BootstrapError::Configuration { source }))?;
    let telemetry = telemetry::initialise(&config)
        .map_err(|source| fail(BootstrapError::Telemetry { source }))?;
    let paths = RuntimePaths::from_config(&config)
        .map_err(|source| fail(BootstrapError::RuntimePaths { source }))?;
    let guard =
        InstanceGuard::acquire(paths).map_err(|source| fail(BootstrapError::Guard { source }))?;

    reporter.bootstrap_succeeded(&config);
    Ok(Daemon {
        services: ManagedServices::new(config, provider),
        telemetry,
        reporter,
        guard,
    })
}
