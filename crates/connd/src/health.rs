//! Structured health reporting for daemon lifecycle events.

use std::sync::Arc;

use connd_config::Config;

use crate::bootstrap::BootstrapError;
use crate::services::{ServiceKind, ServiceStartupError};

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer of daemon lifecycle events.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked before a service is started.
    fn service_starting(&self, kind: ServiceKind);

    /// Invoked after a service starts.
    fn service_ready(&self, kind: ServiceKind);

    /// Invoked when a service fails to start.
    fn service_failed(&self, error: &ServiceStartupError);

    /// Invoked after a service has been stopped.
    fn service_stopped(&self, kind: ServiceKind);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn service_starting(&self, kind: ServiceKind) {
        (**self).service_starting(kind);
    }

    fn service_ready(&self, kind: ServiceKind) {
        (**self).service_ready(kind);
    }

    fn service_failed(&self, error: &ServiceStartupError) {
        (**self).service_failed(error);
    }

    fn service_stopped(&self, kind: ServiceKind) {
        (**self).service_stopped(kind);
    }
}

/// Reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting daemon bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            resolver = %config.resolver_socket(),
            log_filter = %config.log_filter(),
            log_format = %config.log_format(),
            discovery_manager = config.use_discovery_manager,
            "daemon bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "daemon bootstrap failed"
        );
    }

    fn service_starting(&self, kind: ServiceKind) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "service_starting",
            service = %kind,
            "starting service"
        );
    }

    fn service_ready(&self, kind: ServiceKind) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "service_ready",
            service = %kind,
            "service ready"
        );
    }

    fn service_failed(&self, error: &ServiceStartupError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "service_failed",
            service = %error.kind,
            message = %error.message(),
            error = ?error,
            "service failed to start"
        );
    }

    fn service_stopped(&self, kind: ServiceKind) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "service_stopped",
            service = %kind,
            "service stopped"
        );
    }
}
