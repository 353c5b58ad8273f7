//! Health reporter that records lifecycle events.

use std::sync::{Mutex, PoisonError};

use connd_config::Config;

use crate::bootstrap::BootstrapError;
use crate::health::HealthReporter;
use crate::services::{ServiceKind, ServiceStartupError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    BootstrapStarting,
    BootstrapSucceeded,
    BootstrapFailed(String),
    ServiceStarting(ServiceKind),
    ServiceReady(ServiceKind),
    ServiceFailed { kind: ServiceKind, message: String },
    ServiceStopped(ServiceKind),
}

#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn service_starting(&self, kind: ServiceKind) {
        self.record(HealthEvent::ServiceStarting(kind));
    }

    fn service_ready(&self, kind: ServiceKind) {
        self.record(HealthEvent::ServiceReady(kind));
    }

    fn service_failed(&self, error: &ServiceStartupError) {
        self.record(HealthEvent::ServiceFailed {
            kind: error.kind,
            message: error.message().to_owned(),
        });
    }

    fn service_stopped(&self, kind: ServiceKind) {
        self.record(HealthEvent::ServiceStopped(kind));
    }
}
