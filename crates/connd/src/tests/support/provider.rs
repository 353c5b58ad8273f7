//! Service provider that records calls and fails on request.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use connd_config::Config;

use crate::services::{ServiceKind, ServiceProvider, ServiceStartupError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderCall {
    Start(ServiceKind),
    Stop(ServiceKind),
}

#[derive(Clone, Default)]
pub struct RecordingServiceProvider {
    state: Arc<Mutex<ProviderState>>,
}

#[derive(Default)]
struct ProviderState {
    calls: Vec<ProviderCall>,
    failures: HashMap<ServiceKind, String>,
}

impl RecordingServiceProvider {
    fn lock(&self) -> MutexGuard<'_, ProviderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every start of `kind` fail until [`Self::recover`] is called.
    pub fn fail_on(&self, kind: ServiceKind, message: impl Into<String>) {
        self.lock().failures.insert(kind, message.into());
    }

    pub fn recover(&self, kind: ServiceKind) {
        self.lock().failures.remove(&kind);
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.lock().calls.clone()
    }

    pub fn starts(&self) -> Vec<ServiceKind> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ProviderCall::Start(kind) => Some(kind),
                ProviderCall::Stop(_) => None,
            })
            .collect()
    }

    pub fn stops(&self) -> Vec<ServiceKind> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ProviderCall::Stop(kind) => Some(kind),
                ProviderCall::Start(_) => None,
            })
            .collect()
    }
}

impl ServiceProvider for RecordingServiceProvider {
    fn start_service(
        &mut self,
        kind: ServiceKind,
        _config: &Config,
    ) -> Result<(), ServiceStartupError> {
        let mut state = self.lock();
        state.calls.push(ProviderCall::Start(kind));
        if let Some(message) = state.failures.get(&kind) {
            return Err(ServiceStartupError::new(kind, message.clone()));
        }
        Ok(())
    }

    fn stop_service(&mut self, kind: ServiceKind) {
        self.lock().calls.push(ProviderCall::Stop(kind));
    }
}
