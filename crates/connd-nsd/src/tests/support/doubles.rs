use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::{
    BackendError, ClientCallback, DiscoveryManager, InterfaceLookup, ListenerKey, ManagerListener,
    MdnsCommand, MdnsDaemon, NetId, NsdFailure, ServiceInfo, StateObserver,
};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One callback delivered to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    DiscoveryStarted(ListenerKey, String),
    DiscoveryFailed(ListenerKey, NsdFailure),
    Found(ListenerKey, ServiceInfo),
    Lost(ListenerKey, ServiceInfo),
    DiscoveryStopped(ListenerKey),
    StopDiscoveryFailed(ListenerKey, NsdFailure),
    Registered(ListenerKey, ServiceInfo),
    RegistrationFailed(ListenerKey, NsdFailure),
    Unregistered(ListenerKey),
    UnregistrationFailed(ListenerKey, NsdFailure),
    Resolved(ListenerKey, ServiceInfo),
    ResolutionFailed(ListenerKey, NsdFailure),
    ResolutionStopped(ListenerKey),
    StopResolutionFailed(ListenerKey, NsdFailure),
}

/// Client recording every callback in delivery order.
#[derive(Default)]
pub struct RecordingClient {
    events: Mutex<Vec<ClientEvent>>,
}

impl RecordingClient {
    /// Every event so far.
    pub fn events(&self) -> Vec<ClientEvent> {
        lock(&self.events).clone()
    }

    /// Drains the events recorded so far.
    pub fn take(&self) -> Vec<ClientEvent> {
        lock(&self.events).drain(..).collect()
    }

    fn push(&self, event: ClientEvent) {
        lock(&self.events).push(event);
    }
}

impl ClientCallback for RecordingClient {
    fn on_discover_services_started(&self, key: ListenerKey, service_type: &str) {
        self.push(ClientEvent::DiscoveryStarted(key, service_type.to_owned()));
    }

    fn on_discover_services_failed(&self, key: ListenerKey, failure: NsdFailure) {
        self.push(ClientEvent::DiscoveryFailed(key, failure));
    }

    fn on_service_found(&self, key: ListenerKey, info: &ServiceInfo) {
        self.push(ClientEvent::Found(key, info.clone()));
    }

    fn on_service_lost(&self, key: ListenerKey, info: &ServiceInfo) {
        self.push(ClientEvent::Lost(key, info.clone()));
    }

    fn on_stop_discovery_succeeded(&self, key: ListenerKey) {
        self.push(ClientEvent::DiscoveryStopped(key));
    }

    fn on_stop_discovery_failed(&self, key: ListenerKey, failure: NsdFailure) {
        self.push(ClientEvent::StopDiscoveryFailed(key, failure));
    }

    fn on_register_service_succeeded(&self, key: ListenerKey, info: &ServiceInfo) {
        self.push(ClientEvent::Registered(key, info.clone()));
    }

    fn on_register_service_failed(&self, key: ListenerKey, failure: NsdFailure) {
        self.push(ClientEvent::RegistrationFailed(key, failure));
    }

    fn on_unregister_service_succeeded(&self, key: ListenerKey) {
        self.push(ClientEvent::Unregistered(key));
    }

    fn on_unregister_service_failed(&self, key: ListenerKey, failure: NsdFailure) {
        self.push(ClientEvent::UnregistrationFailed(key, failure));
    }

    fn on_resolve_service_succeeded(&self, key: ListenerKey, info: &ServiceInfo) {
        self.push(ClientEvent::Resolved(key, info.clone()));
    }

    fn on_resolve_service_failed(&self, key: ListenerKey, failure: NsdFailure) {
        self.push(ClientEvent::ResolutionFailed(key, failure));
    }

    fn on_stop_resolution_succeeded(&self, key: ListenerKey) {
        self.push(ClientEvent::ResolutionStopped(key));
    }

    fn on_stop_resolution_failed(&self, key: ListenerKey, failure: NsdFailure) {
        self.push(ClientEvent::StopResolutionFailed(key, failure));
    }
}

/// Daemon recording every submitted command, accepted or not.
#[derive(Clone, Default)]
pub struct RecordingDaemon {
    submitted: Arc<Mutex<Vec<MdnsCommand>>>,
    reject: Arc<AtomicBool>,
}

impl RecordingDaemon {
    /// Drains the commands submitted so far.
    pub fn take(&self) -> Vec<MdnsCommand> {
        lock(&self.submitted).drain(..).collect()
    }

    /// Every command submitted so far.
    pub fn commands(&self) -> Vec<MdnsCommand> {
        lock(&self.submitted).clone()
    }

    /// Refuses every later command.
    pub fn reject_commands(&self) {
        self.reject.store(true, Ordering::SeqCst);
    }
}

impl MdnsDaemon for RecordingDaemon {
    fn submit(&mut self, command: MdnsCommand) -> Result<(), BackendError> {
        lock(&self.submitted).push(command);
        if self.reject.load(Ordering::SeqCst) {
            Err(BackendError::Rejected)
        } else {
            Ok(())
        }
    }
}

/// Call received by a [`RecordingManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerCall {
    StartMonitoring,
    StopMonitoring,
    Register(ManagerListener),
    Unregister(ManagerListener),
}

/// Discovery manager recording every call.
#[derive(Clone, Default)]
pub struct RecordingManager {
    calls: Arc<Mutex<Vec<ManagerCall>>>,
}

impl RecordingManager {
    /// Drains the calls so far.
    pub fn take(&self) -> Vec<ManagerCall> {
        lock(&self.calls).drain(..).collect()
    }
}

impl DiscoveryManager for RecordingManager {
    fn start_monitoring_sockets(&mut self) {
        lock(&self.calls).push(ManagerCall::StartMonitoring);
    }

    fn stop_monitoring_sockets(&mut self) {
        lock(&self.calls).push(ManagerCall::StopMonitoring);
    }

    fn register_listener(&mut self, listener: &ManagerListener) {
        lock(&self.calls).push(ManagerCall::Register(listener.clone()));
    }

    fn unregister_listener(&mut self, listener: &ManagerListener) {
        lock(&self.calls).push(ManagerCall::Unregister(listener.clone()));
    }
}

/// Observer recording every announced state.
#[derive(Default)]
pub struct RecordingObserver {
    states: Mutex<Vec<bool>>,
}

impl RecordingObserver {
    /// Every announcement so far.
    pub fn states(&self) -> Vec<bool> {
        lock(&self.states).clone()
    }
}

impl StateObserver for RecordingObserver {
    fn on_discovery_state_changed(&self, enabled: bool) {
        lock(&self.states).push(enabled);
    }
}

/// Fixed network to interface table.
#[derive(Default)]
pub struct FixedInterfaces(pub BTreeMap<NetId, u32>);

impl InterfaceLookup for FixedInterfaces {
    fn interface_index(&self, network: NetId) -> Option<u32> {
        self.0.get(&network).copied()
    }
}
