use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::{
    BroadcastSink, CallbackEvent, ConnectivityBroadcast, ConnectivityProbe, DnsSink,
    LinkProperties, NetworkAgent, NetworkCallback, NetworkFactory, NetworkId, NetworkRequest,
    RequestId,
};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Callback recording every event in delivery order.
#[derive(Default)]
pub struct RecordingCallback {
    events: Mutex<Vec<(RequestId, CallbackEvent)>>,
}

impl RecordingCallback {
    /// Every event so far.
    pub fn events(&self) -> Vec<CallbackEvent> {
        lock(&self.events).iter().map(|(_, event)| event.clone()).collect()
    }

    /// Drains the events recorded so far.
    pub fn take(&self) -> Vec<CallbackEvent> {
        lock(&self.events)
            .drain(..)
            .map(|(_, event)| event)
            .collect()
    }
}

impl NetworkCallback for RecordingCallback {
    fn on_event(&self, request: RequestId, event: &CallbackEvent) {
        lock(&self.events).push((request, event.clone()));
    }
}

/// Broadcast sink recording every broadcast.
#[derive(Default)]
pub struct RecordingBroadcasts {
    sent: Mutex<Vec<ConnectivityBroadcast>>,
}

impl RecordingBroadcasts {
    /// Drains the broadcasts recorded so far.
    pub fn take(&self) -> Vec<ConnectivityBroadcast> {
        lock(&self.sent).drain(..).collect()
    }
}

impl BroadcastSink for RecordingBroadcasts {
    fn send(&self, broadcast: &ConnectivityBroadcast) {
        lock(&self.sent).push(broadcast.clone());
    }
}

/// One name server assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsChange {
    Default(Vec<IpAddr>),
    Pid(u32, Vec<IpAddr>),
}

/// DNS sink recording every assignment.
#[derive(Default)]
pub struct RecordingDns {
    changes: Mutex<Vec<DnsChange>>,
}

impl RecordingDns {
    /// Drains the assignments recorded so far.
    pub fn take(&self) -> Vec<DnsChange> {
        lock(&self.changes).drain(..).collect()
    }
}

impl DnsSink for RecordingDns {
    fn default_dns_changed(&self, servers: &[IpAddr]) {
        lock(&self.changes).push(DnsChange::Default(servers.to_vec()));
    }

    fn pid_dns_changed(&self, pid: u32, servers: &[IpAddr]) {
        lock(&self.changes).push(DnsChange::Pid(pid, servers.to_vec()));
    }
}

/// Probe recording which networks were probed.
#[derive(Default)]
pub struct RecordingProbe {
    started: Mutex<Vec<NetworkId>>,
}

impl RecordingProbe {
    /// Drains the probed networks.
    pub fn take(&self) -> Vec<NetworkId> {
        lock(&self.started).drain(..).collect()
    }
}

impl ConnectivityProbe for RecordingProbe {
    fn start_probe(&self, network: NetworkId, _link_properties: &LinkProperties) {
        lock(&self.started).push(network);
    }
}

/// Agent that agrees to teardown unless told to decline.
#[derive(Default)]
pub struct TestAgent {
    decline: AtomicBool,
    unwanted: Mutex<Vec<NetworkId>>,
    reconnects: Mutex<Vec<NetworkId>>,
    validations: Mutex<Vec<bool>>,
}

impl TestAgent {
    /// Declines every later teardown request.
    pub fn decline_teardown(&self) {
        self.decline.store(true, Ordering::SeqCst);
    }

    /// Number of teardown requests received.
    pub fn unwanted_count(&self) -> usize {
        lock(&self.unwanted).len()
    }

    /// Number of reconnect requests received.
    pub fn reconnect_count(&self) -> usize {
        lock(&self.reconnects).len()
    }

    /// Validation results reported so far.
    pub fn validations(&self) -> Vec<bool> {
        lock(&self.validations).clone()
    }
}

impl NetworkAgent for TestAgent {
    fn on_network_unwanted(&self, network: NetworkId) -> bool {
        lock(&self.unwanted).push(network);
        !self.decline.load(Ordering::SeqCst)
    }

    fn on_validation_status(&self, _network: NetworkId, validated: bool) {
        lock(&self.validations).push(validated);
    }

    fn on_reconnect_requested(&self, network: NetworkId) {
        lock(&self.reconnects).push(network);
    }
}

/// Call received by a [`RecordingFactory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactoryCall {
    Need(RequestId),
    Release(RequestId),
}

/// Factory recording need and release calls.
#[derive(Default)]
pub struct RecordingFactory {
    calls: Mutex<Vec<FactoryCall>>,
    refuse: AtomicBool,
}

impl RecordingFactory {
    /// Every call so far.
    pub fn calls(&self) -> Vec<FactoryCall> {
        lock(&self.calls).clone()
    }

    /// Refuses every later request through `accept_request`.
    pub fn refuse_requests(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }
}

impl NetworkFactory for RecordingFactory {
    fn need_network_for(&self, request: &NetworkRequest, _score: i32) {
        lock(&self.calls).push(FactoryCall::Need(request.id));
    }

    fn release_network_for(&self, request: &NetworkRequest) {
        lock(&self.calls).push(FactoryCall::Release(request.id));
    }

    fn accept_request(&self, _request: &NetworkRequest, _score: i32) -> bool {
        !self.refuse.load(Ordering::SeqCst)
    }
}

pub use FactoryCall::{Need, Release};
