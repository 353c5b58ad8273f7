//! Arbitration engine: owns every network record and request and decides
//! which network serves which request.
//!
//! The engine is a plain state machine. Every mutating call takes the
//! current `Instant` so timers can be driven deterministically; the
//! [`crate::service`] module runs it on a worker thread.

mod dns;
mod factories;
mod legacy;
mod rematch;
mod record;

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use connd_actor::TimerQueue;
use connd_config::{Config, NetworkAttributes};
use tracing::{debug, info, warn};

pub use self::factories::FactoryRegistration;
pub use self::record::AgentRegistration;
use self::factories::FactoryEntry;
use self::record::{NetworkRecord, RequestEntry};
use crate::callback::{
    BroadcastSink, CallbackEvent, ConnectivityBroadcast, BroadcastNetwork, DnsSink,
    NetworkCallback, NullCallback,
};
use crate::error::RequestError;
use crate::legacy::LegacyTable;
use crate::network::{
    Lifecycle, LinkProperties, NetworkCapabilities, NetworkId, NetworkState,
    ProbeResult,
};
use crate::provider::{ConnectivityProbe, FactoryId, ProviderId};
use crate::request::{NetworkRequest, Owner, RequestId, RequestKind, prepare_request};
use crate::snapshot::{ArbiterSnapshot, FactorySnapshot, NetworkSnapshot, RequestSnapshot};

pub(crate) const ENGINE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::engine");

/// Tunables of the arbitration engine.
#[derive(Debug, Clone)]
pub struct ArbiterSettings {
    /// Grace period a network lingers after losing its last request.
    pub linger_delay: Duration,
    /// Lifetime of a legacy feature request before it is restored.
    pub restore_delay: Duration,
    /// Tear down lower priority default-capable networks.
    pub single_default_mode: bool,
    /// Preferred legacy network type for default traffic.
    pub network_preference: Option<i32>,
    /// Legacy attributes table.
    pub attributes: Vec<NetworkAttributes>,
}

impl ArbiterSettings {
    /// Derives the settings from the daemon configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            linger_delay: config.linger_delay(),
            restore_delay: config.restore_default_network_delay(),
            single_default_mode: config.single_default_mode,
            network_preference: config
                .preferred_network()
                .filter(|row| row.is_default())
                .map(|row| row.network_type),
            attributes: config.network_attributes.clone(),
        }
    }
}

/// Allocator for identifiers handed to callers before their message
/// reaches the worker.
#[derive(Debug)]
pub struct Identifiers {
    network: AtomicU32,
    request: AtomicU32,
    factory: AtomicU32,
}

impl Default for Identifiers {
    fn default() -> Self {
        Self {
            network: AtomicU32::new(NetworkId::FIRST),
            request: AtomicU32::new(RequestId::DEFAULT.get() + 1),
            factory: AtomicU32::new(1),
        }
    }
}

impl Identifiers {
    /// Allocates a network identifier.
    pub fn next_network(&self) -> NetworkId {
        NetworkId::new(self.network.fetch_add(1, Ordering::Relaxed))
    }

    /// Allocates a request identifier.
    pub fn next_request(&self) -> RequestId {
        RequestId::new(self.request.fetch_add(1, Ordering::Relaxed))
    }

    /// Allocates a factory identifier.
    pub fn next_factory(&self) -> FactoryId {
        FactoryId(self.factory.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKey {
    Linger(NetworkId),
    RequestTimeout(RequestId),
    RestoreFeature(RequestId),
}

pub(crate) struct FeatureUser {
    pub(crate) owner: Owner,
    pub(crate) network_type: i32,
    pub(crate) feature: String,
    pub(crate) request: RequestId,
}

/// The arbitration state machine.
pub struct Arbiter {
    settings: ArbiterSettings,
    legacy: LegacyTable,
    ids: Arc<Identifiers>,
    probe: Arc<dyn ConnectivityProbe>,
    broadcasts: Arc<dyn BroadcastSink>,
    dns: Arc<dyn DnsSink>,
    networks: BTreeMap<NetworkId, NetworkRecord>,
    requests: BTreeMap<RequestId, RequestEntry>,
    factories: BTreeMap<FactoryId, FactoryEntry>,
    factory_needs: BTreeSet<(FactoryId, RequestId)>,
    feature_users: Vec<FeatureUser>,
    timers: TimerQueue<TimerKey, TimerKey>,
    preference: Option<i32>,
    current_default: Option<BroadcastNetwork>,
    failover_pending: bool,
    system_ready: bool,
    initial_broadcast: Option<ConnectivityBroadcast>,
    default_dns: Vec<IpAddr>,
    pid_dns: BTreeMap<u32, Vec<IpAddr>>,
}

impl Arbiter {
    /// Creates an engine holding only the default request.
    pub fn new(
        settings: ArbiterSettings,
        probe: Arc<dyn ConnectivityProbe>,
        broadcasts: Arc<dyn BroadcastSink>,
        dns: Arc<dyn DnsSink>,
    ) -> Self {
        let legacy = LegacyTable::new(settings.attributes.clone());
        let preference = settings
            .network_preference
            .filter(|network_type| legacy.is_default(*network_type));
        let mut requests = BTreeMap::new();
        let default = NetworkRequest {
            id: RequestId::DEFAULT,
            kind: RequestKind::Default,
            capabilities: NetworkRequest::default_capabilities(),
            legacy_type: None,
        };
        requests.insert(
            RequestId::DEFAULT,
            RequestEntry::new(default, Owner::system(), Arc::new(NullCallback)),
        );
        Self {
            settings,
            legacy,
            ids: Arc::new(Identifiers::default()),
            probe,
            broadcasts,
            dns,
            networks: BTreeMap::new(),
            requests,
            factories: BTreeMap::new(),
            factory_needs: BTreeSet::new(),
            feature_users: Vec::new(),
            timers: TimerQueue::new(),
            preference,
            current_default: None,
            failover_pending: false,
            system_ready: false,
            initial_broadcast: None,
            default_dns: Vec::new(),
            pid_dns: BTreeMap::new(),
        }
    }

    /// Identifier allocator shared with handles.
    pub fn ids(&self) -> Arc<Identifiers> {
        Arc::clone(&self.ids)
    }

    /// Network serving the default request.
    pub fn active_network(&self) -> Option<NetworkId> {
        self.requests
            .get(&RequestId::DEFAULT)
            .and_then(|entry| entry.satisfier)
    }

    /// Network currently serving `request`.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::UnknownRequest`] when no such request is
    /// filed.
    pub fn network_for_request(&self, request: RequestId) -> Result<Option<NetworkId>, RequestError> {
        self.requests
            .get(&request)
            .map(|entry| entry.satisfier)
            .ok_or(RequestError::UnknownRequest { request })
    }

    /// Link properties of `network`, if registered.
    pub fn link_properties(&self, network: NetworkId) -> Option<&LinkProperties> {
        self.networks.get(&network).map(|record| &record.link_properties)
    }

    /// Lifecycle of `network`, if registered.
    pub fn lifecycle(&self, network: NetworkId) -> Option<Lifecycle> {
        self.networks.get(&network).map(|record| record.lifecycle)
    }

    // ---- provider side -------------------------------------------------

    /// Registers a network announced by a provider.
    pub fn register_agent(&mut self, network: NetworkId, registration: AgentRegistration, now: Instant) {
        let initial_state = registration.info.state;
        info!(
            target: ENGINE_TARGET,
            network = %network,
            provider = %registration.provider,
            network_type = %registration.info.type_name,
            score = registration.score,
            "network registered"
        );
        let mut record = NetworkRecord::new(network, registration);
        record.info.state = NetworkState::Connecting;
        self.networks.insert(network, record);
        if initial_state != NetworkState::Connecting {
            self.update_network_info(network, initial_state, None, now);
        }
    }

    /// Applies a capability push from a provider. Probe-owned bits are
    /// kept as the engine last set them.
    pub fn update_capabilities(&mut self, network: NetworkId, capabilities: NetworkCapabilities, now: Instant) {
        let Some(record) = self.networks.get_mut(&network) else {
            debug!(target: ENGINE_TARGET, network = %network, "capabilities for unknown network");
            return;
        };
        let capabilities = record.with_probe_bits(capabilities);
        if capabilities == record.capabilities {
            return;
        }
        record.capabilities = capabilities;
        if record.lifecycle.is_eligible() {
            self.notify_capabilities(network);
            self.rematch(now);
        }
    }

    /// Applies a link-properties push from a provider.
    pub fn update_link_properties(&mut self, network: NetworkId, link_properties: LinkProperties) {
        let Some(record) = self.networks.get_mut(&network) else {
            return;
        };
        if record.link_properties == link_properties {
            return;
        }
        record.link_properties = link_properties.clone();
        if !record.lifecycle.is_eligible() {
            return;
        }
        let event = CallbackEvent::LinkPropertiesChanged {
            network,
            link_properties,
        };
        for entry in self.requests.values() {
            if entry.pairs.contains_key(&network) {
                entry.notify(&event);
            }
        }
        self.sync_dns();
    }

    /// Applies a score push from a provider.
    pub fn update_score(&mut self, network: NetworkId, score: i32, now: Instant) {
        let Some(record) = self.networks.get_mut(&network) else {
            return;
        };
        if record.score == score {
            return;
        }
        debug!(target: ENGINE_TARGET, network = %network, from = record.score, to = score, "score changed");
        record.score = score;
        if record.lifecycle.is_eligible() {
            self.rematch(now);
        }
    }

    /// Applies a link-layer state change from a provider.
    pub fn update_network_info(
        &mut self,
        network: NetworkId,
        state: NetworkState,
        reason: Option<String>,
        now: Instant,
    ) {
        let Some(record) = self.networks.get_mut(&network) else {
            debug!(target: ENGINE_TARGET, network = %network, %state, "state for unknown network");
            return;
        };
        record.info.reason = reason;
        match state {
            NetworkState::Connecting => {
                record.info.state = state;
            }
            NetworkState::Connected if record.lifecycle == Lifecycle::Connecting => {
                record.info.state = state;
                if record.misc.skip_validation {
                    record.lifecycle = Lifecycle::Connected;
                } else {
                    record.lifecycle = Lifecycle::Validating;
                    self.probe.start_probe(network, &record.link_properties);
                }
                info!(target: ENGINE_TARGET, network = %network, lifecycle = %record.lifecycle, "network connected");
                self.enforce_single_default(network, now);
                self.rematch(now);
            }
            NetworkState::Connected => {
                record.info.state = state;
                if record.suspended {
                    record.suspended = false;
                    info!(target: ENGINE_TARGET, network = %network, "network resumed");
                }
            }
            NetworkState::Suspended => {
                record.info.state = state;
                if record.lifecycle.is_eligible() {
                    record.suspended = true;
                    info!(target: ENGINE_TARGET, network = %network, "network suspended");
                }
            }
            NetworkState::Failed if record.lifecycle == Lifecycle::Connecting => {
                record.info.state = state;
                record.lifecycle = Lifecycle::Failed;
                self.connection_failed(network, now);
            }
            NetworkState::Disconnected | NetworkState::Failed => {
                record.info.state = state;
                self.network_gone(network, now);
            }
        }
    }

    /// Applies the outcome of a connectivity probe.
    pub fn probe_completed(&mut self, network: NetworkId, result: ProbeResult, now: Instant) {
        let Some(record) = self.networks.get_mut(&network) else {
            return;
        };
        if !record.lifecycle.is_eligible() {
            return;
        }
        record.last_validated = result == ProbeResult::Validated;
        record.ever_validated |= record.last_validated;
        record.captive_portal = result == ProbeResult::CaptivePortal;
        if record.lifecycle == Lifecycle::Validating {
            record.lifecycle = Lifecycle::Connected;
        }
        info!(target: ENGINE_TARGET, network = %network, %result, "probe completed");
        record.agent.on_validation_status(network, record.last_validated);
        let capabilities = record.with_probe_bits(record.capabilities.clone());
        if capabilities != record.capabilities {
            record.capabilities = capabilities;
            self.notify_capabilities(network);
        }
        self.rematch(now);
    }

    /// Re-runs the probe when a caller's view of connectivity disagrees
    /// with the last probe result.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::UnknownNetwork`] for unregistered networks.
    pub fn report_network_connectivity(
        &mut self,
        network: NetworkId,
        has_connectivity: bool,
    ) -> Result<(), RequestError> {
        let record = self
            .networks
            .get(&network)
            .ok_or(RequestError::UnknownNetwork { network })?;
        if !record.lifecycle.is_eligible() || record.last_validated == has_connectivity {
            return Ok(());
        }
        info!(target: ENGINE_TARGET, network = %network, has_connectivity, "re-evaluating network");
        self.probe.start_probe(network, &record.link_properties);
        Ok(())
    }

    /// Disconnects every network and factory registered by `provider`.
    pub fn provider_died(&mut self, provider: ProviderId, now: Instant) {
        warn!(target: ENGINE_TARGET, provider = %provider, "provider died");
        let owned: Vec<NetworkId> = self
            .networks
            .values()
            .filter(|record| record.provider == provider)
            .map(|record| record.id)
            .collect();
        for network in owned {
            self.network_gone(network, now);
        }
        let factories: Vec<FactoryId> = self
            .factories
            .iter()
            .filter(|(_, entry)| entry.provider == provider)
            .map(|(id, _)| *id)
            .collect();
        for factory in factories {
            self.factories.remove(&factory);
            self.factory_needs.retain(|(owner, _)| *owner != factory);
        }
    }

    // ---- request side --------------------------------------------------

    /// Files a keep-alive request.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::MutableCapability`] when `capabilities`
    /// names a probe-owned capability.
    pub fn request_network(
        &mut self,
        request: RequestId,
        capabilities: NetworkCapabilities,
        callback: Arc<dyn NetworkCallback>,
        owner: Owner,
        timeout: Option<Duration>,
        now: Instant,
    ) -> Result<(), RequestError> {
        let capabilities = prepare_request(capabilities)?;
        self.file_request(request, RequestKind::Request, capabilities, None, callback, owner);
        if let Some(timeout) = timeout {
            let key = TimerKey::RequestTimeout(request);
            self.timers.schedule(key, now + timeout, key);
        }
        self.rematch(now);
        Ok(())
    }

    /// Files a listen that observes every matching network.
    pub fn listen_for_networks(
        &mut self,
        request: RequestId,
        capabilities: NetworkCapabilities,
        callback: Arc<dyn NetworkCallback>,
        owner: Owner,
        now: Instant,
    ) {
        self.file_request(request, RequestKind::Listen, capabilities, None, callback, owner);
        self.rematch(now);
    }

    /// Files a request that follows the default network.
    pub fn track_default_network(
        &mut self,
        request: RequestId,
        callback: Arc<dyn NetworkCallback>,
        owner: Owner,
        now: Instant,
    ) {
        self.file_request(
            request,
            RequestKind::TrackDefault,
            NetworkRequest::default_capabilities(),
            None,
            callback,
            owner,
        );
        self.rematch(now);
    }

    fn file_request(
        &mut self,
        id: RequestId,
        kind: RequestKind,
        capabilities: NetworkCapabilities,
        legacy_type: Option<i32>,
        callback: Arc<dyn NetworkCallback>,
        owner: Owner,
    ) {
        debug!(
            target: ENGINE_TARGET,
            request = %id,
            %kind,
            owner = %owner,
            capabilities = ?capabilities.capabilities,
            "request filed"
        );
        let request = NetworkRequest {
            id,
            kind,
            capabilities,
            legacy_type,
        };
        self.requests
            .insert(id, RequestEntry::new(request, owner, callback));
    }

    /// Releases `request`. Returns `false` when it was not filed; the
    /// default request cannot be released.
    pub fn release_request(&mut self, request: RequestId, now: Instant) -> bool {
        if !self.drop_request(request) {
            return false;
        }
        self.rematch(now);
        true
    }

    fn drop_request(&mut self, request: RequestId) -> bool {
        if request == RequestId::DEFAULT {
            return false;
        }
        let Some(entry) = self.requests.remove(&request) else {
            return false;
        };
        debug!(target: ENGINE_TARGET, request = %request, "request released");
        self.timers.cancel(&TimerKey::RequestTimeout(request));
        self.timers.cancel(&TimerKey::RestoreFeature(request));
        if let Some(network) = entry.satisfier {
            if let Some(record) = self.networks.get_mut(&network) {
                record.serving.remove(&request);
            }
        }
        self.release_factories_for(&entry.request);
        self.feature_users.retain(|user| user.request != request);
        true
    }

    /// Releases everything `owner` filed.
    pub fn owner_died(&mut self, owner: Owner, now: Instant) {
        let owned: Vec<RequestId> = self
            .requests
            .values()
            .filter(|entry| entry.owner == owner && entry.request.kind != RequestKind::Default)
            .map(|entry| entry.request.id)
            .collect();
        if owned.is_empty() {
            return;
        }
        info!(target: ENGINE_TARGET, owner = %owner, requests = owned.len(), "owner died");
        for request in owned {
            self.drop_request(request);
        }
        self.rematch(now);
    }

    /// Sends the sticky broadcast collected before the system was ready.
    pub fn system_ready(&mut self) {
        self.system_ready = true;
        if let Some(broadcast) = self.initial_broadcast.take() {
            self.broadcasts.send(&broadcast);
        }
    }

    // ---- timers --------------------------------------------------------

    /// Earliest pending timer.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Fires every timer due at `now`.
    pub fn fire_timers(&mut self, now: Instant) {
        for key in self.timers.pop_due(now) {
            match key {
                TimerKey::Linger(network) => self.linger_expired(network, now),
                TimerKey::RequestTimeout(request) => self.request_timed_out(request, now),
                TimerKey::RestoreFeature(request) => self.restore_feature(request, now),
            }
        }
    }

    fn request_timed_out(&mut self, request: RequestId, now: Instant) {
        let Some(entry) = self.requests.get(&request) else {
            return;
        };
        if entry.ever_satisfied {
            return;
        }
        info!(target: ENGINE_TARGET, request = %request, "request timed out");
        entry.notify(&CallbackEvent::Unavailable);
        self.release_request(request, now);
    }

    fn linger_expired(&mut self, network: NetworkId, now: Instant) {
        let Some(record) = self.networks.get_mut(&network) else {
            return;
        };
        if record.lifecycle != Lifecycle::Lingering || !record.serving.is_empty() {
            return;
        }
        record.linger_deadline = None;
        if !self.teardown(network, "linger expired", now) {
            if let Some(record) = self.networks.get_mut(&network) {
                record.lifecycle = Lifecycle::Connected;
            }
            self.rematch(now);
        }
    }

    // ---- snapshot ------------------------------------------------------

    /// Serialisable view of the engine state.
    pub fn snapshot(&self) -> ArbiterSnapshot {
        ArbiterSnapshot {
            active_network: self.active_network(),
            network_preference: self.preference,
            networks: self
                .networks
                .values()
                .map(|record| NetworkSnapshot {
                    id: record.id,
                    provider: record.provider,
                    info: record.info.clone(),
                    capabilities: record.capabilities.clone(),
                    link_properties: record.link_properties.clone(),
                    lifecycle: record.lifecycle,
                    suspended: record.suspended,
                    ever_validated: record.ever_validated,
                    score: record.score,
                    effective_score: record.effective_score(false),
                    serving: record.serving.iter().copied().collect(),
                })
                .collect(),
            requests: self
                .requests
                .values()
                .map(|entry| RequestSnapshot {
                    request: entry.request.clone(),
                    owner: entry.owner,
                    satisfier: entry.satisfier,
                })
                .collect(),
            factories: self
                .factories
                .iter()
                .map(|(id, entry)| FactorySnapshot {
                    id: *id,
                    name: entry.name.clone(),
                    score: entry.score,
                    needed: self
                        .factory_needs
                        .iter()
                        .filter(|(factory, _)| factory == id)
                        .map(|(_, request)| *request)
                        .collect(),
                })
                .collect(),
            default_dns: self.default_dns.clone(),
            pid_dns: self.pid_dns.clone(),
        }
    }

    // ---- shared helpers ------------------------------------------------

    fn notify_capabilities(&self, network: NetworkId) {
        let Some(record) = self.networks.get(&network) else {
            return;
        };
        let event = CallbackEvent::CapabilitiesChanged {
            network,
            capabilities: record.capabilities.clone(),
        };
        for entry in self.requests.values() {
            if entry.pairs.contains_key(&network) {
                entry.notify(&event);
            }
        }
    }

    /// Asks the provider to tear `network` down. Returns whether it agreed.
    fn teardown(&mut self, network: NetworkId, reason: &'static str, now: Instant) -> bool {
        let Some(record) = self.networks.get(&network) else {
            return false;
        };
        let agent = Arc::clone(&record.agent);
        if agent.on_network_unwanted(network) {
            info!(target: ENGINE_TARGET, network = %network, reason, "tearing down network");
            self.network_gone(network, now);
            true
        } else {
            warn!(target: ENGINE_TARGET, network = %network, reason, "provider declined teardown");
            false
        }
    }

    /// Removes `network`, telling every request that saw it.
    fn network_gone(&mut self, network: NetworkId, now: Instant) {
        let Some(mut record) = self.networks.remove(&network) else {
            return;
        };
        self.timers.cancel(&TimerKey::Linger(network));
        record.lifecycle = Lifecycle::Disconnected;
        record.capabilities = NetworkCapabilities::new();
        info!(target: ENGINE_TARGET, network = %network, "network disconnected");

        let event = CallbackEvent::Lost { network };
        for entry in self.requests.values_mut() {
            if entry.pairs.remove(&network).is_some() {
                entry.notify(&event);
            }
            if entry.satisfier == Some(network) {
                entry.satisfier = None;
            }
        }
        if self
            .current_default
            .as_ref()
            .is_some_and(|current| current.network == network)
        {
            self.failover_pending = true;
            if let Some(current) = self.current_default.as_mut() {
                current.state = NetworkState::Disconnected;
            }
        }
        self.rematch(now);
        self.failover_pending = false;
    }

    fn send_broadcast(&mut self, broadcast: ConnectivityBroadcast) {
        info!(
            target: ENGINE_TARGET,
            kind = %broadcast.kind,
            network = %broadcast.network.network,
            no_connectivity = broadcast.no_connectivity,
            is_failover = broadcast.is_failover,
            "connectivity broadcast"
        );
        self.broadcasts.send(&broadcast);
        if !self.system_ready {
            self.initial_broadcast = Some(broadcast);
        }
    }
}
