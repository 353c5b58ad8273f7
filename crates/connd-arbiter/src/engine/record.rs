use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use crate::callback::{BroadcastNetwork, CallbackEvent, NetworkCallback};
use crate::network::{
    Capability, CapabilitySet, Lifecycle, LinkProperties, NetworkCapabilities, NetworkId,
    NetworkInfo, NetworkMisc,
};
use crate::provider::{NetworkAgent, ProviderId};
use crate::request::{NetworkRequest, Owner, RequestId};

/// Score of an explicitly selected network the user accepted unvalidated.
pub(crate) const EXPLICITLY_SELECTED_SCORE: i32 = 100;

/// Penalty applied while a network that should validate has not.
pub(crate) const UNVALIDATED_PENALTY: i32 = 40;

/// Everything a provider supplies when registering a network.
#[derive(Clone)]
pub struct AgentRegistration {
    /// Process owning the network.
    pub provider: ProviderId,
    /// Provider-side proxy.
    pub agent: Arc<dyn NetworkAgent>,
    /// Initial legacy info, normally in the `Connecting` state.
    pub info: NetworkInfo,
    /// Initial capabilities.
    pub capabilities: NetworkCapabilities,
    /// Initial link properties.
    pub link_properties: LinkProperties,
    /// Initial raw score.
    pub score: i32,
    /// Scoring and validation flags.
    pub misc: NetworkMisc,
}

pub(crate) struct NetworkRecord {
    pub(crate) id: NetworkId,
    pub(crate) provider: ProviderId,
    pub(crate) agent: Arc<dyn NetworkAgent>,
    pub(crate) info: NetworkInfo,
    pub(crate) capabilities: NetworkCapabilities,
    pub(crate) link_properties: LinkProperties,
    pub(crate) score: i32,
    pub(crate) misc: NetworkMisc,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) suspended: bool,
    pub(crate) last_validated: bool,
    pub(crate) ever_validated: bool,
    pub(crate) captive_portal: bool,
    /// Keep-alive requests this network currently wins.
    pub(crate) serving: BTreeSet<RequestId>,
    pub(crate) linger_deadline: Option<Instant>,
}

impl NetworkRecord {
    pub(crate) fn new(id: NetworkId, registration: AgentRegistration) -> Self {
        let mut capabilities = registration.capabilities;
        for capability in Capability::MUTABLE {
            capabilities.capabilities.remove(capability.flag());
        }
        Self {
            id,
            provider: registration.provider,
            agent: registration.agent,
            info: registration.info,
            capabilities,
            link_properties: registration.link_properties,
            score: registration.score,
            misc: registration.misc,
            lifecycle: Lifecycle::Connecting,
            suspended: false,
            last_validated: false,
            ever_validated: false,
            captive_portal: false,
            serving: BTreeSet::new(),
            linger_deadline: None,
        }
    }

    fn expects_validation(&self) -> bool {
        self.capabilities.has(Capability::Internet) && !self.misc.skip_validation
    }

    /// Score used for ranking. `pretend_validated` asks what the score
    /// would be once validation succeeds.
    pub(crate) fn effective_score(&self, pretend_validated: bool) -> i32 {
        if self.misc.explicitly_selected && self.misc.accept_unvalidated {
            return EXPLICITLY_SELECTED_SCORE;
        }
        let mut score = self.score;
        if !self.last_validated && !pretend_validated && self.expects_validation() {
            score -= UNVALIDATED_PENALTY;
        }
        score.max(0)
    }

    pub(crate) fn transport_rank(&self) -> u8 {
        self.capabilities
            .transports
            .members()
            .map(crate::network::Transport::preference_rank)
            .max()
            .unwrap_or(0)
    }

    /// Copies the engine-owned capability bits onto `capabilities`.
    pub(crate) fn with_probe_bits(&self, mut capabilities: NetworkCapabilities) -> NetworkCapabilities {
        for capability in Capability::MUTABLE {
            capabilities.capabilities.remove(capability.flag());
        }
        if self.last_validated {
            capabilities.capabilities.insert(CapabilitySet::VALIDATED);
        }
        if self.captive_portal {
            capabilities.capabilities.insert(CapabilitySet::CAPTIVE_PORTAL);
        }
        capabilities
    }

    pub(crate) fn broadcast_network(&self) -> BroadcastNetwork {
        BroadcastNetwork {
            network: self.id,
            legacy_type: self.info.legacy_type,
            type_name: self.info.type_name.clone(),
            state: self.info.state,
            capabilities: self.capabilities.clone(),
        }
    }
}

/// Notification state of one (request, network) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PairState {
    Available,
    Losing,
}

pub(crate) struct RequestEntry {
    pub(crate) request: NetworkRequest,
    pub(crate) owner: Owner,
    pub(crate) callback: Arc<dyn NetworkCallback>,
    /// Winning network; for listens always `None`.
    pub(crate) satisfier: Option<NetworkId>,
    pub(crate) pairs: BTreeMap<NetworkId, PairState>,
    pub(crate) ever_satisfied: bool,
}

impl RequestEntry {
    pub(crate) fn new(request: NetworkRequest, owner: Owner, callback: Arc<dyn NetworkCallback>) -> Self {
        Self {
            request,
            owner,
            callback,
            satisfier: None,
            pairs: BTreeMap::new(),
            ever_satisfied: false,
        }
    }

    pub(crate) fn notify(&self, event: &CallbackEvent) {
        self.callback.on_event(self.request.id, event);
    }
}
