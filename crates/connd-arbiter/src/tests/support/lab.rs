use std::sync::Arc;
use std::time::{Duration, Instant};

use connd_config::default_network_attributes;

use super::doubles::{
    RecordingBroadcasts, RecordingCallback, RecordingDns, RecordingProbe, TestAgent,
};
use crate::legacy::{TYPE_BLUETOOTH, TYPE_ETHERNET, TYPE_MOBILE, TYPE_WIFI};
use crate::{
    AgentRegistration, Arbiter, ArbiterSettings, CallbackEvent, Capability, LinkProperties,
    NetworkCapabilities, NetworkId, NetworkInfo, NetworkMisc, NetworkState, Owner, ProbeResult,
    ProviderId, RequestId, Transport,
};

pub const LINGER: Duration = Duration::from_secs(30);
pub const RESTORE: Duration = Duration::from_secs(60);

/// Events other than capability and link-property updates.
pub fn lifecycle(events: Vec<CallbackEvent>) -> Vec<CallbackEvent> {
    events
        .into_iter()
        .filter(|event| {
            !matches!(
                event,
                CallbackEvent::CapabilitiesChanged { .. } | CallbackEvent::LinkPropertiesChanged { .. }
            )
        })
        .collect()
}

/// Engine plus recording collaborators and a manual clock.
pub struct Lab {
    pub arbiter: Arbiter,
    pub broadcasts: Arc<RecordingBroadcasts>,
    pub probe: Arc<RecordingProbe>,
    pub dns: Arc<RecordingDns>,
    pub now: Instant,
}

impl Default for Lab {
    fn default() -> Self {
        Self::with_settings(Self::settings())
    }
}

impl Lab {
    /// Settings with the built-in attributes table.
    pub fn settings() -> ArbiterSettings {
        ArbiterSettings {
            linger_delay: LINGER,
            restore_delay: RESTORE,
            single_default_mode: false,
            network_preference: None,
            attributes: default_network_attributes(),
        }
    }

    pub fn with_settings(settings: ArbiterSettings) -> Self {
        let broadcasts = Arc::new(RecordingBroadcasts::default());
        let probe = Arc::new(RecordingProbe::default());
        let dns = Arc::new(RecordingDns::default());
        let arbiter = Arbiter::new(settings, probe.clone(), broadcasts.clone(), dns.clone());
        Self {
            arbiter,
            broadcasts,
            probe,
            dns,
            now: Instant::now(),
        }
    }

    /// Moves the clock and fires due timers.
    pub fn advance(&mut self, by: Duration) {
        self.now += by;
        self.arbiter.fire_timers(self.now);
    }

    /// Registers a network in the `Connecting` state.
    pub fn register(
        &mut self,
        transport: Transport,
        score: i32,
        capabilities: NetworkCapabilities,
        misc: NetworkMisc,
    ) -> (NetworkId, Arc<TestAgent>) {
        let agent = Arc::new(TestAgent::default());
        let network = self.arbiter.ids().next_network();
        let (legacy_type, name) = match transport {
            Transport::Cellular => (TYPE_MOBILE, "mobile"),
            Transport::Wifi => (TYPE_WIFI, "wifi"),
            Transport::Bluetooth => (TYPE_BLUETOOTH, "bluetooth"),
            Transport::Ethernet => (TYPE_ETHERNET, "ethernet"),
            Transport::Vpn | Transport::Test => (-1, "other"),
        };
        let registration = AgentRegistration {
            provider: ProviderId(network.get()),
            agent: agent.clone(),
            info: NetworkInfo::connecting(legacy_type, name),
            capabilities: capabilities.with_transport(transport),
            link_properties: LinkProperties::for_interface(format!("{name}0")),
            score,
            misc,
        };
        self.arbiter.register_agent(network, registration, self.now);
        (network, agent)
    }

    /// Registers and connects an internet network, validating it when
    /// asked.
    pub fn connect(&mut self, transport: Transport, score: i32, validated: bool) -> (NetworkId, Arc<TestAgent>) {
        let (network, agent) = self.register(
            transport,
            score,
            internet(),
            NetworkMisc::default(),
        );
        self.set_state(network, NetworkState::Connected);
        if validated {
            self.probe_result(network, ProbeResult::Validated);
        }
        (network, agent)
    }

    pub fn set_state(&mut self, network: NetworkId, state: NetworkState) {
        self.arbiter.update_network_info(network, state, None, self.now);
    }

    pub fn probe_result(&mut self, network: NetworkId, result: ProbeResult) {
        self.arbiter.probe_completed(network, result, self.now);
    }

    /// Follows the default network.
    pub fn track_default(&mut self) -> (RequestId, Arc<RecordingCallback>) {
        let callback = Arc::new(RecordingCallback::default());
        let request = self.arbiter.ids().next_request();
        self.arbiter
            .track_default_network(request, callback.clone(), owner(), self.now);
        (request, callback)
    }

    /// Files a keep-alive request.
    pub fn request(&mut self, capabilities: NetworkCapabilities) -> (RequestId, Arc<RecordingCallback>) {
        self.request_with_timeout(capabilities, None)
    }

    pub fn request_with_timeout(
        &mut self,
        capabilities: NetworkCapabilities,
        timeout: Option<Duration>,
    ) -> (RequestId, Arc<RecordingCallback>) {
        let callback = Arc::new(RecordingCallback::default());
        let request = self.arbiter.ids().next_request();
        self.arbiter
            .request_network(request, capabilities, callback.clone(), owner(), timeout, self.now)
            .expect("request should be accepted");
        (request, callback)
    }

    /// Files a listen.
    pub fn listen(&mut self, capabilities: NetworkCapabilities) -> (RequestId, Arc<RecordingCallback>) {
        let callback = Arc::new(RecordingCallback::default());
        let request = self.arbiter.ids().next_request();
        self.arbiter
            .listen_for_networks(request, capabilities, callback.clone(), owner(), self.now);
        (request, callback)
    }

    pub fn active(&self) -> Option<NetworkId> {
        self.arbiter.active_network()
    }
}

/// Capabilities of an ordinary internet network.
pub fn internet() -> NetworkCapabilities {
    NetworkCapabilities::new()
        .with_capability(Capability::Internet)
        .with_capability(Capability::NotRestricted)
}

/// Owner used by test requests.
pub fn owner() -> Owner {
    Owner::new(10_001, 4242)
}
