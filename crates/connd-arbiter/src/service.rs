//! Runs the [`Arbiter`] on its own worker thread and exposes a handle that
//! turns every call into a mailbox message.

use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

use connd_actor::{ActorError, Mailbox, Service, ServiceHandle};
use tracing::{debug, warn};

use crate::callback::{BroadcastSink, DnsSink, NetworkCallback};
use crate::engine::{AgentRegistration, Arbiter, ArbiterSettings, FactoryRegistration, Identifiers};
use crate::error::RequestError;
use crate::legacy::FeatureStatus;
use crate::network::{LinkProperties, NetworkCapabilities, NetworkId, NetworkState, ProbeResult};
use crate::provider::{ConnectivityProbe, FactoryId, ProviderId};
use crate::request::{Owner, RequestId, prepare_request};
use crate::snapshot::ArbiterSnapshot;

const SERVICE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::service");

/// Name of the arbitration worker thread.
pub const ARBITER_THREAD: &str = "connd-arbiter";

/// Messages accepted by the arbitration worker.
pub enum ArbiterMessage {
    RegisterAgent {
        network: NetworkId,
        registration: AgentRegistration,
    },
    UpdateCapabilities {
        network: NetworkId,
        capabilities: NetworkCapabilities,
    },
    UpdateLinkProperties {
        network: NetworkId,
        link_properties: LinkProperties,
    },
    UpdateScore {
        network: NetworkId,
        score: i32,
    },
    UpdateNetworkInfo {
        network: NetworkId,
        state: NetworkState,
        reason: Option<String>,
    },
    ProbeCompleted {
        network: NetworkId,
        result: ProbeResult,
    },
    ReportConnectivity {
        network: NetworkId,
        has_connectivity: bool,
    },
    RegisterFactory {
        factory: FactoryId,
        registration: FactoryRegistration,
    },
    SetFactoryScore {
        factory: FactoryId,
        score: i32,
    },
    UnregisterFactory {
        factory: FactoryId,
    },
    RequestNetwork {
        request: RequestId,
        capabilities: NetworkCapabilities,
        callback: Arc<dyn NetworkCallback>,
        owner: Owner,
        timeout: Option<Duration>,
    },
    ListenForNetworks {
        request: RequestId,
        capabilities: NetworkCapabilities,
        callback: Arc<dyn NetworkCallback>,
        owner: Owner,
    },
    TrackDefaultNetwork {
        request: RequestId,
        callback: Arc<dyn NetworkCallback>,
        owner: Owner,
    },
    ReleaseRequest {
        request: RequestId,
    },
    OwnerDied {
        owner: Owner,
    },
    ProviderDied {
        provider: ProviderId,
    },
    StartUsingNetworkFeature {
        owner: Owner,
        network_type: i32,
        feature: String,
        reply: Sender<FeatureStatus>,
    },
    StopUsingNetworkFeature {
        owner: Owner,
        network_type: i32,
        feature: String,
        reply: Sender<bool>,
    },
    SetNetworkPreference {
        network_type: i32,
    },
    SystemReady,
    NetworkForRequest {
        request: RequestId,
        reply: Sender<Result<Option<NetworkId>, RequestError>>,
    },
    LinkPropertiesOf {
        network: NetworkId,
        reply: Sender<Option<LinkProperties>>,
    },
    Snapshot {
        reply: Sender<ArbiterSnapshot>,
    },
}

/// [`Service`] adapter around the engine.
pub struct ArbiterService {
    arbiter: Arbiter,
}

impl ArbiterService {
    /// Wraps `arbiter`.
    #[must_use]
    pub fn new(arbiter: Arbiter) -> Self {
        Self { arbiter }
    }
}

impl Service for ArbiterService {
    type Message = ArbiterMessage;

    fn handle(&mut self, message: ArbiterMessage, now: Instant) {
        let arbiter = &mut self.arbiter;
        match message {
            ArbiterMessage::RegisterAgent {
                network,
                registration,
            } => arbiter.register_agent(network, registration, now),
            ArbiterMessage::UpdateCapabilities {
                network,
                capabilities,
            } => arbiter.update_capabilities(network, capabilities, now),
            ArbiterMessage::UpdateLinkProperties {
                network,
                link_properties,
            } => arbiter.update_link_properties(network, link_properties),
            ArbiterMessage::UpdateScore { network, score } => arbiter.update_score(network, score, now),
            ArbiterMessage::UpdateNetworkInfo {
                network,
                state,
                reason,
            } => arbiter.update_network_info(network, state, reason, now),
            ArbiterMessage::ProbeCompleted { network, result } => {
                arbiter.probe_completed(network, result, now);
            }
            ArbiterMessage::ReportConnectivity {
                network,
                has_connectivity,
            } => {
                if let Err(error) = arbiter.report_network_connectivity(network, has_connectivity) {
                    debug!(target: SERVICE_TARGET, %error, "connectivity report ignored");
                }
            }
            ArbiterMessage::RegisterFactory {
                factory,
                registration,
            } => arbiter.register_factory(factory, registration),
            ArbiterMessage::SetFactoryScore { factory, score } => {
                arbiter.set_factory_score(factory, score);
            }
            ArbiterMessage::UnregisterFactory { factory } => arbiter.unregister_factory(factory),
            ArbiterMessage::RequestNetwork {
                request,
                capabilities,
                callback,
                owner,
                timeout,
            } => {
                if let Err(error) =
                    arbiter.request_network(request, capabilities, callback, owner, timeout, now)
                {
                    warn!(target: SERVICE_TARGET, request = %request, %error, "request rejected");
                }
            }
            ArbiterMessage::ListenForNetworks {
                request,
                capabilities,
                callback,
                owner,
            } => arbiter.listen_for_networks(request, capabilities, callback, owner, now),
            ArbiterMessage::TrackDefaultNetwork {
                request,
                callback,
                owner,
            } => arbiter.track_default_network(request, callback, owner, now),
            ArbiterMessage::ReleaseRequest { request } => {
                arbiter.release_request(request, now);
            }
            ArbiterMessage::OwnerDied { owner } => arbiter.owner_died(owner, now),
            ArbiterMessage::ProviderDied { provider } => arbiter.provider_died(provider, now),
            ArbiterMessage::StartUsingNetworkFeature {
                owner,
                network_type,
                feature,
                reply,
            } => {
                let status = arbiter.start_using_network_feature(owner, network_type, &feature, now);
                let _sent = reply.send(status);
            }
            ArbiterMessage::StopUsingNetworkFeature {
                owner,
                network_type,
                feature,
                reply,
            } => {
                let stopped = arbiter.stop_using_network_feature(owner, network_type, &feature, now);
                let _sent = reply.send(stopped);
            }
            ArbiterMessage::SetNetworkPreference { network_type } => {
                arbiter.set_network_preference(network_type, now);
            }
            ArbiterMessage::SystemReady => arbiter.system_ready(),
            ArbiterMessage::NetworkForRequest { request, reply } => {
                let _sent = reply.send(arbiter.network_for_request(request));
            }
            ArbiterMessage::LinkPropertiesOf { network, reply } => {
                let _sent = reply.send(arbiter.link_properties(network).cloned());
            }
            ArbiterMessage::Snapshot { reply } => {
                let _sent = reply.send(arbiter.snapshot());
            }
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.arbiter.next_deadline()
    }

    fn on_deadline(&mut self, now: Instant) {
        self.arbiter.fire_timers(now);
    }

    fn on_stop(&mut self) {
        debug!(target: SERVICE_TARGET, "arbitration worker stopped");
    }
}

/// Client handle to a running arbitration worker.
pub struct ArbiterHandle {
    service: ServiceHandle<ArbiterMessage>,
    ids: Arc<Identifiers>,
}

impl ArbiterHandle {
    /// Starts the worker.
    ///
    /// # Errors
    ///
    /// Returns [`ActorError::Spawn`] when the worker thread cannot start.
    pub fn start(
        settings: ArbiterSettings,
        probe: Arc<dyn ConnectivityProbe>,
        broadcasts: Arc<dyn BroadcastSink>,
        dns: Arc<dyn DnsSink>,
    ) -> Result<Self, ActorError> {
        let arbiter = Arbiter::new(settings, probe, broadcasts, dns);
        let ids = arbiter.ids();
        let service = connd_actor::spawn(ARBITER_THREAD, ArbiterService::new(arbiter))?;
        Ok(Self { service, ids })
    }

    /// Mailbox for collaborators that report back asynchronously, such as
    /// connectivity probes.
    #[must_use]
    pub fn mailbox(&self) -> Mailbox<ArbiterMessage> {
        self.service.mailbox()
    }

    fn send(&self, message: ArbiterMessage) -> Result<(), RequestError> {
        self.service.send(message).map_err(RequestError::from)
    }

    /// Registers a network and returns its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::ServiceStopped`] once the worker exited.
    pub fn register_agent(&self, registration: AgentRegistration) -> Result<NetworkId, RequestError> {
        let network = self.ids.next_network();
        self.send(ArbiterMessage::RegisterAgent {
            network,
            registration,
        })?;
        Ok(network)
    }

    /// Pushes new capabilities for `network`.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::ServiceStopped`] once the worker exited.
    pub fn send_capabilities(
        &self,
        network: NetworkId,
        capabilities: NetworkCapabilities,
    ) -> Result<(), RequestError> {
        self.send(ArbiterMessage::UpdateCapabilities {
            network,
            capabilities,
        })
    }

    /// Pushes new link properties for `network`.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::ServiceStopped`] once the worker exited.
    pub fn send_link_properties(
        &self,
        network: NetworkId,
        link_properties: LinkProperties,
    ) -> Result<(), RequestError> {
        self.send(ArbiterMessage::UpdateLinkProperties {
            network,
            link_properties,
        })
    }

    /// Pushes a new raw score for `network`.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::ServiceStopped`] once the worker exited.
    pub fn send_score(&self, network: NetworkId, score: i32) -> Result<(), RequestError> {
        self.send(ArbiterMessage::UpdateScore { network, score })
    }

    /// Pushes a link-layer state change for `network`.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::ServiceStopped`] once the worker exited.
    pub fn send_network_info(
        &self,
        network: NetworkId,
        state: NetworkState,
        reason: Option<String>,
    ) -> Result<(), RequestError> {
        self.send(ArbiterMessage::UpdateNetworkInfo {
            network,
            state,
            reason,
        })
    }

    /// Reports a probe result for `network`.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::ServiceStopped`] once the worker exited.
    pub fn probe_completed(&self, network: NetworkId, result: ProbeResult) -> Result<(), RequestError> {
        self.send(ArbiterMessage::ProbeCompleted { network, result })
    }

    /// Asks for `network` to be re-validated.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::ServiceStopped`] once the worker exited.
    pub fn report_network_connectivity(
        &self,
        network: NetworkId,
        has_connectivity: bool,
    ) -> Result<(), RequestError> {
        self.send(ArbiterMessage::ReportConnectivity {
            network,
            has_connectivity,
        })
    }

    /// Registers a factory and returns its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::ServiceStopped`] once the worker exited.
    pub fn register_factory(&self, registration: FactoryRegistration) -> Result<FactoryId, RequestError> {
        let factory = self.ids.next_factory();
        self.send(ArbiterMessage::RegisterFactory {
            factory,
            registration,
        })?;
        Ok(factory)
    }

    /// Changes a factory's score filter.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::ServiceStopped`] once the worker exited.
    pub fn set_factory_score(&self, factory: FactoryId, score: i32) -> Result<(), RequestError> {
        self.send(ArbiterMessage::SetFactoryScore { factory, score })
    }

    /// Unregisters a factory.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::ServiceStopped`] once the worker exited.
    pub fn unregister_factory(&self, factory: FactoryId) -> Result<(), RequestError> {
        self.send(ArbiterMessage::UnregisterFactory { factory })
    }

    /// Files a keep-alive request.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::MutableCapability`] for probe-owned
    /// capabilities and [`RequestError::ServiceStopped`] once the worker
    /// exited.
    pub fn request_network(
        &self,
        capabilities: NetworkCapabilities,
        callback: Arc<dyn NetworkCallback>,
        owner: Owner,
        timeout: Option<Duration>,
    ) -> Result<RequestId, RequestError> {
        let capabilities = prepare_request(capabilities)?;
        let request = self.ids.next_request();
        self.send(ArbiterMessage::RequestNetwork {
            request,
            capabilities,
            callback,
            owner,
            timeout,
        })?;
        Ok(request)
    }

    /// Files a listen.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::ServiceStopped`] once the worker exited.
    pub fn register_network_callback(
        &self,
        capabilities: NetworkCapabilities,
        callback: Arc<dyn NetworkCallback>,
        owner: Owner,
    ) -> Result<RequestId, RequestError> {
        let request = self.ids.next_request();
        self.send(ArbiterMessage::ListenForNetworks {
            request,
            capabilities,
            callback,
            owner,
        })?;
        Ok(request)
    }

    /// Files a request that follows the default network.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::ServiceStopped`] once the worker exited.
    pub fn register_default_network_callback(
        &self,
        callback: Arc<dyn NetworkCallback>,
        owner: Owner,
    ) -> Result<RequestId, RequestError> {
        let request = self.ids.next_request();
        self.send(ArbiterMessage::TrackDefaultNetwork {
            request,
            callback,
            owner,
        })?;
        Ok(request)
    }

    /// Releases a request or listen. Releasing twice is harmless.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::ServiceStopped`] once the worker exited.
    pub fn release_request(&self, request: RequestId) -> Result<(), RequestError> {
        self.send(ArbiterMessage::ReleaseRequest { request })
    }

    /// Releases everything `owner` filed.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::ServiceStopped`] once the worker exited.
    pub fn owner_died(&self, owner: Owner) -> Result<(), RequestError> {
        self.send(ArbiterMessage::OwnerDied { owner })
    }

    /// Disconnects everything `provider` registered.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::ServiceStopped`] once the worker exited.
    pub fn provider_died(&self, provider: ProviderId) -> Result<(), RequestError> {
        self.send(ArbiterMessage::ProviderDied { provider })
    }

    /// Files a legacy feature request and waits for its status.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::ServiceStopped`] once the worker exited.
    pub fn start_using_network_feature(
        &self,
        owner: Owner,
        network_type: i32,
        feature: &str,
    ) -> Result<FeatureStatus, RequestError> {
        let feature = feature.to_owned();
        Ok(self
            .service
            .mailbox()
            .call(|reply| ArbiterMessage::StartUsingNetworkFeature {
                owner,
                network_type,
                feature,
                reply,
            })?)
    }

    /// Releases a legacy feature request.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::ServiceStopped`] once the worker exited.
    pub fn stop_using_network_feature(
        &self,
        owner: Owner,
        network_type: i32,
        feature: &str,
    ) -> Result<bool, RequestError> {
        let feature = feature.to_owned();
        Ok(self
            .service
            .mailbox()
            .call(|reply| ArbiterMessage::StopUsingNetworkFeature {
                owner,
                network_type,
                feature,
                reply,
            })?)
    }

    /// Sets the preferred legacy type for default traffic.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::ServiceStopped`] once the worker exited.
    pub fn set_network_preference(&self, network_type: i32) -> Result<(), RequestError> {
        self.send(ArbiterMessage::SetNetworkPreference { network_type })
    }

    /// Releases the sticky broadcast held back until boot completes.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::ServiceStopped`] once the worker exited.
    pub fn system_ready(&self) -> Result<(), RequestError> {
        self.send(ArbiterMessage::SystemReady)
    }

    /// Network currently serving `request`.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::UnknownRequest`] for requests not filed and
    /// [`RequestError::ServiceStopped`] once the worker exited.
    pub fn network_for_request(&self, request: RequestId) -> Result<Option<NetworkId>, RequestError> {
        self.service
            .mailbox()
            .call(|reply| ArbiterMessage::NetworkForRequest { request, reply })?
    }

    /// Network serving the default request.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::ServiceStopped`] once the worker exited.
    pub fn active_network(&self) -> Result<Option<NetworkId>, RequestError> {
        self.network_for_request(RequestId::DEFAULT)
    }

    /// Link properties of `network`; `None` when it is not registered.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::ServiceStopped`] once the worker exited.
    pub fn link_properties(&self, network: NetworkId) -> Result<Option<LinkProperties>, RequestError> {
        Ok(self
            .service
            .mailbox()
            .call(|reply| ArbiterMessage::LinkPropertiesOf { network, reply })?)
    }

    /// Snapshot of the engine state, taken on the worker.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::ServiceStopped`] once the worker exited.
    pub fn snapshot(&self) -> Result<ArbiterSnapshot, RequestError> {
        Ok(self
            .service
            .mailbox()
            .call(|reply| ArbiterMessage::Snapshot { reply })?)
    }

    /// Stops the worker after it drains pending messages.
    ///
    /// # Errors
    ///
    /// Returns [`ActorError::Panicked`] when the worker panicked.
    pub fn shutdown(&self) -> Result<(), ActorError> {
        self.service.shutdown()
    }
}
