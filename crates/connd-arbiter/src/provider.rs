//! Collaborators the engine drives: network agents, connectivity probes and
//! network factories.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tracing::debug;

use crate::network::{LinkProperties, NetworkId};
use crate::request::{NetworkRequest, RequestId};

const PROVIDER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::provider");

/// Identity of a process providing networks or factories. Its death
/// disconnects everything it registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ProviderId(pub u32);

impl fmt::Display for ProviderId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Identifier of a registered factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct FactoryId(pub u32);

impl fmt::Display for FactoryId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Provider-side proxy of one network.
///
/// Methods run on the arbitration worker and must not block.
pub trait NetworkAgent: Send + Sync {
    /// Asks the provider to tear the network down. Returning `false`
    /// declines; the network then stays until the provider disconnects it.
    fn on_network_unwanted(&self, network: NetworkId) -> bool;

    /// Reports the result of a connectivity probe.
    fn on_validation_status(&self, network: NetworkId, validated: bool) {
        let _ = (network, validated);
    }

    /// Asks the provider to bring the network back up after a fail-over.
    fn on_reconnect_requested(&self, network: NetworkId) {
        let _ = network;
    }
}

/// Starts connectivity probes. Results return through
/// `ArbiterMessage::ProbeCompleted`.
pub trait ConnectivityProbe: Send + Sync {
    /// Starts a probe of `network`.
    fn start_probe(&self, network: NetworkId, link_properties: &LinkProperties);
}

/// Probe that never reports; networks stay unvalidated until a result is
/// injected.
#[derive(Debug, Default)]
pub struct NoopProbe;

impl ConnectivityProbe for NoopProbe {
    fn start_probe(&self, _network: NetworkId, _link_properties: &LinkProperties) {}
}

/// Transport-specific provider able to bring up networks on demand.
///
/// The engine pairs calls per request: `need_network_for` and
/// `release_network_for` strictly alternate, starting with a need.
pub trait NetworkFactory: Send + Sync {
    /// A network from this factory could serve `request`, whose best
    /// current score is `score`.
    fn need_network_for(&self, request: &NetworkRequest, score: i32);

    /// `request` no longer needs this factory.
    fn release_network_for(&self, request: &NetworkRequest);

    /// Lets the factory refuse a request its capability filter matched.
    fn accept_request(&self, request: &NetworkRequest, score: i32) -> bool {
        let _ = (request, score);
        true
    }
}

/// Network bring-up controlled by a [`RefCountingFactory`].
pub trait FactoryDelegate: Send + Sync {
    /// The first request arrived.
    fn start_network(&self);

    /// The last request went away.
    fn stop_network(&self);

    /// Refuses requests the capability filter cannot express.
    fn accept_request(&self, request: &NetworkRequest, score: i32) -> bool {
        let _ = (request, score);
        true
    }
}

/// Factory that starts its network on the first needed request and stops it
/// when the last one is released.
pub struct RefCountingFactory<D> {
    name: String,
    delegate: D,
    needed: Mutex<BTreeSet<RequestId>>,
}

impl<D: FactoryDelegate> RefCountingFactory<D> {
    /// Wraps `delegate`.
    pub fn new(name: impl Into<String>, delegate: D) -> Self {
        Self {
            name: name.into(),
            delegate,
            needed: Mutex::new(BTreeSet::new()),
        }
    }

    /// Number of requests currently needing the network.
    pub fn request_count(&self) -> usize {
        self.needed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// The wrapped delegate.
    pub fn delegate(&self) -> &D {
        &self.delegate
    }
}

impl<D: FactoryDelegate> NetworkFactory for RefCountingFactory<D> {
    fn need_network_for(&self, request: &NetworkRequest, score: i32) {
        let first = {
            let mut needed = self.needed.lock().unwrap_or_else(PoisonError::into_inner);
            needed.insert(request.id) && needed.len() == 1
        };
        debug!(
            target: PROVIDER_TARGET,
            factory = %self.name,
            request = %request.id,
            score,
            "request needs factory"
        );
        if first {
            self.delegate.start_network();
        }
    }

    fn release_network_for(&self, request: &NetworkRequest) {
        let last = {
            let mut needed = self.needed.lock().unwrap_or_else(PoisonError::into_inner);
            needed.remove(&request.id) && needed.is_empty()
        };
        debug!(
            target: PROVIDER_TARGET,
            factory = %self.name,
            request = %request.id,
            "request released factory"
        );
        if last {
            self.delegate.stop_network();
        }
    }

    fn accept_request(&self, request: &NetworkRequest, score: i32) -> bool {
        self.delegate.accept_request(request, score)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::request::RequestKind;

    #[derive(Default)]
    struct Radio {
        starts: AtomicUsize,
        stops: AtomicUsize,
    }

    impl FactoryDelegate for Radio {
        fn start_network(&self) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn stop_network(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn request(raw: u32) -> NetworkRequest {
        NetworkRequest {
            id: RequestId::new(raw),
            kind: RequestKind::Request,
            capabilities: NetworkRequest::default_capabilities(),
            legacy_type: None,
        }
    }

    #[test]
    fn starts_and_stops_only_on_edge_transitions() {
        let factory = RefCountingFactory::new("radio", Radio::default());
        factory.need_network_for(&request(2), 0);
        factory.need_network_for(&request(3), 0);
        assert_eq!(factory.delegate().starts.load(Ordering::SeqCst), 1);
        assert_eq!(factory.request_count(), 2);

        factory.release_network_for(&request(2));
        assert_eq!(factory.delegate().stops.load(Ordering::SeqCst), 0);
        factory.release_network_for(&request(3));
        assert_eq!(factory.delegate().stops.load(Ordering::SeqCst), 1);

        factory.need_network_for(&request(4), 0);
        assert_eq!(factory.delegate().starts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn releasing_an_unknown_request_does_not_stop() {
        let factory = RefCountingFactory::new("radio", Radio::default());
        factory.release_network_for(&request(9));
        assert_eq!(factory.delegate().stops.load(Ordering::SeqCst), 0);
    }
}
