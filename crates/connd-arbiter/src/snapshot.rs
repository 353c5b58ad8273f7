//! Serialisable view of the arbitration state, for dumps and tests.

use std::collections::BTreeMap;
use std::net::IpAddr;

use serde::Serialize;

use crate::network::{Lifecycle, LinkProperties, NetworkCapabilities, NetworkId, NetworkInfo};
use crate::provider::{FactoryId, ProviderId};
use crate::request::{NetworkRequest, Owner, RequestId};

/// Whole-engine snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ArbiterSnapshot {
    /// Network serving the default request.
    pub active_network: Option<NetworkId>,
    /// Preferred legacy type, if set.
    pub network_preference: Option<i32>,
    /// Every registered network.
    pub networks: Vec<NetworkSnapshot>,
    /// Every filed request, the default request included.
    pub requests: Vec<RequestSnapshot>,
    /// Every registered factory.
    pub factories: Vec<FactorySnapshot>,
    /// Name servers last published for default traffic.
    pub default_dns: Vec<IpAddr>,
    /// Name servers last published per feature-using process.
    pub pid_dns: BTreeMap<u32, Vec<IpAddr>>,
}

impl ArbiterSnapshot {
    /// Snapshot of `network`, if registered.
    #[must_use]
    pub fn network(&self, network: NetworkId) -> Option<&NetworkSnapshot> {
        self.networks.iter().find(|snapshot| snapshot.id == network)
    }
}

/// One network record.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkSnapshot {
    pub id: NetworkId,
    pub provider: ProviderId,
    pub info: NetworkInfo,
    pub capabilities: NetworkCapabilities,
    pub link_properties: LinkProperties,
    pub lifecycle: Lifecycle,
    pub suspended: bool,
    pub ever_validated: bool,
    pub score: i32,
    pub effective_score: i32,
    /// Keep-alive requests this network wins.
    pub serving: Vec<RequestId>,
}

/// One request and its binding.
#[derive(Debug, Clone, Serialize)]
pub struct RequestSnapshot {
    pub request: NetworkRequest,
    pub owner: Owner,
    pub satisfier: Option<NetworkId>,
}

/// One factory and the requests it was asked to serve.
#[derive(Debug, Clone, Serialize)]
pub struct FactorySnapshot {
    pub id: FactoryId,
    pub name: String,
    pub score: i32,
    pub needed: Vec<RequestId>,
}
