//! Notifications delivered to requesters and system broadcast receivers.

use std::net::IpAddr;

use serde::Serialize;
use strum::Display;

use crate::network::{LinkProperties, NetworkCapabilities, NetworkId, NetworkState};
use crate::request::RequestId;

/// Event delivered to the callback of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CallbackEvent {
    /// `network` now serves the request.
    Available {
        /// Network now serving.
        network: NetworkId,
    },
    /// `network` lingers and will be lost within `max_ms_to_live`.
    Losing {
        /// Lingering network.
        network: NetworkId,
        /// Milliseconds until the linger timer fires.
        max_ms_to_live: u64,
    },
    /// `network` no longer serves the request.
    Lost {
        /// Network lost.
        network: NetworkId,
    },
    /// No network was found before the request timed out.
    Unavailable,
    /// Capabilities of a network serving the request changed.
    CapabilitiesChanged {
        /// Network whose capabilities changed.
        network: NetworkId,
        /// New capabilities.
        capabilities: NetworkCapabilities,
    },
    /// Link properties of a network serving the request changed.
    LinkPropertiesChanged {
        /// Network whose link properties changed.
        network: NetworkId,
        /// New link properties.
        link_properties: LinkProperties,
    },
}

impl CallbackEvent {
    /// Network the event refers to, if any.
    #[must_use]
    pub const fn network(&self) -> Option<NetworkId> {
        match self {
            Self::Available { network }
            | Self::Losing { network, .. }
            | Self::Lost { network }
            | Self::CapabilitiesChanged { network, .. }
            | Self::LinkPropertiesChanged { network, .. } => Some(*network),
            Self::Unavailable => None,
        }
    }
}

/// Receiver of request events.
///
/// Called on the arbitration worker thread, so implementations must not
/// block.
pub trait NetworkCallback: Send + Sync {
    /// Delivers `event` for `request`.
    fn on_event(&self, request: RequestId, event: &CallbackEvent);
}

/// Callback that drops every event, used for requests the engine files
/// itself.
#[derive(Debug, Default)]
pub struct NullCallback;

impl NetworkCallback for NullCallback {
    fn on_event(&self, _request: RequestId, _event: &CallbackEvent) {}
}

/// Kind of default-network transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BroadcastKind {
    /// A network became the default.
    Connected,
    /// The default network went away and nothing replaced it.
    Disconnected,
    /// A connection attempt failed.
    ConnectionFailed,
}

/// Network described by a broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BroadcastNetwork {
    /// Network identifier.
    pub network: NetworkId,
    /// Legacy network type.
    pub legacy_type: i32,
    /// Human readable type name.
    pub type_name: String,
    /// Link-layer state when the broadcast was built.
    pub state: NetworkState,
    /// Capabilities when the broadcast was built.
    pub capabilities: NetworkCapabilities,
}

/// Connectivity change broadcast to system receivers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectivityBroadcast {
    /// Transition kind.
    pub kind: BroadcastKind,
    /// Network that changed.
    pub network: BroadcastNetwork,
    /// Network the engine is failing over to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_network: Option<BroadcastNetwork>,
    /// No network is left to carry default traffic.
    pub no_connectivity: bool,
    /// The new default replaced one that went away.
    pub is_failover: bool,
}

/// Receiver of connectivity broadcasts.
pub trait BroadcastSink: Send + Sync {
    /// Delivers `broadcast`.
    fn send(&self, broadcast: &ConnectivityBroadcast);
}

/// Receiver of name server assignments.
///
/// Only changes are delivered. An empty server list withdraws the previous
/// assignment.
pub trait DnsSink: Send + Sync {
    /// Name servers for default traffic.
    fn default_dns_changed(&self, servers: &[IpAddr]);

    /// Name servers for process `pid`, taken from the network serving its
    /// legacy feature requests.
    fn pid_dns_changed(&self, pid: u32, servers: &[IpAddr]);
}
