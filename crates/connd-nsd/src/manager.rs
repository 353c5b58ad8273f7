//! Seam for an in-process multi-socket mDNS engine.
//!
//! When installed and enabled, discovery and resolution are served by
//! listeners registered with a [`DiscoveryManager`] instead of the native
//! daemon. The manager reports back by sending [`ManagerEvent`]s into the
//! discovery mailbox.

use std::collections::BTreeMap;

use serde::Serialize;
use strum::Display;

use crate::client::TransactionId;
use crate::info::NetId;

/// What a manager listener is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ListenerKind {
    /// Reports instance names appearing and disappearing.
    Discovery,
    /// Reports the first fully resolved instance.
    Resolution,
}

/// A listener registration handed to the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerListener {
    /// Transaction the listener reports under.
    pub transaction: TransactionId,
    /// Events the listener forwards.
    pub kind: ListenerKind,
    /// Normalised `.local` query name.
    pub service_type: String,
    /// Network to search on, or all networks.
    pub network: Option<NetId>,
    /// Instance to resolve, for resolution listeners.
    pub instance: Option<String>,
}

/// Multi-socket mDNS engine.
///
/// Called on the discovery worker; implementations must hand blocking work
/// to their own threads.
pub trait DiscoveryManager: Send {
    /// Starts watching network interfaces for mDNS sockets.
    fn start_monitoring_sockets(&mut self);
    /// Stops watching network interfaces.
    fn stop_monitoring_sockets(&mut self);
    /// Begins reporting for `listener`.
    fn register_listener(&mut self, listener: &ManagerListener);
    /// Stops reporting for `listener`.
    fn unregister_listener(&mut self, listener: &ManagerListener);
}

/// A service instance as the manager sees it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MdnsServiceRecord {
    pub instance_name: String,
    pub port: u16,
    pub attributes: BTreeMap<String, Vec<u8>>,
    pub ipv4_address: Option<String>,
    pub ipv6_address: Option<String>,
    pub network: Option<NetId>,
    pub interface_index: u32,
}

/// Raw manager callback, before it is matched to the listener kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerEventKind {
    /// An instance name was discovered.
    NameDiscovered(MdnsServiceRecord),
    /// An instance name disappeared.
    NameRemoved(MdnsServiceRecord),
    /// An instance was fully resolved.
    ServiceFound(MdnsServiceRecord),
}

/// A callback from the manager for one listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerEvent {
    pub transaction: TransactionId,
    pub kind: ManagerEventKind,
}
