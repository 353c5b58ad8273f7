//! Per-client bookkeeping and the identifiers that tie daemon events back
//! to client requests.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use strum::{Display, IntoStaticStr};

use crate::callback::ClientCallback;
use crate::info::ServiceInfo;
use crate::manager::ManagerListener;

/// Identity of a connected discovery client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "client{}", self.0)
    }
}

/// Issues client identities.
#[derive(Debug, Default)]
pub struct ClientIds {
    last: AtomicU64,
}

impl ClientIds {
    /// Returns a fresh identity.
    pub fn next(&self) -> ClientId {
        ClientId(self.last.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// Client-chosen key naming one of its requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ListenerKey(pub i32);

impl fmt::Display for ListenerKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "key{}", self.0)
    }
}

/// Global identifier correlating backend traffic with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TransactionId(pub u32);

impl TransactionId {
    /// Never issued; marks the absence of a transaction.
    pub const INVALID: Self = Self(0);
}

impl fmt::Display for TransactionId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, formatter)
    }
}

/// Monotonic transaction counter that never yields
/// [`TransactionId::INVALID`].
#[derive(Debug)]
pub struct TransactionIds {
    last: u32,
}

impl Default for TransactionIds {
    fn default() -> Self {
        Self { last: 1 }
    }
}

impl TransactionIds {
    /// Returns the next identifier, wrapping past zero.
    pub fn allocate(&mut self) -> TransactionId {
        self.last = self.last.wrapping_add(1);
        if self.last == TransactionId::INVALID.0 {
            self.last = self.last.wrapping_add(1);
        }
        TransactionId(self.last)
    }
}

/// Operation a transaction belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Discover,
    Register,
    Resolve,
    GetAddrInfo,
}

/// Where a request is being served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// The native resolver daemon.
    Daemon,
    /// A listener registered with the discovery manager.
    Manager {
        /// The registration, kept for unregistering.
        listener: ManagerListener,
        /// Type as the client asked for it.
        requested_type: String,
    },
}

/// One outstanding request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRequest {
    /// Global identifier currently in flight.
    pub transaction: TransactionId,
    /// Operation being performed.
    pub kind: RequestKind,
    /// Backend serving it.
    pub backend: Backend,
}

/// State owned for one client.
///
/// The global transaction table only stores [`ClientId`]s, so dropping a
/// `ClientInfo` makes every transaction it owned unreachable.
pub struct ClientInfo {
    callback: Arc<dyn ClientCallback>,
    requests: BTreeMap<ListenerKey, ClientRequest>,
    resolved: Option<ServiceInfo>,
    legacy: bool,
}

impl ClientInfo {
    pub(crate) fn new(callback: Arc<dyn ClientCallback>) -> Self {
        Self {
            callback,
            requests: BTreeMap::new(),
            resolved: None,
            legacy: false,
        }
    }

    pub(crate) fn callback(&self) -> Arc<dyn ClientCallback> {
        Arc::clone(&self.callback)
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.len()
    }

    pub(crate) fn request(&self, key: ListenerKey) -> Option<&ClientRequest> {
        self.requests.get(&key)
    }

    /// Finds the key whose request currently holds `transaction`.
    pub(crate) fn key_for(&self, transaction: TransactionId) -> Option<(ListenerKey, &ClientRequest)> {
        self.requests
            .iter()
            .find(|(_, request)| request.transaction == transaction)
            .map(|(key, request)| (*key, request))
    }

    pub(crate) fn insert(&mut self, key: ListenerKey, request: ClientRequest) {
        self.requests.insert(key, request);
    }

    pub(crate) fn remove(&mut self, key: ListenerKey) -> Option<ClientRequest> {
        self.requests.remove(&key)
    }

    pub(crate) fn drain(&mut self) -> Vec<(ListenerKey, ClientRequest)> {
        std::mem::take(&mut self.requests).into_iter().collect()
    }

    pub(crate) fn requests(&self) -> impl Iterator<Item = (&ListenerKey, &ClientRequest)> {
        self.requests.iter()
    }

    pub(crate) const fn resolved(&self) -> Option<&ServiceInfo> {
        self.resolved.as_ref()
    }

    pub(crate) fn resolved_mut(&mut self) -> Option<&mut ServiceInfo> {
        self.resolved.as_mut()
    }

    pub(crate) fn stage_resolution(&mut self) {
        self.resolved = Some(ServiceInfo::default());
    }

    pub(crate) fn clear_resolution(&mut self) -> Option<ServiceInfo> {
        self.resolved.take()
    }

    pub(crate) const fn is_legacy(&self) -> bool {
        self.legacy
    }

    pub(crate) const fn set_legacy(&mut self) {
        self.legacy = true;
    }
}
