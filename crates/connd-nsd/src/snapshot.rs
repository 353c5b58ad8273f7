use serde::Serialize;

use crate::client::{ClientId, ListenerKey, RequestKind, TransactionId};
use crate::machine::NsdState;
use crate::manager::ListenerKind;

/// Point-in-time view of the discovery machine for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NsdSnapshot {
    pub state: NsdState,
    pub daemon_started: bool,
    pub monitoring_sockets: bool,
    pub legacy_clients: usize,
    /// Whether an idle shutdown of the daemon is scheduled.
    pub cleanup_pending: bool,
    pub clients: Vec<ClientSnapshot>,
}

impl NsdSnapshot {
    /// Snapshot of one client.
    #[must_use]
    pub fn client(&self, client: ClientId) -> Option<&ClientSnapshot> {
        self.clients.iter().find(|snapshot| snapshot.client == client)
    }

    /// Number of transactions in flight across all clients.
    #[must_use]
    pub fn active_requests(&self) -> usize {
        self.clients.iter().map(|client| client.requests.len()).sum()
    }
}

/// One client's outstanding work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientSnapshot {
    pub client: ClientId,
    pub legacy: bool,
    /// A daemon resolution is staged.
    pub resolving: bool,
    pub requests: Vec<RequestSnapshot>,
}

impl ClientSnapshot {
    /// The request filed under `key`.
    #[must_use]
    pub fn request(&self, key: ListenerKey) -> Option<&RequestSnapshot> {
        self.requests.iter().find(|request| request.key == key)
    }
}

/// One outstanding request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestSnapshot {
    pub key: ListenerKey,
    pub transaction: TransactionId,
    pub kind: RequestKind,
    /// Manager listener serving the request, when not the daemon.
    pub listener: Option<ListenerKind>,
}
