//! mDNS service discovery for connd.
//!
//! Clients discover, advertise and resolve services through an
//! [`NsdHandle`]. The [`NsdMachine`] behind it multiplexes every client's
//! requests onto one native resolver daemon, or onto an installed
//! [`DiscoveryManager`], correlating backend results through global
//! transaction ids. The daemon is started on demand and stopped after a
//! quiet period.

mod callback;
mod client;
mod daemon;
mod error;
pub mod event;
mod info;
mod interface;
mod machine;
mod manager;
mod service;
pub mod service_type;
mod snapshot;

pub(crate) const NSD_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::nsd");

pub use callback::{ClientCallback, NsdFailure, NullObserver, StateObserver};
pub use client::{
    Backend, ClientId, ClientIds, ClientRequest, ListenerKey, RequestKind, TransactionId,
    TransactionIds,
};
pub use daemon::{CommandFeedback, LOCAL_DOMAIN, MdnsCommand, MdnsDaemon, NativeMdnsDaemon};
pub use error::{BackendError, NsdError};
pub use event::{MdnsEvent, MdnsEventError, MdnsEventKind};
pub use info::{NetId, ServiceInfo, encode_txt};
pub use interface::{InterfaceLookup, NoInterfaces};
pub use machine::{NsdCommand, NsdMachine, NsdSettings, NsdState};
pub use manager::{
    DiscoveryManager, ListenerKind, ManagerEvent, ManagerEventKind, ManagerListener,
    MdnsServiceRecord,
};
pub use service::{NSD_THREAD, NsdHandle, NsdMessage, NsdRelay, NsdService};
pub use snapshot::{ClientSnapshot, NsdSnapshot, RequestSnapshot};

#[cfg(test)]
mod tests;
