//! Network arbitration for connd.
//!
//! Providers register networks through agents and factories; applications
//! file requests and listens. The [`Arbiter`] decides which network serves
//! which request, lingers and reaps networks nobody needs, and reports every
//! change through request callbacks and connectivity broadcasts. It is a
//! single-threaded state machine; [`ArbiterHandle`] runs it on a dedicated
//! worker and turns calls into mailbox messages.

mod callback;
mod engine;
mod error;
pub mod legacy;
mod network;
mod provider;
mod request;
mod service;
mod snapshot;

pub use callback::{
    BroadcastKind, BroadcastNetwork, BroadcastSink, CallbackEvent, ConnectivityBroadcast,
    DnsSink, NetworkCallback, NullCallback,
};
pub use engine::{
    AgentRegistration, Arbiter, ArbiterSettings, FactoryRegistration, Identifiers,
};
pub use error::RequestError;
pub use legacy::{FeatureStatus, LegacyTable};
pub use network::{
    Capability, CapabilitySet, Lifecycle, LinkProperties, NetworkCapabilities, NetworkId,
    NetworkInfo, NetworkMisc, NetworkState, ProbeResult, Transport, TransportSet,
};
pub use provider::{
    ConnectivityProbe, FactoryDelegate, FactoryId, NetworkAgent, NetworkFactory, NoopProbe,
    ProviderId, RefCountingFactory,
};
pub use request::{NetworkRequest, Owner, RequestId, RequestKind, prepare_request};
pub use service::{ARBITER_THREAD, ArbiterHandle, ArbiterMessage, ArbiterService};
pub use snapshot::{ArbiterSnapshot, FactorySnapshot, NetworkSnapshot, RequestSnapshot};

#[cfg(test)]
mod tests;
