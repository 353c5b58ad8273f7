use connd_actor::ActorError;
use thiserror::Error;

use crate::network::{Capability, NetworkId};
use crate::request::RequestId;

/// Errors reported to callers of the arbitration API.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The request names a capability only the engine may set.
    #[error("capability {capability} is set by the engine and cannot be requested")]
    MutableCapability {
        /// Offending capability.
        capability: Capability,
    },
    /// No request with this identifier is filed.
    #[error("request {request} is not registered")]
    UnknownRequest {
        /// Identifier looked up.
        request: RequestId,
    },
    /// No network with this identifier is registered.
    #[error("network {network} is not registered")]
    UnknownNetwork {
        /// Identifier looked up.
        network: NetworkId,
    },
    /// The arbitration worker has stopped.
    #[error("arbitration service stopped")]
    ServiceStopped(#[from] ActorError),
}
