//! Requests for networks and the validation applied when they are filed.

use std::fmt;

use serde::Serialize;
use strum::Display;

use crate::error::RequestError;
use crate::network::{Capability, CapabilitySet, NetworkCapabilities};

/// Identifier of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct RequestId(u32);

impl RequestId {
    /// Identifier of the built-in default request.
    pub const DEFAULT: Self = Self(1);

    /// Wraps a raw identifier.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw identifier value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// How a request relates to the networks that match it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// The system default request; keeps its winner alive.
    Default,
    /// An application request; keeps its winner alive.
    Request,
    /// Observes every matching network without keeping any alive.
    Listen,
    /// Follows whichever network serves the default request.
    TrackDefault,
}

impl RequestKind {
    /// Whether requests of this kind keep their winner alive.
    #[must_use]
    pub const fn keeps_alive(self) -> bool {
        matches!(self, Self::Default | Self::Request)
    }
}

/// Process that filed a request. Used for attribution and to release its
/// requests when it dies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Owner {
    /// User id of the caller.
    pub uid: u32,
    /// Process id of the caller.
    pub pid: u32,
}

impl Owner {
    /// Owner for `uid`/`pid`.
    #[must_use]
    pub const fn new(uid: u32, pid: u32) -> Self {
        Self { uid, pid }
    }

    /// Owner used for requests the engine files on its own behalf.
    #[must_use]
    pub const fn system() -> Self {
        Self { uid: 1000, pid: 0 }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}/{}", self.uid, self.pid)
    }
}

/// A request as seen by factories and snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkRequest {
    /// Request identifier.
    pub id: RequestId,
    /// Request kind.
    pub kind: RequestKind,
    /// Capabilities the request needs.
    pub capabilities: NetworkCapabilities,
    /// Legacy network type for requests made through the feature API.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legacy_type: Option<i32>,
}

impl NetworkRequest {
    /// The capabilities of the system default request.
    #[must_use]
    pub fn default_capabilities() -> NetworkCapabilities {
        NetworkCapabilities::new()
            .with_capability(Capability::Internet)
            .with_capability(Capability::NotRestricted)
    }
}

/// Checks and completes the capabilities of a keep-alive request.
///
/// Adds `NOT_RESTRICTED` unless the request asks for a restricted-only
/// capability.
///
/// # Errors
///
/// Returns [`RequestError::MutableCapability`] when the request names a
/// capability only the engine may set.
pub fn prepare_request(mut capabilities: NetworkCapabilities) -> Result<NetworkCapabilities, RequestError> {
    if let Some(capability) = Capability::MUTABLE
        .iter()
        .find(|capability| capabilities.has(**capability))
    {
        return Err(RequestError::MutableCapability {
            capability: *capability,
        });
    }
    if !capabilities.requests_restricted() {
        capabilities.capabilities.insert(CapabilitySet::NOT_RESTRICTED);
    }
    Ok(capabilities)
}
