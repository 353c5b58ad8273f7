use serde::Serialize;
use strum::Display;

use crate::client::ListenerKey;
use crate::info::ServiceInfo;

/// Failure codes reported to discovery clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NsdFailure {
    /// The request could not be carried out.
    InternalError = 0,
    /// A resolution is already in progress for this client.
    AlreadyActive = 3,
    /// The client has too many outstanding requests.
    MaxLimit = 4,
}

impl NsdFailure {
    /// Numeric code on the client wire.
    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }
}

/// Receives results for one client's requests.
///
/// Every method is called on the discovery worker and must not block.
pub trait ClientCallback: Send + Sync {
    /// Discovery for `service_type` is running.
    fn on_discover_services_started(&self, key: ListenerKey, service_type: &str);
    /// Discovery could not start or stopped with an error.
    fn on_discover_services_failed(&self, key: ListenerKey, failure: NsdFailure);
    /// A matching service appeared.
    fn on_service_found(&self, key: ListenerKey, info: &ServiceInfo);
    /// A previously found service went away.
    fn on_service_lost(&self, key: ListenerKey, info: &ServiceInfo);
    /// Discovery was stopped.
    fn on_stop_discovery_succeeded(&self, key: ListenerKey);
    /// Discovery could not be stopped.
    fn on_stop_discovery_failed(&self, key: ListenerKey, failure: NsdFailure);
    /// The service is being advertised.
    fn on_register_service_succeeded(&self, key: ListenerKey, info: &ServiceInfo);
    /// The service could not be advertised.
    fn on_register_service_failed(&self, key: ListenerKey, failure: NsdFailure);
    /// Advertising stopped.
    fn on_unregister_service_succeeded(&self, key: ListenerKey);
    /// Advertising could not be stopped.
    fn on_unregister_service_failed(&self, key: ListenerKey, failure: NsdFailure);
    /// The service was resolved to a host and port.
    fn on_resolve_service_succeeded(&self, key: ListenerKey, info: &ServiceInfo);
    /// Resolution failed.
    fn on_resolve_service_failed(&self, key: ListenerKey, failure: NsdFailure);
    /// A pending resolution was abandoned.
    fn on_stop_resolution_succeeded(&self, key: ListenerKey);
    /// No resolution was pending under `key`.
    fn on_stop_resolution_failed(&self, key: ListenerKey, failure: NsdFailure);
}

/// Told whenever discovery becomes available or unavailable.
pub trait StateObserver: Send + Sync {
    /// Called on every transition into or out of the enabled state.
    fn on_discovery_state_changed(&self, enabled: bool);
}

/// Observer that ignores state changes.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl StateObserver for NullObserver {
    fn on_discovery_state_changed(&self, _enabled: bool) {}
}
