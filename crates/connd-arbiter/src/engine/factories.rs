use std::sync::Arc;

use tracing::{debug, info};

use super::{Arbiter, ENGINE_TARGET};
use crate::network::NetworkCapabilities;
use crate::provider::{FactoryId, NetworkFactory, ProviderId};
use crate::request::NetworkRequest;

/// Everything a provider supplies when registering a factory.
#[derive(Clone)]
pub struct FactoryRegistration {
    /// Process owning the factory.
    pub provider: ProviderId,
    /// Name used in logs and snapshots.
    pub name: String,
    /// Capabilities the factory's networks can offer.
    pub filter: NetworkCapabilities,
    /// Score filter: requests already served at this score or better are
    /// not offered.
    pub score: i32,
    /// Provider-side proxy.
    pub factory: Arc<dyn NetworkFactory>,
}

pub(crate) struct FactoryEntry {
    pub(crate) provider: ProviderId,
    pub(crate) name: String,
    pub(crate) filter: NetworkCapabilities,
    pub(crate) score: i32,
    pub(crate) factory: Arc<dyn NetworkFactory>,
}

impl Arbiter {
    /// Registers a factory and offers it the outstanding requests.
    pub fn register_factory(&mut self, id: FactoryId, registration: FactoryRegistration) {
        info!(
            target: ENGINE_TARGET,
            factory = %id,
            name = %registration.name,
            score = registration.score,
            "factory registered"
        );
        self.factories.insert(
            id,
            FactoryEntry {
                provider: registration.provider,
                name: registration.name,
                filter: registration.filter,
                score: registration.score,
                factory: registration.factory,
            },
        );
        self.evaluate_factories();
    }

    /// Changes the score filter of a factory.
    pub fn set_factory_score(&mut self, id: FactoryId, score: i32) {
        let Some(entry) = self.factories.get_mut(&id) else {
            return;
        };
        entry.score = score;
        self.evaluate_factories();
    }

    /// Removes a factory, releasing every request it was asked to serve.
    pub fn unregister_factory(&mut self, id: FactoryId) {
        let Some(entry) = self.factories.remove(&id) else {
            return;
        };
        let needed: Vec<_> = self
            .factory_needs
            .iter()
            .filter(|(factory, _)| *factory == id)
            .map(|(_, request)| *request)
            .collect();
        for request in needed {
            self.factory_needs.remove(&(id, request));
            if let Some(request) = self.requests.get(&request) {
                entry.factory.release_network_for(&request.request);
            }
        }
        info!(target: ENGINE_TARGET, factory = %id, name = %entry.name, "factory unregistered");
    }

    /// Moves every (factory, request) pair to the state the current scores
    /// call for, calling need or release on each change.
    pub(super) fn evaluate_factories(&mut self) {
        for (id, factory) in &self.factories {
            for entry in self.requests.values() {
                if !entry.request.kind.keeps_alive() {
                    continue;
                }
                let score = entry
                    .satisfier
                    .and_then(|network| self.networks.get(&network))
                    .map_or(0, |record| record.effective_score(false));
                let wants = score < factory.score
                    && entry.request.capabilities.can_be_provided_by(&factory.filter)
                    && factory.factory.accept_request(&entry.request, score);
                let key = (*id, entry.request.id);
                let needed = self.factory_needs.contains(&key);
                if wants && !needed {
                    self.factory_needs.insert(key);
                    debug!(target: ENGINE_TARGET, factory = %id, request = %entry.request.id, score, "need network");
                    factory.factory.need_network_for(&entry.request, score);
                } else if !wants && needed {
                    self.factory_needs.remove(&key);
                    debug!(target: ENGINE_TARGET, factory = %id, request = %entry.request.id, score, "release network");
                    factory.factory.release_network_for(&entry.request);
                }
            }
        }
    }

    pub(super) fn release_factories_for(&mut self, request: &NetworkRequest) {
        let needed: Vec<FactoryId> = self
            .factory_needs
            .iter()
            .filter(|(_, needed)| *needed == request.id)
            .map(|(factory, _)| *factory)
            .collect();
        for factory in needed {
            self.factory_needs.remove(&(factory, request.id));
            if let Some(entry) = self.factories.get(&factory) {
                entry.factory.release_network_for(request);
            }
        }
    }
}
