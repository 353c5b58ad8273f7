use std::cmp::Reverse;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use super::record::RequestEntry;
use super::{Arbiter, ENGINE_TARGET, FeatureUser, TimerKey};
use crate::callback::{BroadcastKind, ConnectivityBroadcast, NullCallback};
use crate::legacy::FeatureStatus;
use crate::network::{Lifecycle, NetworkId, NetworkState};
use crate::request::{NetworkRequest, Owner, RequestId, RequestKind, prepare_request};

impl Arbiter {
    /// Sets the preferred legacy type for default traffic. Types that
    /// cannot carry default traffic are ignored.
    pub fn set_network_preference(&mut self, network_type: i32, now: Instant) {
        if !self.legacy.is_default(network_type) {
            warn!(target: ENGINE_TARGET, network_type, "ignoring preference for non-default type");
            return;
        }
        if self.preference == Some(network_type) {
            return;
        }
        info!(target: ENGINE_TARGET, network_type, "network preference changed");
        self.preference = Some(network_type);
        if self.settings.single_default_mode {
            self.enforce_preference(network_type, now);
        }
        self.rematch(now);
    }

    /// Tears down other default-capable networks while the preferred type
    /// is available but not yet connected.
    fn enforce_preference(&mut self, preferred: i32, now: Instant) {
        let preferred_records: Vec<Lifecycle> = self
            .networks
            .values()
            .filter(|record| record.info.legacy_type == preferred)
            .map(|record| record.lifecycle)
            .collect();
        if preferred_records.is_empty() || preferred_records.iter().any(|lifecycle| lifecycle.is_eligible()) {
            return;
        }
        let others: Vec<NetworkId> = self
            .networks
            .values()
            .filter(|record| {
                record.lifecycle.is_eligible() && self.legacy.is_default(record.info.legacy_type)
            })
            .map(|record| record.id)
            .collect();
        for network in others {
            self.teardown(network, "preferred network available", now);
        }
    }

    /// Applies the single-default policy when `network` connects: the
    /// loser of the priority comparison with the current default is torn
    /// down.
    pub(super) fn enforce_single_default(&mut self, network: NetworkId, now: Instant) {
        if !self.settings.single_default_mode {
            return;
        }
        let Some(new_type) = self.networks.get(&network).map(|record| record.info.legacy_type) else {
            return;
        };
        if !self.legacy.is_default(new_type) {
            return;
        }
        let Some(active) = self.active_network().filter(|active| *active != network) else {
            return;
        };
        let Some(active_type) = self.networks.get(&active).map(|record| record.info.legacy_type) else {
            return;
        };
        if active_type == new_type {
            return;
        }
        let preference = self.preference;
        let new_loses = (preference != Some(new_type)
            && self.legacy.priority(active_type) > self.legacy.priority(new_type))
            || preference == Some(active_type);
        if new_loses {
            self.teardown(network, "lower priority than the default network", now);
        } else if !self.teardown(active, "replaced by a higher priority default network", now) {
            warn!(
                target: ENGINE_TARGET,
                network = %network,
                active = %active,
                "previous default stays up"
            );
        }
    }

    /// Handles a connection attempt that failed before connecting.
    pub(super) fn connection_failed(&mut self, network: NetworkId, now: Instant) {
        let Some(record) = self.networks.get(&network) else {
            return;
        };
        let failed = record.broadcast_network();
        let candidate = self.failover_candidate(network);
        let broadcast = ConnectivityBroadcast {
            kind: BroadcastKind::ConnectionFailed,
            network: failed,
            other_network: candidate
                .and_then(|candidate| self.networks.get(&candidate))
                .map(|record| record.broadcast_network()),
            no_connectivity: self.active_network().is_none(),
            is_failover: false,
        };
        warn!(target: ENGINE_TARGET, network = %network, "connection attempt failed");
        self.send_broadcast(broadcast);
        self.request_reconnect(candidate);
        self.network_gone(network, now);
    }

    /// Broadcasts a change of default network.
    pub(super) fn announce_default(&mut self, default: Option<NetworkId>) {
        let previous = self.current_default.take();
        let failover = self.failover_pending;
        match default.and_then(|network| self.networks.get(&network)) {
            Some(record) => {
                let network = record.broadcast_network();
                self.current_default = Some(network.clone());
                self.send_broadcast(ConnectivityBroadcast {
                    kind: BroadcastKind::Connected,
                    network,
                    other_network: None,
                    no_connectivity: false,
                    is_failover: failover && previous.is_some(),
                });
            }
            None => {
                let Some(mut lost) = previous else {
                    return;
                };
                lost.state = NetworkState::Disconnected;
                let candidate = self.failover_candidate(lost.network);
                let other_network = candidate
                    .and_then(|candidate| self.networks.get(&candidate))
                    .map(|record| record.broadcast_network());
                self.send_broadcast(ConnectivityBroadcast {
                    kind: BroadcastKind::Disconnected,
                    network: lost,
                    no_connectivity: other_network.is_none(),
                    other_network,
                    is_failover: failover,
                });
                self.request_reconnect(candidate);
            }
        }
    }

    /// Default-capable network to fall back to: the preferred type when
    /// present, otherwise the highest priority one.
    fn failover_candidate(&self, excluded: NetworkId) -> Option<NetworkId> {
        self.networks
            .values()
            .filter(|record| {
                record.id != excluded
                    && record.lifecycle != Lifecycle::Failed
                    && self.legacy.is_default(record.info.legacy_type)
            })
            .max_by_key(|record| {
                (
                    self.preference == Some(record.info.legacy_type),
                    self.legacy.priority(record.info.legacy_type),
                    Reverse(record.id),
                )
            })
            .map(|record| record.id)
    }

    fn request_reconnect(&self, candidate: Option<NetworkId>) {
        let Some(record) = candidate.and_then(|candidate| self.networks.get(&candidate)) else {
            return;
        };
        if !record.lifecycle.is_eligible() {
            info!(target: ENGINE_TARGET, network = %record.id, "failing over");
            record.agent.on_reconnect_requested(record.id);
        }
    }

    /// Files a keep-alive request for a legacy feature such as MMS and arms
    /// its restore timer.
    pub fn start_using_network_feature(
        &mut self,
        owner: Owner,
        network_type: i32,
        feature: &str,
        now: Instant,
    ) -> FeatureStatus {
        let (capabilities, legacy_type) = match self.legacy.feature_request(network_type, feature) {
            Ok(request) => request,
            Err(status) => {
                info!(target: ENGINE_TARGET, owner = %owner, network_type, feature, %status, "feature refused");
                return status;
            }
        };
        let deadline = now + self.settings.restore_delay;
        let existing = self.feature_users.iter().find(|user| {
            user.owner == owner && user.network_type == network_type && user.feature == feature
        });
        if let Some(user) = existing {
            let key = TimerKey::RestoreFeature(user.request);
            self.timers.cancel(&key);
            self.timers.schedule(key, deadline, key);
            return self.feature_status(user.request);
        }

        let Ok(capabilities) = prepare_request(capabilities) else {
            return FeatureStatus::RequestFailed;
        };
        let request = self.ids.next_request();
        let entry = RequestEntry::new(
            NetworkRequest {
                id: request,
                kind: RequestKind::Request,
                capabilities,
                legacy_type: Some(legacy_type),
            },
            owner,
            Arc::new(NullCallback),
        );
        self.requests.insert(request, entry);
        self.feature_users.push(FeatureUser {
            owner,
            network_type,
            feature: feature.to_owned(),
            request,
        });
        let key = TimerKey::RestoreFeature(request);
        self.timers.schedule(key, deadline, key);
        info!(target: ENGINE_TARGET, owner = %owner, network_type, feature, request = %request, "feature started");
        self.rematch(now);
        self.feature_status(request)
    }

    fn feature_status(&self, request: RequestId) -> FeatureStatus {
        let served = self
            .requests
            .get(&request)
            .and_then(|entry| entry.satisfier)
            .is_some();
        if served {
            FeatureStatus::AlreadyActive
        } else {
            FeatureStatus::RequestStarted
        }
    }

    /// Releases a legacy feature request. Returns `false` when none was
    /// active.
    pub fn stop_using_network_feature(
        &mut self,
        owner: Owner,
        network_type: i32,
        feature: &str,
        now: Instant,
    ) -> bool {
        let found = self.feature_users.iter().find(|user| {
            user.owner == owner && user.network_type == network_type && user.feature == feature
        });
        let Some(request) = found.map(|user| user.request) else {
            return false;
        };
        info!(target: ENGINE_TARGET, owner = %owner, network_type, feature, "feature stopped");
        self.release_request(request, now)
    }

    pub(super) fn restore_feature(&mut self, request: RequestId, now: Instant) {
        if !self.feature_users.iter().any(|user| user.request == request) {
            return;
        }
        info!(target: ENGINE_TARGET, request = %request, "restoring default network");
        self.release_request(request, now);
    }
}
