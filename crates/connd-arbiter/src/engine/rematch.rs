use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::record::{NetworkRecord, PairState};
use super::{Arbiter, ENGINE_TARGET, TimerKey};
use crate::callback::CallbackEvent;
use crate::network::{Lifecycle, NetworkId};
use crate::request::{RequestId, RequestKind};

type Switch = (RequestId, Option<NetworkId>, Option<NetworkId>);

impl Arbiter {
    /// Recomputes every request's winner and applies the consequences:
    /// callbacks, lingering, reaping, factory offers and the default
    /// broadcast.
    pub(super) fn rematch(&mut self, now: Instant) {
        let previously_serving: BTreeSet<NetworkId> = self
            .networks
            .values()
            .filter(|record| !record.serving.is_empty())
            .map(|record| record.id)
            .collect();

        let mut switches: Vec<Switch> = Vec::new();
        let keep_alive: Vec<RequestId> = self
            .requests
            .values()
            .filter(|entry| entry.request.kind.keeps_alive())
            .map(|entry| entry.request.id)
            .collect();
        for request in keep_alive {
            let best = self.best_network_for(request);
            let Some(entry) = self.requests.get_mut(&request) else {
                continue;
            };
            let current = entry.satisfier;
            if best == current {
                continue;
            }
            entry.satisfier = best;
            if let Some(record) = current.and_then(|old| self.networks.get_mut(&old)) {
                record.serving.remove(&request);
            }
            if let Some(record) = best.and_then(|new| self.networks.get_mut(&new)) {
                record.serving.insert(request);
            }
            switches.push((request, current, best));
        }

        let default = self.active_network();
        for entry in self.requests.values_mut() {
            if entry.request.kind == RequestKind::TrackDefault && entry.satisfier != default {
                switches.push((entry.request.id, entry.satisfier, default));
                entry.satisfier = default;
            }
        }

        let mut reap = Vec::new();
        let eligible: Vec<NetworkId> = self
            .networks
            .values()
            .filter(|record| record.lifecycle.is_eligible())
            .map(|record| record.id)
            .collect();
        for network in eligible {
            let Some(record) = self.networks.get(&network) else {
                continue;
            };
            let lingering = record.lifecycle == Lifecycle::Lingering;
            if !record.serving.is_empty() {
                if lingering {
                    self.unlinger(network);
                }
            } else if lingering {
                continue;
            } else if previously_serving.contains(&network) && record.last_validated {
                self.start_linger(network, now);
            } else if self.is_unneeded(record) {
                reap.push(network);
            }
        }

        for (request, old, new) in switches {
            self.notify_switch(request, old, new, now);
        }
        self.update_listens(now);
        self.close_stale_losing();
        self.evaluate_factories();

        let default = self.active_network();
        if default != self.current_default.as_ref().map(|current| current.network) {
            self.announce_default(default);
        }

        for network in reap {
            let still_unneeded = self.networks.get(&network).is_some_and(|record| {
                record.lifecycle.is_eligible()
                    && record.lifecycle != Lifecycle::Lingering
                    && self.is_unneeded(record)
            });
            if still_unneeded {
                self.teardown(network, "unneeded", now);
            }
        }
        self.sync_dns();
    }

    fn best_network_for(&self, request: RequestId) -> Option<NetworkId> {
        let entry = self.requests.get(&request)?;
        let is_default = entry.request.kind == RequestKind::Default;
        self.networks
            .values()
            .filter(|record| {
                record.lifecycle.is_eligible()
                    && entry.request.capabilities.satisfied_by(&record.capabilities)
            })
            .max_by(|left, right| self.rank(left, right, entry.satisfier, is_default))
            .map(|record| record.id)
    }

    /// Orders two candidates for one request; `Greater` means `left` wins.
    fn rank(
        &self,
        left: &NetworkRecord,
        right: &NetworkRecord,
        current: Option<NetworkId>,
        is_default: bool,
    ) -> Ordering {
        if is_default {
            if let Some(preferred) = self.preference {
                let ordering = (left.info.legacy_type == preferred)
                    .cmp(&(right.info.legacy_type == preferred));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            if self.settings.single_default_mode {
                let ordering = self
                    .legacy
                    .priority(left.info.legacy_type)
                    .cmp(&self.legacy.priority(right.info.legacy_type));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
        left.effective_score(false)
            .cmp(&right.effective_score(false))
            .then_with(|| (Some(left.id) == current).cmp(&(Some(right.id) == current)))
            .then_with(|| left.transport_rank().cmp(&right.transport_rank()))
            .then_with(|| right.id.cmp(&left.id))
    }

    /// Whether no keep-alive request could ever pick `record`.
    fn is_unneeded(&self, record: &NetworkRecord) -> bool {
        if !record.serving.is_empty() {
            return false;
        }
        let potential = record.effective_score(true);
        for entry in self.requests.values() {
            if !entry.request.kind.keeps_alive()
                || !entry.request.capabilities.satisfied_by(&record.capabilities)
            {
                continue;
            }
            let winner = entry
                .satisfier
                .and_then(|network| self.networks.get(&network));
            match winner {
                Some(winner) if winner.effective_score(false) > potential => {}
                _ => return false,
            }
        }
        true
    }

    fn start_linger(&mut self, network: NetworkId, now: Instant) {
        let deadline = now + self.settings.linger_delay;
        let Some(record) = self.networks.get_mut(&network) else {
            return;
        };
        record.lifecycle = Lifecycle::Lingering;
        record.linger_deadline = Some(deadline);
        let key = TimerKey::Linger(network);
        self.timers.cancel(&key);
        self.timers.schedule(key, deadline, key);
        info!(
            target: ENGINE_TARGET,
            network = %network,
            linger_ms = duration_ms(self.settings.linger_delay),
            "network lingering"
        );
    }

    fn unlinger(&mut self, network: NetworkId) {
        let Some(record) = self.networks.get_mut(&network) else {
            return;
        };
        record.lifecycle = Lifecycle::Connected;
        record.linger_deadline = None;
        self.timers.cancel(&TimerKey::Linger(network));
        info!(target: ENGINE_TARGET, network = %network, "network no longer lingering");
    }

    fn linger_left(&self, network: NetworkId, now: Instant) -> Option<Duration> {
        self.networks
            .get(&network)
            .filter(|record| record.lifecycle == Lifecycle::Lingering)
            .and_then(|record| record.linger_deadline)
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    fn notify_switch(
        &mut self,
        request: RequestId,
        old: Option<NetworkId>,
        new: Option<NetworkId>,
        now: Instant,
    ) {
        let linger_left = old.and_then(|network| self.linger_left(network, now));
        let Some(entry) = self.requests.get_mut(&request) else {
            return;
        };
        if let Some(old) = old {
            match (entry.pairs.get(&old).copied(), linger_left) {
                (Some(PairState::Available), Some(left)) => {
                    entry.pairs.insert(old, PairState::Losing);
                    entry.notify(&CallbackEvent::Losing {
                        network: old,
                        max_ms_to_live: duration_ms(left),
                    });
                }
                (Some(_), None) => {
                    entry.pairs.remove(&old);
                    entry.notify(&CallbackEvent::Lost { network: old });
                }
                (Some(PairState::Losing), Some(_)) | (None, _) => {}
            }
        }
        if let Some(new) = new {
            if entry.pairs.insert(new, PairState::Available).is_none() {
                entry.ever_satisfied = true;
                self.timers.cancel(&TimerKey::RequestTimeout(request));
                debug!(target: ENGINE_TARGET, request = %request, network = %new, "request satisfied");
                entry.notify(&CallbackEvent::Available { network: new });
            }
        }
    }

    /// Brings every listen's pairs in line with the networks matching it.
    fn update_listens(&mut self, now: Instant) {
        for entry in self.requests.values_mut() {
            if entry.request.kind != RequestKind::Listen {
                continue;
            }
            for record in self.networks.values() {
                let matches = record.lifecycle.is_eligible()
                    && entry.request.capabilities.satisfied_by(&record.capabilities);
                let lingering = record
                    .linger_deadline
                    .filter(|_| record.lifecycle == Lifecycle::Lingering);
                let network = record.id;
                match (entry.pairs.get(&network).copied(), matches) {
                    (None, true) => {
                        entry.pairs.insert(network, PairState::Available);
                        entry.notify(&CallbackEvent::Available { network });
                    }
                    (Some(_), false) => {
                        entry.pairs.remove(&network);
                        entry.notify(&CallbackEvent::Lost { network });
                    }
                    (Some(PairState::Losing), true) if lingering.is_none() => {
                        entry.pairs.insert(network, PairState::Available);
                    }
                    _ => {}
                }
            }
            for record in self.networks.values() {
                let Some(deadline) = record
                    .linger_deadline
                    .filter(|_| record.lifecycle == Lifecycle::Lingering)
                else {
                    continue;
                };
                if entry.pairs.get(&record.id) == Some(&PairState::Available) {
                    entry.pairs.insert(record.id, PairState::Losing);
                    entry.notify(&CallbackEvent::Losing {
                        network: record.id,
                        max_ms_to_live: duration_ms(deadline.saturating_duration_since(now)),
                    });
                }
            }
        }
    }

    /// Closes `Losing` pairs whose network stopped lingering without
    /// becoming the request's winner again.
    fn close_stale_losing(&mut self) {
        for entry in self.requests.values_mut() {
            if entry.request.kind == RequestKind::Listen {
                continue;
            }
            let stale: Vec<NetworkId> = entry
                .pairs
                .iter()
                .filter(|(network, state)| {
                    **state == PairState::Losing
                        && entry.satisfier != Some(**network)
                        && self
                            .networks
                            .get(network)
                            .is_none_or(|record| record.lifecycle != Lifecycle::Lingering)
                })
                .map(|(network, _)| *network)
                .collect();
            for network in stale {
                entry.pairs.remove(&network);
                entry.notify(&CallbackEvent::Lost { network });
            }
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
