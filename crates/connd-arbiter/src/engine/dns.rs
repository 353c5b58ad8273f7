//! Name server publication for default traffic and legacy feature users.

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

use tracing::debug;

use super::{Arbiter, ENGINE_TARGET};
use crate::network::NetworkId;

impl Arbiter {
    /// Publishes the name servers that changed since the last call.
    ///
    /// Default traffic uses the default network's servers. A process with
    /// feature requests uses the servers of the highest priority
    /// non-default network serving one of them, and loses its assignment
    /// once no such network remains.
    pub(super) fn sync_dns(&mut self) {
        let default = self
            .active_network()
            .map(|network| self.name_servers(network))
            .unwrap_or_default();
        if default != self.default_dns {
            debug!(target: ENGINE_TARGET, servers = ?default, "default name servers changed");
            self.dns.default_dns_changed(&default);
            self.default_dns = default;
        }

        let pids: BTreeSet<u32> = self.feature_users.iter().map(|user| user.owner.pid).collect();
        let wanted: BTreeMap<u32, Vec<IpAddr>> = pids
            .into_iter()
            .filter_map(|pid| Some((pid, self.feature_name_servers(pid)?)))
            .filter(|(_, servers)| !servers.is_empty())
            .collect();

        let withdrawn: Vec<u32> = self
            .pid_dns
            .keys()
            .filter(|pid| !wanted.contains_key(pid))
            .copied()
            .collect();
        for pid in withdrawn {
            debug!(target: ENGINE_TARGET, pid, "process name servers withdrawn");
            self.pid_dns.remove(&pid);
            self.dns.pid_dns_changed(pid, &[]);
        }
        for (pid, servers) in wanted {
            if self.pid_dns.get(&pid) == Some(&servers) {
                continue;
            }
            debug!(target: ENGINE_TARGET, pid, servers = ?servers, "process name servers changed");
            self.dns.pid_dns_changed(pid, &servers);
            self.pid_dns.insert(pid, servers);
        }
    }

    fn feature_name_servers(&self, pid: u32) -> Option<Vec<IpAddr>> {
        self.feature_users
            .iter()
            .filter(|user| user.owner.pid == pid)
            .filter_map(|user| {
                let entry = self.requests.get(&user.request)?;
                let legacy_type = entry.request.legacy_type?;
                if self.legacy.is_default(legacy_type) {
                    return None;
                }
                Some((self.legacy.priority(legacy_type), entry.satisfier?))
            })
            .max_by_key(|(priority, _)| *priority)
            .map(|(_, network)| self.name_servers(network))
    }

    fn name_servers(&self, network: NetworkId) -> Vec<IpAddr> {
        self.networks
            .get(&network)
            .map(|record| {
                record
                    .link_properties
                    .dns_servers
                    .iter()
                    .copied()
                    .filter(|server| !server.is_unspecified())
                    .collect()
            })
            .unwrap_or_default()
    }
}
