use std::net::IpAddr;
use std::time::Instant;

use tracing::{debug, error, warn};

use super::{MACHINE_TARGET, NsdMachine};
use crate::callback::{ClientCallback, NsdFailure};
use crate::client::{Backend, ClientId, ClientRequest, ListenerKey, RequestKind, TransactionId};
use crate::daemon::MdnsCommand;
use crate::event::{AddressInfo, FoundService, MdnsEvent, MdnsEventKind, ResolvedService};
use crate::info::{NetId, ServiceInfo};
use crate::manager::{ListenerKind, ManagerEvent, ManagerEventKind, MdnsServiceRecord};
use crate::service_type::split_full_name;

impl NsdMachine {
    pub(super) fn handle_daemon_event(&mut self, event: MdnsEvent, now: Instant) {
        let transaction = event.transaction;
        let Some((client, key, _)) = self.owner_of(transaction) else {
            debug!(target: MACHINE_TARGET, %transaction, "no client mapping; event dropped");
            return;
        };
        let Some(callback) = self.clients.get(&client).map(|info| info.callback()) else {
            return;
        };
        let callback = callback.as_ref();

        match event.kind {
            MdnsEventKind::ServiceFound(found) => {
                if found.net_id == NetId::UNSET {
                    debug!(target: MACHINE_TARGET, %transaction, name = %found.name, "service without a network ignored");
                    return;
                }
                callback.on_service_found(key, &found_service_info(found));
            }
            MdnsEventKind::ServiceLost(found) => {
                callback.on_service_lost(key, &found_service_info(found));
            }
            MdnsEventKind::DiscoveryFailed => {
                callback.on_discover_services_failed(key, NsdFailure::InternalError);
            }
            MdnsEventKind::ServiceRegistered { name } => {
                callback.on_register_service_succeeded(key, &ServiceInfo::new(name, ""));
            }
            MdnsEventKind::RegistrationFailed => {
                callback.on_register_service_failed(key, NsdFailure::InternalError);
            }
            MdnsEventKind::ServiceUpdated | MdnsEventKind::ServiceUpdateFailed => {
                debug!(target: MACHINE_TARGET, %transaction, "registration update reported");
            }
            MdnsEventKind::ServiceResolved(resolved) => {
                self.service_resolved(client, key, transaction, resolved, callback, now);
            }
            MdnsEventKind::ResolutionFailed => {
                self.submit(MdnsCommand::StopResolve { transaction });
                self.abandon_resolution(client, key, callback, now);
            }
            MdnsEventKind::GetAddrFailed => {
                self.submit(MdnsCommand::StopGetAddrInfo { transaction });
                self.abandon_resolution(client, key, callback, now);
            }
            MdnsEventKind::GetAddrSucceeded(address) => {
                self.address_resolved(client, key, address, callback);
                self.submit(MdnsCommand::StopGetAddrInfo { transaction });
                self.remove_request(client, key, now);
                if let Some(info) = self.clients.get_mut(&client) {
                    info.clear_resolution();
                }
            }
        }
    }

    pub(super) fn handle_command_failure(&mut self, command: MdnsCommand, now: Instant) {
        let kind = match &command {
            MdnsCommand::Discover { .. } => MdnsEventKind::DiscoveryFailed,
            MdnsCommand::Register { .. } => MdnsEventKind::RegistrationFailed,
            MdnsCommand::Resolve { .. } => MdnsEventKind::ResolutionFailed,
            MdnsCommand::GetAddrInfo { .. } => MdnsEventKind::GetAddrFailed,
            other => {
                debug!(target: MACHINE_TARGET, command = ?other, "failed command needs no client reply");
                return;
            }
        };
        let Some(transaction) = command.transaction() else {
            return;
        };
        self.handle_daemon_event(MdnsEvent::new(transaction, kind), now);
    }

    fn service_resolved(
        &mut self,
        client: ClientId,
        key: ListenerKey,
        transaction: TransactionId,
        resolved: ResolvedService,
        callback: &dyn ClientCallback,
        now: Instant,
    ) {
        let Some((name, service_type)) = split_full_name(&resolved.full_name) else {
            error!(target: MACHINE_TARGET, %transaction, full_name = %resolved.full_name, "invalid service found");
            return;
        };
        let Some(stage) = self
            .clients
            .get_mut(&client)
            .and_then(|info| info.resolved_mut())
        else {
            warn!(target: MACHINE_TARGET, %transaction, "resolution result without a staged record");
            return;
        };
        stage.name = name;
        stage.service_type = service_type;
        stage.port = resolved.port;
        stage.txt_record = resolved.txt_record;

        self.submit(MdnsCommand::StopResolve { transaction });
        self.remove_request(client, key, now);

        let lookup = self.ids.allocate();
        if self.submit(MdnsCommand::GetAddrInfo {
            transaction: lookup,
            hostname: resolved.hostname,
            interface_index: resolved.interface_index,
        }) {
            self.store_request(
                client,
                key,
                ClientRequest {
                    transaction: lookup,
                    kind: RequestKind::GetAddrInfo,
                    backend: Backend::Daemon,
                },
            );
        } else {
            callback.on_resolve_service_failed(key, NsdFailure::InternalError);
            if let Some(info) = self.clients.get_mut(&client) {
                info.clear_resolution();
            }
        }
    }

    fn address_resolved(
        &mut self,
        client: ClientId,
        key: ListenerKey,
        address: AddressInfo,
        callback: &dyn ClientCallback,
    ) {
        let host = address.address.parse::<IpAddr>().ok();
        let stage = self
            .clients
            .get_mut(&client)
            .and_then(|info| info.clear_resolution());
        match (host, stage) {
            (Some(host), Some(mut resolved)) if address.net_id != NetId::UNSET => {
                resolved.host = Some(host);
                resolved.attribute_network(address.net_id, address.interface_index);
                callback.on_resolve_service_succeeded(key, &resolved);
            }
            _ => {
                warn!(
                    target: MACHINE_TARGET,
                    %key,
                    address = %address.address,
                    net_id = %address.net_id,
                    "unusable address result"
                );
                callback.on_resolve_service_failed(key, NsdFailure::InternalError);
            }
        }
    }

    fn abandon_resolution(
        &mut self,
        client: ClientId,
        key: ListenerKey,
        callback: &dyn ClientCallback,
        now: Instant,
    ) {
        self.remove_request(client, key, now);
        if let Some(info) = self.clients.get_mut(&client) {
            info.clear_resolution();
        }
        callback.on_resolve_service_failed(key, NsdFailure::InternalError);
    }

    pub(super) fn handle_manager_event(&mut self, event: ManagerEvent, now: Instant) {
        let transaction = event.transaction;
        let Some((client, key, request)) = self.owner_of(transaction) else {
            error!(target: MACHINE_TARGET, %transaction, "manager event has no client mapping");
            return;
        };
        let Backend::Manager {
            listener,
            requested_type,
        } = request.backend
        else {
            warn!(target: MACHINE_TARGET, %transaction, "manager event for a daemon request");
            return;
        };
        let Some(callback) = self.clients.get(&client).map(|info| info.callback()) else {
            return;
        };

        match (listener.kind, event.kind) {
            (ListenerKind::Discovery, ManagerEventKind::NameDiscovered(record)) => {
                callback.on_service_found(key, &record_service_info(&record, &requested_type));
            }
            (ListenerKind::Discovery, ManagerEventKind::NameRemoved(record)) => {
                callback.on_service_lost(key, &record_service_info(&record, &requested_type));
            }
            (ListenerKind::Resolution, ManagerEventKind::ServiceFound(record)) => {
                let mut info = record_service_info(&record, &requested_type);
                info.service_type = format!(".{requested_type}");
                info.port = record.port;
                info = info.with_attributes(&record.attributes);
                let host = record
                    .ipv4_address
                    .as_deref()
                    .or(record.ipv6_address.as_deref())
                    .and_then(|address| address.parse::<IpAddr>().ok());
                if let Some(host) = host {
                    info.host = Some(host);
                    callback.on_resolve_service_succeeded(key, &info);
                } else {
                    error!(target: MACHINE_TARGET, %transaction, "invalid address in resolution result");
                    callback.on_resolve_service_failed(key, NsdFailure::InternalError);
                }
                self.unregister_listener(&listener);
                self.remove_request(client, key, now);
            }
            (kind, _) => {
                debug!(target: MACHINE_TARGET, %transaction, listener = %kind, "event not reported by this listener");
            }
        }
    }
}

fn found_service_info(found: FoundService) -> ServiceInfo {
    let mut info = ServiceInfo::new(found.name, found.service_type);
    info.attribute_network(found.net_id, found.interface_index);
    info
}

fn record_service_info(record: &MdnsServiceRecord, requested_type: &str) -> ServiceInfo {
    let mut info = ServiceInfo::new(record.instance_name.clone(), requested_type);
    info.attribute_network(record.network.unwrap_or(NetId::UNSET), record.interface_index);
    info
}
