use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use super::{Dispatch, MACHINE_TARGET, NsdCommand, NsdMachine, NsdState};
use crate::callback::{ClientCallback, NsdFailure};
use crate::client::{Backend, ClientId, ClientRequest, ListenerKey, RequestKind, TransactionId};
use crate::daemon::MdnsCommand;
use crate::info::ServiceInfo;
use crate::manager::{ListenerKind, ManagerListener};
use crate::service_type::normalize_service_type;

impl NsdMachine {
    pub(super) fn enabled(&mut self, command: NsdCommand, now: Instant) -> Dispatch {
        match command {
            NsdCommand::SetEnabled(false) => self.transition(NsdState::Default, now),
            NsdCommand::SetEnabled(true) => {}
            NsdCommand::DiscoverServices {
                client,
                key,
                service,
            } => self.discover_services(client, key, &service, now),
            NsdCommand::StopDiscovery { client, key } => self.stop_discovery(client, key, now),
            NsdCommand::RegisterService {
                client,
                key,
                service,
            } => self.register_service(client, key, service, now),
            NsdCommand::UnregisterService { client, key } => {
                self.unregister_service(client, key, now);
            }
            NsdCommand::ResolveService {
                client,
                key,
                service,
            } => self.resolve_service(client, key, &service, now),
            NsdCommand::StopResolution { client, key } => self.stop_resolution(client, key, now),
            NsdCommand::DaemonEvent(event) => self.handle_daemon_event(event, now),
            NsdCommand::ManagerEvent(event) => self.handle_manager_event(event, now),
            NsdCommand::CommandFailed(command) => self.handle_command_failure(command, now),
            other => return Dispatch::Deferred(other),
        }
        Dispatch::Handled
    }

    fn client_callback(&self, client: ClientId) -> Option<Arc<dyn ClientCallback>> {
        let callback = self.clients.get(&client).map(|info| info.callback());
        if callback.is_none() {
            warn!(target: MACHINE_TARGET, %client, "request from unknown client");
        }
        callback
    }

    /// Whether `client` may file another discovery or registration.
    fn admits(&self, client: ClientId, key: ListenerKey) -> Result<(), NsdFailure> {
        let Some(info) = self.clients.get(&client) else {
            return Err(NsdFailure::InternalError);
        };
        if info.request(key).is_some() {
            warn!(target: MACHINE_TARGET, %client, %key, "listener key already in use");
            return Err(NsdFailure::InternalError);
        }
        if info.request_count() >= self.settings.max_requests_per_client {
            return Err(NsdFailure::MaxLimit);
        }
        Ok(())
    }

    /// Interface a daemon request for `service` binds to, 0 letting the
    /// daemon choose. `None` when the service pins a network whose
    /// interface cannot be found.
    fn daemon_interface(&self, service: &ServiceInfo) -> Option<u32> {
        let Some(network) = service.network else {
            return Some(service.interface_index.unwrap_or(0));
        };
        let index = self
            .interfaces
            .interface_index(network)
            .filter(|index| *index != 0);
        if index.is_none() {
            warn!(target: MACHINE_TARGET, %network, "no interface found for network");
        }
        index
    }

    fn pending(&self, client: ClientId, key: ListenerKey, kinds: &[RequestKind]) -> Option<ClientRequest> {
        self.clients
            .get(&client)?
            .request(key)
            .filter(|request| kinds.contains(&request.kind))
            .cloned()
    }

    fn discover_services(
        &mut self,
        client: ClientId,
        key: ListenerKey,
        service: &ServiceInfo,
        now: Instant,
    ) {
        let Some(callback) = self.client_callback(client) else {
            return;
        };
        if let Err(failure) = self.admits(client, key) {
            callback.on_discover_services_failed(key, failure);
            return;
        }
        let Some(listened_type) = normalize_service_type(&service.service_type) else {
            warn!(target: MACHINE_TARGET, %client, service_type = %service.service_type, "invalid service type");
            callback.on_discover_services_failed(key, NsdFailure::InternalError);
            return;
        };
        let transaction = self.ids.allocate();
        debug!(target: MACHINE_TARGET, %client, %key, %transaction, service_type = %listened_type, "discover");

        if self.uses_manager() {
            self.maybe_start_monitoring_sockets();
            let listener = ManagerListener {
                transaction,
                kind: ListenerKind::Discovery,
                service_type: listened_type,
                network: service.network,
                instance: None,
            };
            self.register_listener(&listener);
            self.store_request(
                client,
                key,
                ClientRequest {
                    transaction,
                    kind: RequestKind::Discover,
                    backend: Backend::Manager {
                        listener,
                        requested_type: service.service_type.clone(),
                    },
                },
            );
            callback.on_discover_services_started(key, &service.service_type);
            return;
        }

        let Some(interface_index) = self.daemon_interface(service) else {
            callback.on_discover_services_failed(key, NsdFailure::InternalError);
            return;
        };
        self.maybe_start_daemon(now);
        if self.submit(MdnsCommand::Discover {
            transaction,
            service_type: listened_type,
            interface_index,
        }) {
            self.store_request(client, key, daemon_request(transaction, RequestKind::Discover));
            callback.on_discover_services_started(key, &service.service_type);
        } else {
            self.submit(MdnsCommand::StopDiscover { transaction });
            callback.on_discover_services_failed(key, NsdFailure::InternalError);
        }
    }

    fn stop_discovery(&mut self, client: ClientId, key: ListenerKey, now: Instant) {
        let Some(callback) = self.client_callback(client) else {
            return;
        };
        let Some(request) = self.pending(client, key, &[RequestKind::Discover]) else {
            callback.on_stop_discovery_failed(key, NsdFailure::InternalError);
            return;
        };
        let stopped = match &request.backend {
            Backend::Manager { listener, .. } => {
                self.unregister_listener(listener);
                true
            }
            Backend::Daemon => self.submit(MdnsCommand::StopDiscover {
                transaction: request.transaction,
            }),
        };
        self.remove_request(client, key, now);
        if stopped {
            callback.on_stop_discovery_succeeded(key);
        } else {
            callback.on_stop_discovery_failed(key, NsdFailure::InternalError);
        }
    }

    fn register_service(
        &mut self,
        client: ClientId,
        key: ListenerKey,
        service: ServiceInfo,
        now: Instant,
    ) {
        let Some(callback) = self.client_callback(client) else {
            return;
        };
        if let Err(failure) = self.admits(client, key) {
            callback.on_register_service_failed(key, failure);
            return;
        }
        let transaction = self.ids.allocate();
        debug!(target: MACHINE_TARGET, %client, %key, %transaction, name = %service.name, "register");
        let Some(interface_index) = self.daemon_interface(&service) else {
            callback.on_register_service_failed(key, NsdFailure::InternalError);
            return;
        };
        self.maybe_start_daemon(now);
        if self.submit(MdnsCommand::Register {
            transaction,
            service,
            interface_index,
        }) {
            self.store_request(client, key, daemon_request(transaction, RequestKind::Register));
        } else {
            self.submit(MdnsCommand::StopRegister { transaction });
            callback.on_register_service_failed(key, NsdFailure::InternalError);
        }
    }

    fn unregister_service(&mut self, client: ClientId, key: ListenerKey, now: Instant) {
        let Some(callback) = self.client_callback(client) else {
            return;
        };
        let Some(request) = self.pending(client, key, &[RequestKind::Register]) else {
            callback.on_unregister_service_failed(key, NsdFailure::InternalError);
            return;
        };
        let stopped = self.submit(MdnsCommand::StopRegister {
            transaction: request.transaction,
        });
        self.remove_request(client, key, now);
        if stopped {
            callback.on_unregister_service_succeeded(key);
        } else {
            callback.on_unregister_service_failed(key, NsdFailure::InternalError);
        }
    }

    fn resolve_service(
        &mut self,
        client: ClientId,
        key: ListenerKey,
        service: &ServiceInfo,
        now: Instant,
    ) {
        let Some(callback) = self.client_callback(client) else {
            return;
        };
        let key_in_use = self
            .clients
            .get(&client)
            .is_some_and(|info| info.request(key).is_some());
        if key_in_use {
            warn!(target: MACHINE_TARGET, %client, %key, "listener key already in use");
            callback.on_resolve_service_failed(key, NsdFailure::InternalError);
            return;
        }
        let transaction = self.ids.allocate();
        debug!(target: MACHINE_TARGET, %client, %key, %transaction, name = %service.name, "resolve");

        if self.uses_manager() {
            let Some(listened_type) = normalize_service_type(&service.service_type) else {
                callback.on_resolve_service_failed(key, NsdFailure::InternalError);
                return;
            };
            self.maybe_start_monitoring_sockets();
            let listener = ManagerListener {
                transaction,
                kind: ListenerKind::Resolution,
                service_type: listened_type,
                network: service.network,
                instance: Some(service.name.clone()),
            };
            self.register_listener(&listener);
            self.store_request(
                client,
                key,
                ClientRequest {
                    transaction,
                    kind: RequestKind::Resolve,
                    backend: Backend::Manager {
                        listener,
                        requested_type: service.service_type.clone(),
                    },
                },
            );
            return;
        }

        let already_resolving = self
            .clients
            .get(&client)
            .is_some_and(|info| info.resolved().is_some());
        if already_resolving {
            callback.on_resolve_service_failed(key, NsdFailure::AlreadyActive);
            return;
        }
        let Some(interface_index) = self.daemon_interface(service) else {
            callback.on_resolve_service_failed(key, NsdFailure::InternalError);
            return;
        };
        self.maybe_start_daemon(now);
        if self.submit(MdnsCommand::Resolve {
            transaction,
            name: service.name.clone(),
            service_type: service.service_type.clone(),
            interface_index,
        }) {
            if let Some(info) = self.clients.get_mut(&client) {
                info.stage_resolution();
            }
            self.store_request(client, key, daemon_request(transaction, RequestKind::Resolve));
        } else {
            callback.on_resolve_service_failed(key, NsdFailure::InternalError);
        }
    }

    fn stop_resolution(&mut self, client: ClientId, key: ListenerKey, now: Instant) {
        let Some(callback) = self.client_callback(client) else {
            return;
        };
        let Some(request) =
            self.pending(client, key, &[RequestKind::Resolve, RequestKind::GetAddrInfo])
        else {
            callback.on_stop_resolution_failed(key, NsdFailure::InternalError);
            return;
        };
        let stopped = match &request.backend {
            Backend::Manager { listener, .. } => {
                self.unregister_listener(listener);
                true
            }
            Backend::Daemon => {
                if let Some(info) = self.clients.get_mut(&client) {
                    info.clear_resolution();
                }
                self.submit(super::stop_command(request.kind, request.transaction))
            }
        };
        self.remove_request(client, key, now);
        if stopped {
            callback.on_stop_resolution_succeeded(key);
        } else {
            callback.on_stop_resolution_failed(key, NsdFailure::InternalError);
        }
    }
}

fn daemon_request(transaction: TransactionId, kind: RequestKind) -> ClientRequest {
    ClientRequest {
        transaction,
        kind,
        backend: Backend::Daemon,
    }
}
