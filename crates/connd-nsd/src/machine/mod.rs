//! The discovery state machine.
//!
//! Two states exist. `Enabled` serves requests and backend events;
//! `Default` owns client registration, daemon lifecycle and the fallback
//! replies for anything `Enabled` does not take. A command is offered to
//! each state of the current chain in order until one handles it.

mod enabled;
mod events;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use connd_actor::TimerQueue;
use connd_config::Config;
use serde::Serialize;
use strum::{Display, IntoStaticStr};
use tracing::{debug, error, info, warn};

use crate::callback::{ClientCallback, NsdFailure, StateObserver};
use crate::client::{
    Backend, ClientId, ClientInfo, ClientRequest, ListenerKey, RequestKind, TransactionId,
    TransactionIds,
};
use crate::daemon::{MdnsCommand, MdnsDaemon};
use crate::event::MdnsEvent;
use crate::info::ServiceInfo;
use crate::interface::{InterfaceLookup, NoInterfaces};
use crate::manager::{DiscoveryManager, ManagerEvent, ManagerListener};
use crate::snapshot::{ClientSnapshot, NsdSnapshot, RequestSnapshot};

const MACHINE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::machine");

/// Tunables for the discovery machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsdSettings {
    /// Idle time before the daemon is stopped.
    pub cleanup_delay: Duration,
    /// Outstanding discoveries and registrations allowed per client.
    pub max_requests_per_client: usize,
    /// Serve discovery and resolution through an installed manager.
    pub use_discovery_manager: bool,
}

impl Default for NsdSettings {
    fn default() -> Self {
        Self {
            cleanup_delay: Duration::from_secs(10),
            max_requests_per_client: 10,
            use_discovery_manager: false,
        }
    }
}

impl NsdSettings {
    /// Settings taken from configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            cleanup_delay: config.cleanup_delay(),
            max_requests_per_client: config.max_requests_per_client,
            use_discovery_manager: config.use_discovery_manager,
        }
    }
}

/// States of the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NsdState {
    /// Discovery unavailable; requests fail.
    Default,
    /// Discovery available.
    Enabled,
}

impl NsdState {
    const fn chain(self) -> &'static [Self] {
        match self {
            Self::Enabled => &[Self::Enabled, Self::Default],
            Self::Default => &[Self::Default],
        }
    }
}

/// Input to the machine.
#[derive(IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum NsdCommand {
    RegisterClient {
        client: ClientId,
        callback: Arc<dyn ClientCallback>,
    },
    UnregisterClient {
        client: ClientId,
    },
    /// A legacy client asked for the daemon to run.
    DaemonStartup {
        client: ClientId,
    },
    DiscoverServices {
        client: ClientId,
        key: ListenerKey,
        service: ServiceInfo,
    },
    StopDiscovery {
        client: ClientId,
        key: ListenerKey,
    },
    RegisterService {
        client: ClientId,
        key: ListenerKey,
        service: ServiceInfo,
    },
    UnregisterService {
        client: ClientId,
        key: ListenerKey,
    },
    ResolveService {
        client: ClientId,
        key: ListenerKey,
        service: ServiceInfo,
    },
    StopResolution {
        client: ClientId,
        key: ListenerKey,
    },
    SetEnabled(bool),
    DaemonCleanup,
    DaemonEvent(MdnsEvent),
    ManagerEvent(ManagerEvent),
    /// A queued daemon command failed after it was accepted.
    CommandFailed(MdnsCommand),
}

enum Dispatch {
    Handled,
    Deferred(NsdCommand),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DaemonTimer {
    Cleanup,
}

/// Multiplexes client requests onto one resolver backend.
pub struct NsdMachine {
    settings: NsdSettings,
    state: NsdState,
    daemon: Box<dyn MdnsDaemon>,
    manager: Option<Box<dyn DiscoveryManager>>,
    observer: Arc<dyn StateObserver>,
    interfaces: Arc<dyn InterfaceLookup>,
    clients: HashMap<ClientId, ClientInfo>,
    transactions: HashMap<TransactionId, ClientId>,
    ids: TransactionIds,
    legacy_clients: usize,
    daemon_started: bool,
    monitoring_sockets: bool,
    timers: TimerQueue<DaemonTimer, DaemonTimer>,
}

impl NsdMachine {
    /// Builds the machine in the enabled state and announces it.
    #[must_use]
    pub fn new(
        settings: NsdSettings,
        daemon: Box<dyn MdnsDaemon>,
        manager: Option<Box<dyn DiscoveryManager>>,
        observer: Arc<dyn StateObserver>,
    ) -> Self {
        let machine = Self {
            settings,
            state: NsdState::Enabled,
            daemon,
            manager,
            observer,
            interfaces: Arc::new(NoInterfaces),
            clients: HashMap::new(),
            transactions: HashMap::new(),
            ids: TransactionIds::default(),
            legacy_clients: 0,
            daemon_started: false,
            monitoring_sockets: false,
            timers: TimerQueue::new(),
        };
        machine.observer.on_discovery_state_changed(true);
        machine
    }

    /// Uses `interfaces` to bind network-pinned daemon requests.
    #[must_use]
    pub fn with_interface_lookup(mut self, interfaces: Arc<dyn InterfaceLookup>) -> Self {
        self.interfaces = interfaces;
        self
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> NsdState {
        self.state
    }

    /// Offers `command` to each state in the current chain.
    pub fn process(&mut self, command: NsdCommand, now: Instant) {
        let name: &'static str = (&command).into();
        debug!(target: MACHINE_TARGET, state = %self.state, command = name, "processing");
        let mut pending = command;
        for &state in self.state.chain() {
            pending = match self.dispatch(state, pending, now) {
                Dispatch::Handled => return,
                Dispatch::Deferred(command) => command,
            };
        }
        warn!(target: MACHINE_TARGET, command = name, "unhandled command");
    }

    /// Earliest pending timer.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Runs every timer due at `now`.
    pub fn fire_timers(&mut self, now: Instant) {
        for timer in self.timers.pop_due(now) {
            match timer {
                DaemonTimer::Cleanup => self.process(NsdCommand::DaemonCleanup, now),
            }
        }
    }

    /// Serialisable view of clients, transactions and daemon state.
    #[must_use]
    pub fn snapshot(&self) -> NsdSnapshot {
        let mut clients: Vec<ClientSnapshot> = self
            .clients
            .iter()
            .map(|(client, info)| ClientSnapshot {
                client: *client,
                legacy: info.is_legacy(),
                resolving: info.resolved().is_some(),
                requests: info
                    .requests()
                    .map(|(key, request)| RequestSnapshot {
                        key: *key,
                        transaction: request.transaction,
                        kind: request.kind,
                        listener: match &request.backend {
                            Backend::Daemon => None,
                            Backend::Manager { listener, .. } => Some(listener.kind),
                        },
                    })
                    .collect(),
            })
            .collect();
        clients.sort_by_key(|snapshot| snapshot.client);
        NsdSnapshot {
            state: self.state,
            daemon_started: self.daemon_started,
            monitoring_sockets: self.monitoring_sockets,
            legacy_clients: self.legacy_clients,
            cleanup_pending: self.timers.contains(&DaemonTimer::Cleanup),
            clients,
        }
    }

    fn dispatch(&mut self, state: NsdState, command: NsdCommand, now: Instant) -> Dispatch {
        match state {
            NsdState::Enabled => self.enabled(command, now),
            NsdState::Default => {
                self.fallback(command, now);
                Dispatch::Handled
            }
        }
    }

    fn transition(&mut self, target: NsdState, now: Instant) {
        if self.state == target {
            return;
        }
        info!(target: MACHINE_TARGET, from = %self.state, to = %target, "discovery state change");
        if self.state == NsdState::Enabled {
            self.observer.on_discovery_state_changed(false);
            // Outstanding requests are not drained before the daemon stops.
            self.schedule_stop(now);
        }
        self.state = target;
        if target == NsdState::Enabled {
            self.observer.on_discovery_state_changed(true);
        }
    }

    fn fallback(&mut self, command: NsdCommand, now: Instant) {
        match command {
            NsdCommand::RegisterClient { client, callback } => {
                debug!(target: MACHINE_TARGET, %client, "client registered");
                if self.clients.insert(client, ClientInfo::new(callback)).is_some() {
                    warn!(target: MACHINE_TARGET, %client, "client registered twice");
                }
            }
            NsdCommand::UnregisterClient { client } => self.unregister_client(client, now),
            NsdCommand::DaemonStartup { client } => self.daemon_startup(client, now),
            NsdCommand::DaemonCleanup => self.maybe_stop_daemon(),
            NsdCommand::SetEnabled(true) => self.transition(NsdState::Enabled, now),
            NsdCommand::SetEnabled(false) => {}
            NsdCommand::DiscoverServices { client, key, .. } => {
                self.reply(client, |callback| {
                    callback.on_discover_services_failed(key, NsdFailure::InternalError);
                });
            }
            NsdCommand::StopDiscovery { client, key } => {
                self.reply(client, |callback| {
                    callback.on_stop_discovery_failed(key, NsdFailure::InternalError);
                });
            }
            NsdCommand::RegisterService { client, key, .. } => {
                self.reply(client, |callback| {
                    callback.on_register_service_failed(key, NsdFailure::InternalError);
                });
            }
            NsdCommand::UnregisterService { client, key } => {
                self.reply(client, |callback| {
                    callback.on_unregister_service_failed(key, NsdFailure::InternalError);
                });
            }
            NsdCommand::ResolveService { client, key, .. } => {
                self.reply(client, |callback| {
                    callback.on_resolve_service_failed(key, NsdFailure::InternalError);
                });
            }
            NsdCommand::StopResolution { client, key } => {
                self.reply(client, |callback| {
                    callback.on_stop_resolution_failed(key, NsdFailure::InternalError);
                });
            }
            NsdCommand::DaemonEvent(_) | NsdCommand::ManagerEvent(_) | NsdCommand::CommandFailed(_) => {
                debug!(target: MACHINE_TARGET, "backend result dropped while discovery is disabled");
            }
        }
    }

    fn reply(&self, client: ClientId, deliver: impl FnOnce(&dyn ClientCallback)) {
        match self.clients.get(&client) {
            Some(info) => deliver(info.callback().as_ref()),
            None => warn!(target: MACHINE_TARGET, %client, "request from unknown client"),
        }
    }

    fn unregister_client(&mut self, client: ClientId, now: Instant) {
        if let Some(mut info) = self.clients.remove(&client) {
            for (key, request) in info.drain() {
                debug!(
                    target: MACHINE_TARGET,
                    %client,
                    %key,
                    transaction = %request.transaction,
                    kind = %request.kind,
                    "terminating request"
                );
                self.transactions.remove(&request.transaction);
                match request.backend {
                    Backend::Daemon => {
                        self.submit(stop_command(request.kind, request.transaction));
                    }
                    Backend::Manager { listener, .. } => self.unregister_listener(&listener),
                }
            }
            if info.is_legacy() {
                self.legacy_clients = self.legacy_clients.saturating_sub(1);
            }
        }
        self.maybe_stop_monitoring_sockets();
        self.maybe_schedule_stop(now);
    }

    fn daemon_startup(&mut self, client: ClientId, now: Instant) {
        self.cancel_stop();
        if let Some(info) = self.clients.get_mut(&client)
            && !info.is_legacy()
        {
            info.set_legacy();
            self.legacy_clients += 1;
        }
        self.maybe_start_daemon(now);
    }

    fn uses_manager(&self) -> bool {
        self.settings.use_discovery_manager && self.manager.is_some()
    }

    fn is_any_request_active(&self) -> bool {
        !self.transactions.is_empty()
    }

    fn submit(&mut self, command: MdnsCommand) -> bool {
        match self.daemon.submit(command) {
            Ok(()) => true,
            Err(cause) => {
                warn!(target: MACHINE_TARGET, %cause, "mdnssd command not queued");
                false
            }
        }
    }

    fn schedule_stop(&mut self, now: Instant) {
        self.timers.cancel(&DaemonTimer::Cleanup);
        self.timers
            .schedule(DaemonTimer::Cleanup, now + self.settings.cleanup_delay, DaemonTimer::Cleanup);
    }

    fn cancel_stop(&mut self) {
        self.timers.cancel(&DaemonTimer::Cleanup);
    }

    fn maybe_schedule_stop(&mut self, now: Instant) {
        if !self.is_any_request_active() && self.legacy_clients == 0 {
            self.schedule_stop(now);
        }
    }

    fn maybe_start_daemon(&mut self, now: Instant) {
        if self.daemon_started {
            return;
        }
        info!(target: MACHINE_TARGET, "starting mdnssd");
        self.submit(MdnsCommand::StartDaemon);
        self.daemon_started = true;
        self.maybe_schedule_stop(now);
    }

    fn maybe_stop_daemon(&mut self) {
        if !self.daemon_started {
            return;
        }
        info!(target: MACHINE_TARGET, "stopping idle mdnssd");
        self.submit(MdnsCommand::StopDaemon);
        self.daemon_started = false;
    }

    fn maybe_start_monitoring_sockets(&mut self) {
        if self.monitoring_sockets {
            return;
        }
        if let Some(manager) = self.manager.as_mut() {
            manager.start_monitoring_sockets();
            self.monitoring_sockets = true;
        }
    }

    fn maybe_stop_monitoring_sockets(&mut self) {
        if !self.monitoring_sockets || self.is_any_request_active() {
            return;
        }
        if let Some(manager) = self.manager.as_mut() {
            manager.stop_monitoring_sockets();
        }
        self.monitoring_sockets = false;
    }

    fn register_listener(&mut self, listener: &ManagerListener) {
        if let Some(manager) = self.manager.as_mut() {
            manager.register_listener(listener);
        }
    }

    fn unregister_listener(&mut self, listener: &ManagerListener) {
        if let Some(manager) = self.manager.as_mut() {
            manager.unregister_listener(listener);
        }
    }

    fn store_request(&mut self, client: ClientId, key: ListenerKey, request: ClientRequest) {
        let Some(info) = self.clients.get_mut(&client) else {
            error!(target: MACHINE_TARGET, %client, "storing a request for an unknown client");
            return;
        };
        if let Some(owner) = self.transactions.insert(request.transaction, client) {
            error!(
                target: MACHINE_TARGET,
                transaction = %request.transaction,
                %owner,
                "transaction id reused while still mapped"
            );
        }
        let daemon_backed = request.backend == Backend::Daemon;
        info.insert(key, request);
        if daemon_backed {
            self.cancel_stop();
        }
    }

    fn remove_request(&mut self, client: ClientId, key: ListenerKey, now: Instant) {
        let removed = self
            .clients
            .get_mut(&client)
            .and_then(|info| info.remove(key));
        let Some(request) = removed else {
            return;
        };
        self.transactions.remove(&request.transaction);
        match request.backend {
            Backend::Daemon => self.maybe_schedule_stop(now),
            Backend::Manager { .. } => self.maybe_stop_monitoring_sockets(),
        }
    }

    /// Looks up the client and key owning `transaction`.
    fn owner_of(&self, transaction: TransactionId) -> Option<(ClientId, ListenerKey, ClientRequest)> {
        let client = *self.transactions.get(&transaction)?;
        let Some(info) = self.clients.get(&client) else {
            error!(target: MACHINE_TARGET, %transaction, %client, "transaction maps to a vanished client");
            return None;
        };
        let (key, request) = info.key_for(transaction)?;
        Some((client, key, request.clone()))
    }
}

const fn stop_command(kind: RequestKind, transaction: TransactionId) -> MdnsCommand {
    match kind {
        RequestKind::Discover => MdnsCommand::StopDiscover { transaction },
        RequestKind::Register => MdnsCommand::StopRegister { transaction },
        RequestKind::Resolve => MdnsCommand::StopResolve { transaction },
        RequestKind::GetAddrInfo => MdnsCommand::StopGetAddrInfo { transaction },
    }
}
