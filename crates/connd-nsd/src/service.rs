//! Runs the [`NsdMachine`] on its own worker and bridges the resolver
//! connector into its mailbox.

use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::time::Instant;

use connd_actor::{ActorError, Mailbox, Service, ServiceHandle};
use connd_native::{ConnectorError, DaemonCallbacks, DaemonEvent};
use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::callback::ClientCallback;
use crate::client::{ClientId, ClientIds, ListenerKey};
use crate::daemon::{CommandFeedback, MdnsCommand};
use crate::error::NsdError;
use crate::event::{MdnsEvent, MdnsEventError};
use crate::info::ServiceInfo;
use crate::machine::{NsdCommand, NsdMachine};
use crate::manager::ManagerEvent;
use crate::snapshot::NsdSnapshot;

const SERVICE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::service");

/// Name of the discovery worker thread.
pub const NSD_THREAD: &str = "connd-nsd";

/// Messages accepted by the discovery worker.
pub enum NsdMessage {
    Command(NsdCommand),
    Snapshot { reply: Sender<NsdSnapshot> },
}

/// [`Service`] adapter around the machine.
pub struct NsdService {
    machine: NsdMachine,
}

impl NsdService {
    /// Wraps `machine`.
    #[must_use]
    pub const fn new(machine: NsdMachine) -> Self {
        Self { machine }
    }
}

impl Service for NsdService {
    type Message = NsdMessage;

    fn handle(&mut self, message: NsdMessage, now: Instant) {
        match message {
            NsdMessage::Command(command) => self.machine.process(command, now),
            NsdMessage::Snapshot { reply } => {
                let _sent = reply.send(self.machine.snapshot());
            }
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.machine.next_deadline()
    }

    fn on_deadline(&mut self, now: Instant) {
        self.machine.fire_timers(now);
    }

    fn on_stop(&mut self) {
        debug!(target: SERVICE_TARGET, "discovery worker stopped");
    }
}

/// Client handle to a running discovery worker.
pub struct NsdHandle {
    service: ServiceHandle<NsdMessage>,
    clients: ClientIds,
}

impl NsdHandle {
    /// Starts the worker.
    ///
    /// # Errors
    ///
    /// Returns [`ActorError::Spawn`] when the worker thread cannot start.
    pub fn start(machine: NsdMachine) -> Result<Self, ActorError> {
        let service = connd_actor::spawn(NSD_THREAD, NsdService::new(machine))?;
        Ok(Self {
            service,
            clients: ClientIds::default(),
        })
    }

    /// Mailbox for backends reporting results.
    #[must_use]
    pub fn mailbox(&self) -> Mailbox<NsdMessage> {
        self.service.mailbox()
    }

    fn send(&self, command: NsdCommand) -> Result<(), NsdError> {
        self.service
            .send(NsdMessage::Command(command))
            .map_err(NsdError::from)
    }

    /// Connects a client and returns its identity.
    ///
    /// # Errors
    ///
    /// Returns [`NsdError::ServiceStopped`] once the worker exited.
    pub fn register_client(&self, callback: Arc<dyn ClientCallback>) -> Result<ClientId, NsdError> {
        let client = self.clients.next();
        self.send(NsdCommand::RegisterClient { client, callback })?;
        Ok(client)
    }

    /// Disconnects `client`, cancelling everything it still has running.
    /// Transports call this when they notice the peer has gone.
    ///
    /// # Errors
    ///
    /// Returns [`NsdError::ServiceStopped`] once the worker exited.
    pub fn unregister_client(&self, client: ClientId) -> Result<(), NsdError> {
        self.send(NsdCommand::UnregisterClient { client })
    }

    /// Keeps the daemon running on behalf of a legacy client.
    ///
    /// # Errors
    ///
    /// Returns [`NsdError::ServiceStopped`] once the worker exited.
    pub fn daemon_startup(&self, client: ClientId) -> Result<(), NsdError> {
        self.send(NsdCommand::DaemonStartup { client })
    }

    /// Starts discovering `service.service_type`, optionally on
    /// `service.network` only.
    ///
    /// # Errors
    ///
    /// Returns [`NsdError::ServiceStopped`] once the worker exited.
    pub fn discover_services(
        &self,
        client: ClientId,
        key: ListenerKey,
        service: ServiceInfo,
    ) -> Result<(), NsdError> {
        self.send(NsdCommand::DiscoverServices {
            client,
            key,
            service,
        })
    }

    /// Stops the discovery filed under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`NsdError::ServiceStopped`] once the worker exited.
    pub fn stop_service_discovery(&self, client: ClientId, key: ListenerKey) -> Result<(), NsdError> {
        self.send(NsdCommand::StopDiscovery { client, key })
    }

    /// Advertises `service`.
    ///
    /// # Errors
    ///
    /// Returns [`NsdError::ServiceStopped`] once the worker exited.
    pub fn register_service(
        &self,
        client: ClientId,
        key: ListenerKey,
        service: ServiceInfo,
    ) -> Result<(), NsdError> {
        self.send(NsdCommand::RegisterService {
            client,
            key,
            service,
        })
    }

    /// Withdraws the advertisement filed under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`NsdError::ServiceStopped`] once the worker exited.
    pub fn unregister_service(&self, client: ClientId, key: ListenerKey) -> Result<(), NsdError> {
        self.send(NsdCommand::UnregisterService { client, key })
    }

    /// Resolves `service` to a host and port.
    ///
    /// # Errors
    ///
    /// Returns [`NsdError::ServiceStopped`] once the worker exited.
    pub fn resolve_service(
        &self,
        client: ClientId,
        key: ListenerKey,
        service: ServiceInfo,
    ) -> Result<(), NsdError> {
        self.send(NsdCommand::ResolveService {
            client,
            key,
            service,
        })
    }

    /// Abandons the resolution filed under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`NsdError::ServiceStopped`] once the worker exited.
    pub fn stop_resolution(&self, client: ClientId, key: ListenerKey) -> Result<(), NsdError> {
        self.send(NsdCommand::StopResolution { client, key })
    }

    /// Enables or disables discovery.
    ///
    /// # Errors
    ///
    /// Returns [`NsdError::ServiceStopped`] once the worker exited.
    pub fn set_enabled(&self, enabled: bool) -> Result<(), NsdError> {
        self.send(NsdCommand::SetEnabled(enabled))
    }

    /// Feeds a discovery manager callback into the machine.
    ///
    /// # Errors
    ///
    /// Returns [`NsdError::ServiceStopped`] once the worker exited.
    pub fn manager_event(&self, event: ManagerEvent) -> Result<(), NsdError> {
        self.send(NsdCommand::ManagerEvent(event))
    }

    /// Current clients, transactions and daemon state.
    ///
    /// # Errors
    ///
    /// Returns [`NsdError::ServiceStopped`] once the worker exited.
    pub fn snapshot(&self) -> Result<NsdSnapshot, NsdError> {
        Ok(self
            .service
            .mailbox()
            .call(|reply| NsdMessage::Snapshot { reply })?)
    }

    /// Stops the worker after it drains pending messages.
    ///
    /// # Errors
    ///
    /// Returns [`ActorError::Panicked`] when the worker panicked.
    pub fn shutdown(&self) -> Result<(), ActorError> {
        self.service.shutdown()
    }
}

/// Forwards resolver daemon traffic into the discovery mailbox.
///
/// The connector and command thread are created before the worker, so the
/// relay starts detached and is attached once the worker runs. Traffic
/// arriving before that is dropped.
#[derive(Default)]
pub struct NsdRelay {
    mailbox: OnceCell<Mailbox<NsdMessage>>,
}

impl NsdRelay {
    /// Routes traffic to `mailbox`. Only the first call has an effect.
    pub fn attach(&self, mailbox: Mailbox<NsdMessage>) -> bool {
        self.mailbox.set(mailbox).is_ok()
    }

    fn forward(&self, command: NsdCommand) {
        let Some(mailbox) = self.mailbox.get() else {
            warn!(target: SERVICE_TARGET, "resolver traffic before the discovery worker started");
            return;
        };
        if let Err(error) = mailbox.send(NsdMessage::Command(command)) {
            debug!(target: SERVICE_TARGET, %error, "discovery worker gone; resolver traffic dropped");
        }
    }
}

impl DaemonCallbacks for NsdRelay {
    fn on_daemon_connected(&self) {
        info!(target: SERVICE_TARGET, "resolver daemon connected");
    }

    fn on_event(&self, event: &DaemonEvent) -> bool {
        match MdnsEvent::from_daemon(event) {
            Ok(decoded) => {
                self.forward(NsdCommand::DaemonEvent(decoded));
                true
            }
            Err(MdnsEventError::UnknownCode { .. }) => false,
            Err(error) => {
                warn!(target: SERVICE_TARGET, %error, raw = event.raw(), "malformed resolver event");
                true
            }
        }
    }
}

impl CommandFeedback for NsdRelay {
    fn command_failed(&self, command: MdnsCommand, error: &ConnectorError) {
        debug!(target: SERVICE_TARGET, %error, "reporting failed mdnssd command");
        self.forward(NsdCommand::CommandFailed(command));
    }
}
