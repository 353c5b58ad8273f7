//! Production wiring of the daemon's services.

use std::net::IpAddr;
use std::sync::{Arc, Mutex, PoisonError};

use nix::net::if_::if_nametoindex;
use tracing::{debug, info, warn};

use connd_arbiter::{
    ArbiterHandle, ArbiterSettings, BroadcastSink, ConnectivityBroadcast, DnsSink, NetworkId,
    NoopProbe,
};
use connd_config::Config;
use connd_native::{ConnectorSettings, DaemonCallbacks, NativeDaemonConnector};
use connd_nsd::{
    CommandFeedback, InterfaceLookup, NativeMdnsDaemon, NetId, NsdHandle, NsdMachine, NsdRelay,
    NsdSettings, StateObserver,
};

use crate::services::{ServiceKind, ServiceProvider, ServiceStartupError};

const SYSTEM_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::services");

/// Name of the resolver daemon, used for connector threads and log fields.
pub const RESOLVER_NAME: &str = "mdnsd";

/// Writes connectivity broadcasts to the log as JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingBroadcastSink;

impl BroadcastSink for LoggingBroadcastSink {
    fn send(&self, broadcast: &ConnectivityBroadcast) {
        match serde_json::to_string(broadcast) {
            Ok(json) => info!(
                target: SYSTEM_TARGET,
                kind = %broadcast.kind,
                broadcast = %json,
                "connectivity changed"
            ),
            Err(error) => warn!(
                target: SYSTEM_TARGET,
                kind = %broadcast.kind,
                error = %error,
                "connectivity broadcast could not be serialised"
            ),
        }
    }
}

/// Logs name server assignments.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingDnsSink;

impl DnsSink for LoggingDnsSink {
    fn default_dns_changed(&self, servers: &[IpAddr]) {
        info!(target: SYSTEM_TARGET, servers = ?servers, "default name servers changed");
    }

    fn pid_dns_changed(&self, pid: u32, servers: &[IpAddr]) {
        info!(target: SYSTEM_TARGET, pid, servers = ?servers, "process name servers changed");
    }
}

/// Maps discovery networks to kernel interfaces through the arbiter.
///
/// Lookups answer `None` while the arbiter is stopped, when the network is
/// unknown or has no interface name, and when the kernel does not know the
/// interface.
#[derive(Default)]
pub struct ArbiterInterfaces {
    arbiter: Mutex<Option<Arc<ArbiterHandle>>>,
}

impl ArbiterInterfaces {
    fn attach(&self, arbiter: Arc<ArbiterHandle>) {
        *self.arbiter.lock().unwrap_or_else(PoisonError::into_inner) = Some(arbiter);
    }

    fn detach(&self) {
        self.arbiter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

impl InterfaceLookup for ArbiterInterfaces {
    fn interface_index(&self, network: NetId) -> Option<u32> {
        let arbiter = self
            .arbiter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()?;
        let link_properties = match arbiter.link_properties(NetworkId::new(network.0)) {
            Ok(link_properties) => link_properties?,
            Err(error) => {
                debug!(target: SYSTEM_TARGET, net = network.0, error = %error, "arbiter unavailable");
                return None;
            }
        };
        let name = link_properties.interface_name?;
        match if_nametoindex(name.as_str()) {
            Ok(index) => Some(index),
            Err(error) => {
                debug!(target: SYSTEM_TARGET, interface = %name, error = %error, "interface index unknown");
                None
            }
        }
    }
}

/// Logs discovery being switched on and off.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingStateObserver;

impl StateObserver for LoggingStateObserver {
    fn on_discovery_state_changed(&self, enabled: bool) {
        info!(target: SYSTEM_TARGET, enabled, "discovery state changed");
    }
}

/// Starts the real connector, arbiter and discovery workers.
///
/// The resolver connector reports its events to an [`NsdRelay`] created up
/// front; the relay is attached to the discovery worker once that starts.
pub struct SystemServiceProvider {
    relay: Arc<NsdRelay>,
    interfaces: Arc<ArbiterInterfaces>,
    connector: Option<Arc<NativeDaemonConnector>>,
    arbiter: Option<Arc<ArbiterHandle>>,
    discovery: Option<NsdHandle>,
}

impl Default for SystemServiceProvider {
    fn default() -> Self {
        Self {
            relay: Arc::new(NsdRelay::default()),
            interfaces: Arc::new(ArbiterInterfaces::default()),
            connector: None,
            arbiter: None,
            discovery: None,
        }
    }
}

impl SystemServiceProvider {
    /// Handle of the running arbiter.
    #[must_use]
    pub fn arbiter(&self) -> Option<&ArbiterHandle> {
        self.arbiter.as_deref()
    }

    /// Interface lookup handed to the discovery worker.
    #[must_use]
    pub fn interfaces(&self) -> Arc<ArbiterInterfaces> {
        Arc::clone(&self.interfaces)
    }

    /// Handle of the running discovery worker.
    #[must_use]
    pub const fn discovery(&self) -> Option<&NsdHandle> {
        self.discovery.as_ref()
    }

    fn start_connector(&mut self, config: &Config) -> Result<(), ServiceStartupError> {
        let settings = ConnectorSettings::from_config(RESOLVER_NAME, config);
        let callbacks: Arc<dyn DaemonCallbacks> = self.relay.clone();
        let connector = NativeDaemonConnector::start(settings, callbacks).map_err(|error| {
            ServiceStartupError::with_source(
                ServiceKind::Connector,
                "resolver connector threads could not start",
                error,
            )
        })?;
        self.connector = Some(Arc::new(connector));
        Ok(())
    }

    fn start_arbiter(&mut self, config: &Config) -> Result<(), ServiceStartupError> {
        let handle = ArbiterHandle::start(
            ArbiterSettings::from_config(config),
            Arc::new(NoopProbe),
            Arc::new(LoggingBroadcastSink),
            Arc::new(LoggingDnsSink),
        )
        .map_err(|error| {
            ServiceStartupError::with_source(
                ServiceKind::Arbiter,
                "arbiter worker could not start",
                error,
            )
        })?;
        // Nothing else in the daemon signals boot completion.
        handle.system_ready().map_err(|error| {
            ServiceStartupError::with_source(
                ServiceKind::Arbiter,
                "arbiter stopped before it was marked ready",
                error,
            )
        })?;
        let handle = Arc::new(handle);
        self.interfaces.attach(Arc::clone(&handle));
        self.arbiter = Some(handle);
        Ok(())
    }

    fn start_discovery(&mut self, config: &Config) -> Result<(), ServiceStartupError> {
        let connector = self.connector.clone().ok_or_else(|| {
            ServiceStartupError::new(ServiceKind::Discovery, "resolver connector is not running")
        })?;
        let feedback: Arc<dyn CommandFeedback> = self.relay.clone();
        let daemon = NativeMdnsDaemon::spawn(connector, feedback).map_err(|error| {
            ServiceStartupError::with_source(
                ServiceKind::Discovery,
                "resolver command thread could not start",
                error,
            )
        })?;
        let machine = NsdMachine::new(
            NsdSettings::from_config(config),
            Box::new(daemon),
            None,
            Arc::new(LoggingStateObserver),
        )
        .with_interface_lookup(self.interfaces.clone());
        let handle = NsdHandle::start(machine).map_err(|error| {
            ServiceStartupError::with_source(
                ServiceKind::Discovery,
                "discovery worker could not start",
                error,
            )
        })?;
        if !self.relay.attach(handle.mailbox()) {
            warn!(
                target: SYSTEM_TARGET,
                "resolver events stay routed to the first discovery worker"
            );
        }
        self.discovery = Some(handle);
        Ok(())
    }
}

impl ServiceProvider for SystemServiceProvider {
    fn start_service(
        &mut self,
        kind: ServiceKind,
        config: &Config,
    ) -> Result<(), ServiceStartupError> {
        match kind {
            ServiceKind::Connector => self.start_connector(config),
            ServiceKind::Arbiter => self.start_arbiter(config),
            ServiceKind::Discovery => self.start_discovery(config),
        }
    }

    fn stop_service(&mut self, kind: ServiceKind) {
        match kind {
            ServiceKind::Connector => {
                if let Some(connector) = self.connector.take() {
                    connector.shutdown();
                }
            }
            ServiceKind::Arbiter => {
                self.interfaces.detach();
                if let Some(handle) = self.arbiter.take()
                    && let Err(error) = handle.shutdown()
                {
                    warn!(target: SYSTEM_TARGET, service = %kind, error = %error, "stop failed");
                }
            }
            ServiceKind::Discovery => {
                if let Some(handle) = self.discovery.take()
                    && let Err(error) = handle.shutdown()
                {
                    warn!(target: SYSTEM_TARGET, service = %kind, error = %error, "stop failed");
                }
            }
        }
    }
}
