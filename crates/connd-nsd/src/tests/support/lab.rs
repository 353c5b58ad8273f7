use std::sync::Arc;
use std::time::{Duration, Instant};

use connd_native::DaemonEvent;

use super::doubles::{
    FixedInterfaces, RecordingClient, RecordingDaemon, RecordingManager, RecordingObserver,
};
use crate::{
    ClientId, ClientIds, ListenerKey, MdnsEvent, NetId, NsdCommand, NsdMachine, NsdSettings,
    NsdSnapshot, ServiceInfo,
};

pub const CLEANUP: Duration = Duration::from_secs(10);

/// Machine plus recording collaborators and a manual clock.
pub struct Lab {
    pub machine: NsdMachine,
    pub daemon: RecordingDaemon,
    pub observer: Arc<RecordingObserver>,
    pub now: Instant,
    clients: ClientIds,
}

impl Default for Lab {
    fn default() -> Self {
        Self::build(Self::settings(), None, FixedInterfaces::default())
    }
}

impl Lab {
    /// Settings with a short cleanup delay and the default limit.
    pub fn settings() -> NsdSettings {
        NsdSettings {
            cleanup_delay: CLEANUP,
            ..NsdSettings::default()
        }
    }

    /// A lab serving discovery and resolution through a manager.
    pub fn with_manager() -> (Self, RecordingManager) {
        let manager = RecordingManager::default();
        let settings = NsdSettings {
            use_discovery_manager: true,
            ..Self::settings()
        };
        (
            Self::build(settings, Some(manager.clone()), FixedInterfaces::default()),
            manager,
        )
    }

    /// A daemon-backed lab where each `(network, interface)` pair is known.
    pub fn with_interfaces(interfaces: &[(u32, u32)]) -> Self {
        let table = interfaces
            .iter()
            .map(|&(network, index)| (NetId(network), index))
            .collect();
        Self::build(Self::settings(), None, FixedInterfaces(table))
    }

    fn build(
        settings: NsdSettings,
        manager: Option<RecordingManager>,
        interfaces: FixedInterfaces,
    ) -> Self {
        let daemon = RecordingDaemon::default();
        let observer = Arc::new(RecordingObserver::default());
        let machine = NsdMachine::new(
            settings,
            Box::new(daemon.clone()),
            manager.map(|manager| Box::new(manager) as Box<dyn crate::DiscoveryManager>),
            observer.clone(),
        )
        .with_interface_lookup(Arc::new(interfaces));
        Self {
            machine,
            daemon,
            observer,
            now: Instant::now(),
            clients: ClientIds::default(),
        }
    }

    /// Feeds `command` at the current time.
    pub fn process(&mut self, command: NsdCommand) {
        self.machine.process(command, self.now);
    }

    /// Connects a recording client.
    pub fn client(&mut self) -> (ClientId, Arc<RecordingClient>) {
        let client = self.clients.next();
        let callback = Arc::new(RecordingClient::default());
        self.process(NsdCommand::RegisterClient {
            client,
            callback: callback.clone(),
        });
        (client, callback)
    }

    /// Starts discovering `service_type`.
    pub fn discover(&mut self, client: ClientId, key: i32, service_type: &str) {
        self.process(NsdCommand::DiscoverServices {
            client,
            key: ListenerKey(key),
            service: ServiceInfo::new("", service_type),
        });
    }

    /// Resolves `name` of `service_type`.
    pub fn resolve(&mut self, client: ClientId, key: i32, name: &str, service_type: &str) {
        self.process(NsdCommand::ResolveService {
            client,
            key: ListenerKey(key),
            service: ServiceInfo::new(name, service_type),
        });
    }

    /// Advertises `service`.
    pub fn register(&mut self, client: ClientId, key: i32, service: ServiceInfo) {
        self.process(NsdCommand::RegisterService {
            client,
            key: ListenerKey(key),
            service,
        });
    }

    /// Delivers a raw resolver daemon line.
    pub fn daemon_line(&mut self, raw: &str) {
        let event = DaemonEvent::parse(raw).expect("well-formed daemon line");
        let event = MdnsEvent::from_daemon(&event).expect("mDNS event");
        self.process(NsdCommand::DaemonEvent(event));
    }

    /// Moves the clock forward and fires due timers.
    pub fn advance(&mut self, by: Duration) {
        self.now += by;
        self.machine.fire_timers(self.now);
    }

    pub fn snapshot(&self) -> NsdSnapshot {
        self.machine.snapshot()
    }
}
