use std::io::{self, BufRead, BufReader, ErrorKind, Write};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use connd_config::{Config, SocketEndpoint};
use tracing::{debug, info, warn};

use crate::{
    CONNECTOR_TARGET, Command, ConnectorError, DaemonEvent, DaemonStream, PendingCommand,
    ResponseClass, ResponseQueue,
};

const SHUTDOWN_POLL: Duration = Duration::from_millis(25);

/// Receives connection and broadcast notifications.
///
/// Both methods run on the connector's callback thread, never on the socket
/// reader, so they may issue commands through the connector.
pub trait DaemonCallbacks: Send + Sync {
    /// Called after every successful (re)connect.
    fn on_daemon_connected(&self);

    /// Called for each unsolicited line. Returns `false` when unhandled.
    fn on_event(&self, event: &DaemonEvent) -> bool;
}

/// Connection parameters for a [`NativeDaemonConnector`].
#[derive(Debug, Clone)]
pub struct ConnectorSettings {
    /// Name used for thread names and log fields.
    pub name: String,
    /// Daemon socket.
    pub endpoint: SocketEndpoint,
    /// Bound on tracked pending commands.
    pub response_queue_capacity: usize,
    /// Default per-command timeout.
    pub command_timeout: Duration,
    /// Delay before reconnecting after a failure.
    pub reconnect_backoff: Duration,
}

impl ConnectorSettings {
    /// Settings for the resolver daemon taken from configuration.
    #[must_use]
    pub fn from_config(name: impl Into<String>, config: &Config) -> Self {
        Self {
            name: name.into(),
            endpoint: config.resolver_socket().clone(),
            response_queue_capacity: config.response_queue_capacity,
            command_timeout: config.command_timeout(),
            reconnect_backoff: config.reconnect_backoff(),
        }
    }
}

enum Dispatch {
    Connected,
    Event(DaemonEvent),
}

struct Shared {
    settings: ConnectorSettings,
    sequence: AtomicU32,
    writer: Mutex<Option<DaemonStream>>,
    responses: ResponseQueue,
    shutdown: AtomicBool,
}

impl Shared {
    fn writer(&self) -> MutexGuard<'_, Option<DaemonStream>> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

/// Request/response client for a native daemon socket.
///
/// A reader thread keeps the connection alive, reconnecting after
/// `reconnect_backoff` whenever it drops. Commands issued while disconnected
/// fail with [`ConnectorError::NotConnected`].
pub struct NativeDaemonConnector {
    shared: Arc<Shared>,
    reader: Mutex<Option<JoinHandle<()>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl NativeDaemonConnector {
    /// Spawns the reader and callback threads.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Io`] when a thread cannot be spawned.
    pub fn start(
        settings: ConnectorSettings,
        callbacks: Arc<dyn DaemonCallbacks>,
    ) -> Result<Self, ConnectorError> {
        let name = settings.name.clone();
        let shared = Arc::new(Shared {
            responses: ResponseQueue::new(settings.response_queue_capacity),
            settings,
            sequence: AtomicU32::new(0),
            writer: Mutex::new(None),
            shutdown: AtomicBool::new(false),
        });

        let (dispatch, inbox) = mpsc::channel();
        let dispatcher = thread::Builder::new()
            .name(format!("{name}.callbacks"))
            .spawn(move || run_dispatcher(&inbox, callbacks.as_ref()))
            .map_err(|source| ConnectorError::Io {
                command: format!("spawn {name}.callbacks"),
                source,
            })?;

        let reader_shared = Arc::clone(&shared);
        let reader = thread::Builder::new()
            .name(format!("{name}.reader"))
            .spawn(move || run_reader(&reader_shared, &dispatch))
            .map_err(|source| ConnectorError::Io {
                command: format!("spawn {name}.reader"),
                source,
            })?;

        Ok(Self {
            shared,
            reader: Mutex::new(Some(reader)),
            dispatcher: Mutex::new(Some(dispatcher)),
        })
    }

    /// Runs `command` and expects exactly one final response.
    ///
    /// # Errors
    ///
    /// See [`NativeDaemonConnector::execute_with_timeout`]; additionally
    /// [`ConnectorError::UnexpectedResponseCount`] when continuation lines
    /// arrive.
    pub fn execute(&self, command: &Command) -> Result<DaemonEvent, ConnectorError> {
        let mut events = self.execute_for_list(command)?;
        if events.len() != 1 {
            return Err(ConnectorError::UnexpectedResponseCount {
                command: command.to_string(),
                count: events.len(),
            });
        }
        events.pop().ok_or_else(|| ConnectorError::UnexpectedResponseCount {
            command: command.to_string(),
            count: 0,
        })
    }

    /// Runs `command` with the configured timeout, collecting continuation
    /// lines and the final response.
    ///
    /// # Errors
    ///
    /// See [`NativeDaemonConnector::execute_with_timeout`].
    pub fn execute_for_list(&self, command: &Command) -> Result<Vec<DaemonEvent>, ConnectorError> {
        self.execute_with_timeout(self.shared.settings.command_timeout, command)
    }

    /// Runs `command`, waiting up to `timeout` for each response line.
    ///
    /// Blocks the calling thread only.
    ///
    /// # Errors
    ///
    /// - [`ConnectorError::InvalidArgument`] for NUL bytes.
    /// - [`ConnectorError::NotConnected`] or [`ConnectorError::Io`] when the
    ///   command cannot be written.
    /// - [`ConnectorError::Timeout`] when a response does not arrive.
    /// - [`ConnectorError::Argument`] for a `5xx` and
    ///   [`ConnectorError::Failure`] for a `4xx` final response.
    pub fn execute_with_timeout(
        &self,
        timeout: Duration,
        command: &Command,
    ) -> Result<Vec<DaemonEvent>, ConnectorError> {
        let sequence = self
            .shared
            .sequence
            .fetch_add(1, Ordering::SeqCst)
            .wrapping_add(1);
        let line = command.frame(sequence)?;
        debug!(
            target: CONNECTOR_TARGET,
            connector = %self.shared.settings.name,
            command = %line,
            "SND"
        );

        {
            let mut writer = self.shared.writer();
            let Some(stream) = writer.as_mut() else {
                return Err(ConnectorError::NotConnected { command: line });
            };
            let mut framed = Vec::with_capacity(line.len() + 1);
            framed.extend_from_slice(line.as_bytes());
            framed.push(0);
            if let Err(source) = stream.write_all(&framed).and_then(|()| stream.flush()) {
                return Err(ConnectorError::Io {
                    command: line,
                    source,
                });
            }
        }

        let mut events = Vec::new();
        loop {
            let Some(event) = self.shared.responses.remove(sequence, timeout, &line) else {
                warn!(
                    target: CONNECTOR_TARGET,
                    connector = %self.shared.settings.name,
                    command = %line,
                    "timed out waiting for response"
                );
                return Err(ConnectorError::Timeout {
                    command: line,
                    timeout,
                });
            };
            let more = event.is_continue();
            events.push(event);
            if !more {
                break;
            }
        }

        let Some(last) = events.pop() else {
            return Ok(events);
        };
        match last.class() {
            ResponseClass::ClientError => Err(ConnectorError::Argument {
                command: line,
                event: last,
            }),
            ResponseClass::ServerError => Err(ConnectorError::Failure {
                command: line,
                event: last,
            }),
            _ => {
                events.push(last);
                Ok(events)
            }
        }
    }

    /// Whether a daemon connection is currently open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.writer().is_some()
    }

    /// Commands still awaiting responses.
    #[must_use]
    pub fn dump(&self) -> Vec<PendingCommand> {
        self.shared.responses.dump()
    }

    /// Stops the reader and callback threads. Calling it twice is harmless.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        if let Some(stream) = self.shared.writer().take()
            && let Err(error) = stream.shutdown()
        {
            debug!(
                target: CONNECTOR_TARGET,
                connector = %self.shared.settings.name,
                error = %error,
                "socket already closed"
            );
        }
        for slot in [&self.reader, &self.dispatcher] {
            let handle = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(handle) = handle
                && handle.join().is_err()
            {
                warn!(
                    target: CONNECTOR_TARGET,
                    connector = %self.shared.settings.name,
                    "connector thread panicked"
                );
            }
        }
    }
}

impl Drop for NativeDaemonConnector {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_dispatcher(inbox: &Receiver<Dispatch>, callbacks: &dyn DaemonCallbacks) {
    while let Ok(dispatch) = inbox.recv() {
        match dispatch {
            Dispatch::Connected => callbacks.on_daemon_connected(),
            Dispatch::Event(event) => {
                if !callbacks.on_event(&event) {
                    debug!(target: CONNECTOR_TARGET, event = %event, "unhandled event");
                }
            }
        }
    }
}

fn run_reader(shared: &Shared, dispatch: &Sender<Dispatch>) {
    while !shared.is_shutdown() {
        if let Err(error) = listen_to_socket(shared, dispatch) {
            if shared.is_shutdown() {
                break;
            }
            warn!(
                target: CONNECTOR_TARGET,
                connector = %shared.settings.name,
                endpoint = %shared.settings.endpoint,
                error = %error,
                "daemon connection failed; retrying"
            );
            sleep_unless_shutdown(shared, shared.settings.reconnect_backoff);
        }
    }
}

fn listen_to_socket(shared: &Shared, dispatch: &Sender<Dispatch>) -> io::Result<()> {
    let stream = DaemonStream::connect(&shared.settings.endpoint)?;
    let reader = stream.try_clone()?;
    *shared.writer() = Some(stream);
    if shared.is_shutdown() {
        close_writer(shared);
        return Ok(());
    }
    info!(
        target: CONNECTOR_TARGET,
        connector = %shared.settings.name,
        endpoint = %shared.settings.endpoint,
        "connected to daemon"
    );
    // A closed dispatcher only means nobody listens for callbacks.
    let _delivered = dispatch.send(Dispatch::Connected);

    let result = read_events(shared, reader, dispatch);
    close_writer(shared);
    result
}

fn read_events(shared: &Shared, reader: DaemonStream, dispatch: &Sender<Dispatch>) -> io::Result<()> {
    let mut reader = BufReader::new(reader);
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        let count = reader.read_until(0, &mut buffer)?;
        if count == 0 {
            return Err(io::Error::new(
                ErrorKind::UnexpectedEof,
                "daemon closed the connection",
            ));
        }
        if buffer.last() != Some(&0) {
            debug!(
                target: CONNECTOR_TARGET,
                connector = %shared.settings.name,
                partial = %String::from_utf8_lossy(&buffer),
                "RCV incomplete"
            );
            continue;
        }
        buffer.pop();
        let raw = String::from_utf8_lossy(&buffer);
        debug!(
            target: CONNECTOR_TARGET,
            connector = %shared.settings.name,
            line = %raw,
            "RCV"
        );
        match DaemonEvent::parse(&raw) {
            Ok(event) => match event.cmd_number() {
                None => {
                    let _delivered = dispatch.send(Dispatch::Event(event));
                }
                Some(cmd_number) => shared.responses.add(cmd_number, event),
            },
            Err(error) => warn!(
                target: CONNECTOR_TARGET,
                connector = %shared.settings.name,
                error = %error,
                "problem parsing message"
            ),
        }
    }
}

fn close_writer(shared: &Shared) {
    if let Some(stream) = shared.writer().take()
        && let Err(error) = stream.shutdown()
    {
        debug!(
            target: CONNECTOR_TARGET,
            connector = %shared.settings.name,
            error = %error,
            "closing daemon stream"
        );
    }
}

fn sleep_unless_shutdown(shared: &Shared, backoff: Duration) {
    let deadline = Instant::now() + backoff;
    while !shared.is_shutdown() {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(SHUTDOWN_POLL.min(deadline - now));
    }
}
