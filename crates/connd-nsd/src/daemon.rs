//! Commands for the native resolver daemon and the thread that runs them.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use connd_native::{Command, ConnectorError, NativeDaemonConnector};
use tracing::{debug, warn};

use crate::client::TransactionId;
use crate::error::{BackendError, NsdError};
use crate::info::ServiceInfo;

const DAEMON_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::daemon");

/// Domain every resolution is confined to.
pub const LOCAL_DOMAIN: &str = "local.";

/// One `mdnssd` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MdnsCommand {
    StartDaemon,
    StopDaemon,
    Discover {
        transaction: TransactionId,
        service_type: String,
        interface_index: u32,
    },
    StopDiscover {
        transaction: TransactionId,
    },
    Register {
        transaction: TransactionId,
        service: ServiceInfo,
        interface_index: u32,
    },
    StopRegister {
        transaction: TransactionId,
    },
    Resolve {
        transaction: TransactionId,
        name: String,
        service_type: String,
        interface_index: u32,
    },
    StopResolve {
        transaction: TransactionId,
    },
    GetAddrInfo {
        transaction: TransactionId,
        hostname: String,
        interface_index: u32,
    },
    StopGetAddrInfo {
        transaction: TransactionId,
    },
}

impl MdnsCommand {
    /// Transaction the command acts on, if any.
    #[must_use]
    pub const fn transaction(&self) -> Option<TransactionId> {
        match self {
            Self::StartDaemon | Self::StopDaemon => None,
            Self::Discover { transaction, .. }
            | Self::StopDiscover { transaction }
            | Self::Register { transaction, .. }
            | Self::StopRegister { transaction }
            | Self::Resolve { transaction, .. }
            | Self::StopResolve { transaction }
            | Self::GetAddrInfo { transaction, .. }
            | Self::StopGetAddrInfo { transaction } => Some(*transaction),
        }
    }

    /// Connector command line for this request.
    #[must_use]
    pub fn to_command(&self) -> Command {
        let command = Command::new("mdnssd");
        match self {
            Self::StartDaemon => command.arg("start-service"),
            Self::StopDaemon => command.arg("stop-service"),
            Self::Discover {
                transaction,
                service_type,
                interface_index,
            } => with_interface(
                command.arg("discover").arg(transaction).arg(service_type),
                *interface_index,
            ),
            Self::StopDiscover { transaction } => command.arg("stop-discover").arg(transaction),
            Self::Register {
                transaction,
                service,
                interface_index,
            } => {
                let command = command
                    .arg("register")
                    .arg(transaction)
                    .arg(&service.name)
                    .arg(&service.service_type)
                    .arg(service.port);
                // The interface is positional, so it needs the TXT slot even when empty.
                if service.txt_record.is_empty() && *interface_index == 0 {
                    command
                } else {
                    with_interface(
                        command.arg(hex::encode(&service.txt_record)),
                        *interface_index,
                    )
                }
            }
            Self::StopRegister { transaction } => command.arg("stop-register").arg(transaction),
            Self::Resolve {
                transaction,
                name,
                service_type,
                interface_index,
            } => with_interface(
                command
                    .arg("resolve")
                    .arg(transaction)
                    .arg(name)
                    .arg(service_type)
                    .arg(LOCAL_DOMAIN),
                *interface_index,
            ),
            Self::StopResolve { transaction } => command.arg("stop-resolve").arg(transaction),
            Self::GetAddrInfo {
                transaction,
                hostname,
                interface_index,
            } => with_interface(
                command.arg("getaddrinfo").arg(transaction).arg(hostname),
                *interface_index,
            ),
            Self::StopGetAddrInfo { transaction } => {
                command.arg("stop-getaddrinfo").arg(transaction)
            }
        }
    }
}

/// Appends `interface_index` unless it is 0, which lets the daemon pick.
fn with_interface(command: Command, interface_index: u32) -> Command {
    if interface_index == 0 {
        command
    } else {
        command.arg(interface_index)
    }
}

/// Backend executing resolver commands.
///
/// `submit` is called on the discovery worker and must only queue the
/// command. Failures that surface later are reported through
/// [`CommandFeedback`].
pub trait MdnsDaemon: Send {
    /// Queues `command`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the command cannot be queued.
    fn submit(&mut self, command: MdnsCommand) -> Result<(), BackendError>;
}

/// Receives commands that failed after being queued.
pub trait CommandFeedback: Send + Sync {
    /// `command` was rejected by the daemon or never answered.
    fn command_failed(&self, command: MdnsCommand, error: &ConnectorError);
}

/// [`MdnsDaemon`] that runs commands in order on a dedicated thread over a
/// [`NativeDaemonConnector`].
pub struct NativeMdnsDaemon {
    queue: Option<Sender<MdnsCommand>>,
    worker: Option<JoinHandle<()>>,
}

impl NativeMdnsDaemon {
    /// Starts the command thread.
    ///
    /// # Errors
    ///
    /// Returns [`NsdError::Spawn`] when the thread cannot be created.
    pub fn spawn(
        connector: Arc<NativeDaemonConnector>,
        feedback: Arc<dyn CommandFeedback>,
    ) -> Result<Self, NsdError> {
        let (queue, commands) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("connd-mdnssd".to_owned())
            .spawn(move || run_commands(&commands, &connector, feedback.as_ref()))
            .map_err(|source| NsdError::Spawn {
                name: "connd-mdnssd",
                source,
            })?;
        Ok(Self {
            queue: Some(queue),
            worker: Some(worker),
        })
    }
}

impl MdnsDaemon for NativeMdnsDaemon {
    fn submit(&mut self, command: MdnsCommand) -> Result<(), BackendError> {
        let queue = self.queue.as_ref().ok_or(BackendError::QueueClosed)?;
        queue.send(command).map_err(|_| BackendError::QueueClosed)
    }
}

impl Drop for NativeMdnsDaemon {
    fn drop(&mut self) {
        self.queue.take();
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            warn!(target: DAEMON_TARGET, "mdnssd command thread panicked");
        }
    }
}

fn run_commands(
    commands: &Receiver<MdnsCommand>,
    connector: &NativeDaemonConnector,
    feedback: &dyn CommandFeedback,
) {
    for command in commands {
        let line = command.to_command();
        match connector.execute(&line) {
            Ok(response) => {
                debug!(target: DAEMON_TARGET, command = %line, %response, "mdnssd command completed");
            }
            Err(error) => {
                warn!(target: DAEMON_TARGET, command = %line, %error, "mdnssd command failed");
                feedback.command_failed(command, &error);
            }
        }
    }
    debug!(target: DAEMON_TARGET, "mdnssd command queue closed");
}
