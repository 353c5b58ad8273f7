use std::io;

use connd_actor::ActorError;
use thiserror::Error;

/// Failures of the discovery service itself, as opposed to the per-request
/// [`crate::NsdFailure`] codes delivered to clients.
#[derive(Debug, Error)]
pub enum NsdError {
    /// The discovery worker has stopped.
    #[error("discovery service stopped")]
    ServiceStopped(#[from] ActorError),
    /// A helper thread could not be started.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        /// Thread name.
        name: &'static str,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

/// A backend could not accept a command.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BackendError {
    /// The command thread has exited.
    #[error("mdnssd command queue is closed")]
    QueueClosed,
    /// The backend refused the command outright.
    #[error("mdnssd rejected the command")]
    Rejected,
}
