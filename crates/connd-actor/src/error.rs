use std::io;

use thiserror::Error;

/// Failures raised while talking to a service worker.
#[derive(Debug, Error)]
pub enum ActorError {
    /// The worker thread has exited and its mailbox is closed.
    #[error("service '{name}' is no longer running")]
    Stopped {
        /// Name of the worker thread.
        name: String,
    },
    /// The worker thread could not be spawned.
    #[error("failed to spawn service '{name}': {source}")]
    Spawn {
        /// Name of the worker thread.
        name: String,
        /// Underlying spawn failure.
        #[source]
        source: io::Error,
    },
    /// The worker thread panicked before it could be joined.
    #[error("service '{name}' panicked")]
    Panicked {
        /// Name of the worker thread.
        name: String,
    },
}
