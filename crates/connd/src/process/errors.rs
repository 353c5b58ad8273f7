//! Errors raised while launching and supervising the daemon process.

use std::io;
use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

use crate::bootstrap::BootstrapError;
use crate::services::ServiceStartupError;

use super::shutdown::ShutdownError;

/// Failures of the single-instance guard.
#[derive(Debug, Error)]
pub enum GuardError {
    /// Lock file creation failed.
    #[error("failed to create lock file '{path}': {source}")]
    LockCreate {
        /// Lock file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A live daemon already holds the lock.
    #[error("daemon already running with pid {pid}")]
    AlreadyRunning {
        /// PID recorded in the existing pid file.
        pid: u32,
    },
    /// A stale runtime file could not be removed.
    #[error("failed to remove stale file '{path}': {source}")]
    Cleanup {
        /// File that could not be removed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Writing the pid file failed.
    #[error("failed to write pid file '{path}': {source}")]
    PidWrite {
        /// Pid file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Probing the recorded pid failed.
    #[error("failed to check existing process {pid}: {source}")]
    CheckProcess {
        /// Recorded pid.
        pid: u32,
        /// Underlying OS error.
        source: Errno,
    },
}

/// Errors surfaced by [`run_daemon`](super::run_daemon).
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Bootstrapping the daemon failed.
    #[error("daemon bootstrap failed: {source}")]
    Bootstrap {
        /// Underlying bootstrap error.
        #[source]
        source: BootstrapError,
    },
    /// A service could not be started.
    #[error(transparent)]
    Service(#[from] ServiceStartupError),
    /// Waiting for a shutdown signal failed.
    #[error("failed to await shutdown signal: {source}")]
    Shutdown {
        /// Underlying signal error.
        #[source]
        source: ShutdownError,
    },
}

impl From<BootstrapError> for LaunchError {
    fn from(source: BootstrapError) -> Self {
        Self::Bootstrap { source }
    }
}

impl From<ShutdownError> for LaunchError {
    fn from(source: ShutdownError) -> Self {
        Self::Shutdown { source }
    }
}
