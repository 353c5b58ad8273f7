use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::DaemonEvent;

/// Failures of a single daemon command.
///
/// None of these close the connection; a severed socket is handled by the
/// reader thread reconnecting.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// A command or argument contained a NUL byte.
    #[error("unexpected NUL byte in argument '{argument}'")]
    InvalidArgument {
        /// The rejected text, with NULs shown escaped.
        argument: String,
    },
    /// The daemon answered with a `5xx` client error.
    #[error("command '{command}' rejected by daemon: {event}")]
    Argument {
        /// Command as sent, without the terminator.
        command: String,
        /// The final response.
        event: DaemonEvent,
    },
    /// The daemon answered with a `4xx` server error.
    #[error("command '{command}' failed in daemon: {event}")]
    Failure {
        /// Command as sent, without the terminator.
        command: String,
        /// The final response.
        event: DaemonEvent,
    },
    /// No final response arrived in time.
    #[error("timed out after {timeout:?} waiting for '{command}'")]
    Timeout {
        /// Command as sent, without the terminator.
        command: String,
        /// Time waited.
        timeout: Duration,
    },
    /// There is no live connection to write to.
    #[error("daemon is not connected; dropped '{command}'")]
    NotConnected {
        /// Command that could not be written.
        command: String,
    },
    /// Writing the command failed.
    #[error("failed to send '{command}': {source}")]
    Io {
        /// Command that could not be written.
        command: String,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// `execute` expected exactly one response.
    #[error("expected exactly one response to '{command}', received {count}")]
    UnexpectedResponseCount {
        /// Command as sent.
        command: String,
        /// Number of responses received.
        count: usize,
    },
}

impl ConnectorError {
    /// The final daemon response behind the error, when there is one.
    #[must_use]
    pub fn event(&self) -> Option<&DaemonEvent> {
        match self {
            Self::Argument { event, .. } | Self::Failure { event, .. } => Some(event),
            _ => None,
        }
    }
}

/// Reasons a raw line could not be parsed into a [`DaemonEvent`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventParseError {
    /// The line had too few space-separated tokens.
    #[error("insufficient arguments in '{0}'")]
    Insufficient(String),
    /// The response code was not numeric.
    #[error("invalid response code in '{0}'")]
    InvalidCode(String),
    /// The sequence number was not numeric.
    #[error("invalid sequence number in '{0}'")]
    InvalidSequence(String),
}
