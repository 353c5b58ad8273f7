//! Connector for native helper daemons speaking the NUL-framed command
//! protocol.
//!
//! Commands are written as `<seq> <cmd> <args>\0`. Each response line starts
//! with a three digit code followed by the sequence number it answers.
//! Unsolicited lines (`6xx`) carry no sequence number and are delivered to
//! [`DaemonCallbacks::on_event`] on a dedicated callback thread.

mod command;
mod connector;
mod error;
mod event;
mod queue;
mod stream;

pub use command::{Command, append_escaped};
pub use connector::{ConnectorSettings, DaemonCallbacks, NativeDaemonConnector};
pub use error::{ConnectorError, EventParseError};
pub use event::{DaemonEvent, ResponseClass, unescape_args};
pub use queue::{PendingCommand, ResponseQueue};
pub use stream::DaemonStream;

const CONNECTOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::connector");
