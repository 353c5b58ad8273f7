//! Single-threaded message loop shared by the connectivity state machines.
//!
//! A [`Service`] owns all of its state and is driven from one worker thread.
//! Callers talk to it through a [`Mailbox`]; delayed work is expressed with a
//! [`TimerQueue`] that the service consults for its next deadline.

mod error;
mod mailbox;
mod timer;

pub use error::ActorError;
pub use mailbox::{Mailbox, Service, ServiceHandle, spawn};
pub use timer::TimerQueue;

/// Tracing target used by the message loop.
pub const ACTOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::mailbox");
