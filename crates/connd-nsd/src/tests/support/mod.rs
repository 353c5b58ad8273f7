//! Recording collaborators and a clock-driven harness around the machine.

mod doubles;
mod lab;

pub use doubles::{
    ClientEvent, ManagerCall, RecordingClient, RecordingDaemon, RecordingManager,
    RecordingObserver,
};
pub use lab::{CLEANUP, Lab};
