//! Recording collaborators and a clock-driven harness around the engine.

mod doubles;
mod lab;

pub use doubles::{
    DnsChange, FactoryCall, Need, RecordingBroadcasts, RecordingCallback, RecordingDns,
    RecordingFactory, RecordingProbe, Release, TestAgent,
};
pub use lab::{LINGER, Lab, RESTORE, internet, lifecycle, owner};
