//! Process lifecycle: the single-instance guard, shutdown signals and the
//! foreground run loop.

mod errors;
mod guard;
mod run;
mod shutdown;

pub use errors::{GuardError, LaunchError};
pub use guard::InstanceGuard;
pub use run::run_daemon;
pub use shutdown::{ShutdownError, ShutdownSignal, SystemShutdownSignal};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
