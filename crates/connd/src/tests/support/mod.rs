//! Shared doubles for the daemon tests.

mod config_loader;
mod provider;
mod reporter;
mod signal;

pub use config_loader::{FailingConfigLoader, TestConfigLoader};
pub use provider::{ProviderCall, RecordingServiceProvider};
pub use reporter::{HealthEvent, RecordingHealthReporter};
pub use signal::{FailingSignal, ImmediateSignal};
