use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use connd::{
    StructuredHealthReporter, SystemConfigLoader, SystemServiceProvider, SystemShutdownSignal,
    run_daemon,
};

fn main() -> ExitCode {
    match run_daemon(
        &SystemConfigLoader,
        Arc::new(StructuredHealthReporter::new()),
        SystemServiceProvider::default(),
        &SystemShutdownSignal,
    ) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            // Telemetry may not be installed yet.
            let _ = writeln!(io::stderr().lock(), "connd: {error}");
            ExitCode::FAILURE
        }
    }
}
