//! Shutdown signals that fire without an operator.

use std::io;

use crate::process::{ShutdownError, ShutdownSignal};

/// Signal that fires as soon as it is awaited.
pub struct ImmediateSignal;

impl ShutdownSignal for ImmediateSignal {
    fn wait(&self) -> Result<(), ShutdownError> {
        Ok(())
    }
}

/// Signal whose handlers cannot be installed.
pub struct FailingSignal;

impl ShutdownSignal for FailingSignal {
    fn wait(&self) -> Result<(), ShutdownError> {
        Err(ShutdownError::Install {
            source: io::Error::other("signal handlers unavailable"),
        })
    }
}
