//! Test suites for the daemon crate.

mod services;
mod support;
mod unit;
