//! Test suites for the discovery machine.

mod support;
