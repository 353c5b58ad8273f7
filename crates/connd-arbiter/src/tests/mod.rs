//! Test suites for the arbitration engine.

mod legacy;
mod lifecycle;
mod support;
