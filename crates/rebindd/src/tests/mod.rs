//! Test suites for the host daemon.

mod behaviour;
mod support;
