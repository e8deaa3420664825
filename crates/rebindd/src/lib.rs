//! Host daemon for the rebind binding registry.
//!
//! `rebindd` hosts components for one process slot. Bootstrap loads the
//! layered [`rebind_config::Config`], installs structured telemetry, reads
//! the optional component catalogue, and starts a
//! [`rebind_registry::ServiceRegistry`] whose main context is a dedicated
//! serial queue. The registry is published through a
//! [`rebind_registry::LoopbackConnector`] so in-process clients can bind to
//! it. Each stage reports to a [`HealthReporter`], so a failed start is
//! visible in the logs before the process exits.
//!
//! The host runs in the foreground until SIGTERM, SIGINT, SIGQUIT, or SIGHUP
//! arrives, logs the final registry snapshot, and stops serving.

mod bootstrap;
mod health;
mod process;
pub mod telemetry;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Host, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{
    RunError, ShutdownError, ShutdownSignal, SystemShutdownSignal, run_host, run_host_with,
};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
