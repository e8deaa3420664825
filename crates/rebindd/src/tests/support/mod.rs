//! Test harness utilities for the host bootstrap suites.

mod config_loader;
mod factory;
mod reporter;
mod world;

pub use config_loader::{FailingConfigLoader, TestConfigLoader, sync_service};
pub use factory::{EchoFactory, ImmediateShutdown};
pub use reporter::{HealthEvent, RecordingHealthReporter};
pub use world::{TestWorld, world};
