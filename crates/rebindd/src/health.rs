//! Structured health reporting for host lifecycle events.

use std::sync::Arc;

use camino::Utf8Path;
use rebind_config::Config;
use rebind_registry::RegistrySnapshot;

use crate::bootstrap::BootstrapError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer for host lifecycle events.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked once the registry is serving; `components` counts the
    /// catalogue entries.
    fn bootstrap_succeeded(&self, config: &Config, components: usize);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked when a termination signal arrives.
    fn shutdown_requested(&self, signal: i32);

    /// Invoked after the registry stopped serving, with its final state.
    fn host_stopped(&self, snapshot: &RegistrySnapshot);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config, components: usize) {
        (**self).bootstrap_succeeded(config, components);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn shutdown_requested(&self, signal: i32) {
        (**self).shutdown_requested(signal);
    }

    fn host_stopped(&self, snapshot: &RegistrySnapshot) {
        (**self).host_stopped(snapshot);
    }
}

/// Reporter that records lifecycle events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting host bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config, components: usize) {
        let catalog = config.catalog_path().map_or("<none>", Utf8Path::as_str);
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            host_process = %config.host_process(),
            install_timeout_ms = config.install_timeout_ms,
            catalog,
            components,
            log_filter = %config.log_filter(),
            log_format = ?config.log_format(),
            "host registry serving"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "host bootstrap failed"
        );
    }

    fn shutdown_requested(&self, signal: i32) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "shutdown_requested",
            signal,
            "shutdown requested"
        );
    }

    fn host_stopped(&self, snapshot: &RegistrySnapshot) {
        let connections: usize = snapshot.components.iter().map(|c| c.connections).sum();
        tracing::info!(
            target: HEALTH_TARGET,
            event = "host_stopped",
            components = snapshot.components.len(),
            connections,
            client_processes = snapshot.client_processes,
            "host registry stopped"
        );
    }
}
