//! Foreground process lifecycle: bootstrap, wait for a signal, shut down.

use std::io;
use std::sync::Arc;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use thiserror::Error;
use tracing::{info, warn};

use rebind_registry::{ComponentFactory, KindedFactory};

use crate::bootstrap::{BootstrapError, ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::health::{HealthReporter, StructuredHealthReporter};

const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");

/// Abstraction over shutdown notification mechanisms.
pub trait ShutdownSignal: Send + Sync {
    /// Blocks until shutdown should proceed, returning the signal number.
    ///
    /// # Errors
    ///
    /// Returns [`ShutdownError`] when no signal can be received.
    fn wait(&self) -> Result<i32, ShutdownError>;
}

/// Errors reported by shutdown signal listeners.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The signal stream ended without delivering a signal.
    #[error("signal listener closed before a signal arrived")]
    Closed,
}

/// Shutdown listener that waits for termination signals.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemShutdownSignal;

impl ShutdownSignal for SystemShutdownSignal {
    fn wait(&self) -> Result<i32, ShutdownError> {
        let mut signals = Signals::new([SIGTERM, SIGINT, SIGQUIT, SIGHUP])
            .map_err(|source| ShutdownError::Install { source })?;
        signals.forever().next().ok_or(ShutdownError::Closed)
    }
}

/// Errors that end a host run.
#[derive(Debug, Error)]
pub enum RunError {
    /// The host never started serving.
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    /// Waiting for shutdown failed; the host was stopped regardless.
    #[error(transparent)]
    Shutdown(#[from] ShutdownError),
}

/// Runs the host with production collaborators until a termination signal.
///
/// No component kinds are registered with the factory, so catalogue entries
/// are resolvable but every install reports an unsupported kind.
///
/// # Errors
///
/// Returns [`RunError`] when bootstrap fails or signals cannot be received.
pub fn run_host() -> Result<(), RunError> {
    run_host_with(
        &SystemConfigLoader,
        Arc::new(StructuredHealthReporter::new()),
        Arc::new(KindedFactory::new()),
        &SystemShutdownSignal,
    )
}

/// Runs the host with the supplied collaborators.
///
/// # Errors
///
/// Returns [`RunError`] when bootstrap fails or `shutdown` cannot deliver a
/// signal. In the latter case the host is still shut down before returning.
pub fn run_host_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    factory: Arc<dyn ComponentFactory>,
    shutdown: &dyn ShutdownSignal,
) -> Result<(), RunError> {
    let host = bootstrap_with(loader, Arc::clone(&reporter), factory)?;
    info!(
        target: PROCESS_TARGET,
        slot = %host.slot(),
        "waiting for shutdown signal"
    );
    let waited = shutdown.wait();
    if let Ok(signal) = waited {
        reporter.shutdown_requested(signal);
    }
    match host.snapshot_json() {
        Ok(snapshot) => info!(target: PROCESS_TARGET, %snapshot, "final registry state"),
        Err(error) => warn!(target: PROCESS_TARGET, %error, "failed to encode registry state"),
    }
    host.shutdown();
    waited?;
    Ok(())
}
