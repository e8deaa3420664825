//! Reporter capturing lifecycle events for assertions.

use std::sync::Mutex;

use rebind_config::Config;
use rebind_registry::RegistrySnapshot;

use crate::bootstrap::BootstrapError;
use crate::health::HealthReporter;

/// Lifecycle event observed by [`RecordingHealthReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    BootstrapStarting,
    BootstrapSucceeded { components: usize },
    BootstrapFailed(String),
    ShutdownRequested(i32),
    HostStopped { components: usize, clients: usize },
}

#[derive(Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config, components: usize) {
        self.record(HealthEvent::BootstrapSucceeded { components });
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn shutdown_requested(&self, signal: i32) {
        self.record(HealthEvent::ShutdownRequested(signal));
    }

    fn host_stopped(&self, snapshot: &RegistrySnapshot) {
        self.record(HealthEvent::HostStopped {
            components: snapshot.components.len(),
            clients: snapshot.client_processes,
        });
    }
}
