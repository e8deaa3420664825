//! Scenario world: loader, reporter, and the bootstrapped host.

use std::cell::RefCell;
use std::sync::Arc;
use std::time::Duration;

use rebind_registry::{
    BindFlags, CallerChannel, ConnectionListener, Intent, LocalObject, OwnerContext, ProcessId,
    ProcessSlot, RemoteHandle, SerialQueue, ServiceClient,
};

use crate::bootstrap::{BootstrapError, ConfigLoader, Host, bootstrap_with};

use super::config_loader::{FailingConfigLoader, TestConfigLoader, sync_service};
use super::factory::{EchoFactory, RecordingListener};
use super::reporter::RecordingHealthReporter;

/// Scenario world shared across BDD steps.
pub struct TestWorld {
    loader: Box<dyn ConfigLoader>,
    pub reporter: Arc<RecordingHealthReporter>,
    host: Option<Host>,
    bootstrap_error: Option<BootstrapError>,
    pub listener: Arc<RecordingListener>,
    pub bind_result: Option<bool>,
}

impl TestWorld {
    pub fn new() -> Self {
        Self {
            loader: Box::new(TestConfigLoader::new()),
            reporter: Arc::new(RecordingHealthReporter::default()),
            host: None,
            bootstrap_error: None,
            listener: Arc::new(RecordingListener::default()),
            bind_result: None,
        }
    }

    pub fn use_failing_loader(&mut self) {
        self.loader = Box::new(FailingConfigLoader);
    }

    pub fn use_process(&mut self, process: &str) {
        self.loader = Box::new(TestConfigLoader::for_process(process));
    }

    /// Runs the bootstrap sequence once.
    pub fn bootstrap(&mut self) {
        if self.host.is_some() || self.bootstrap_error.is_some() {
            return;
        }
        match bootstrap_with(&*self.loader, self.reporter.clone(), EchoFactory::kinded()) {
            Ok(host) => self.host = Some(host),
            Err(error) => self.bootstrap_error = Some(error),
        }
    }

    pub const fn bootstrap_error(&self) -> Option<&BootstrapError> {
        self.bootstrap_error.as_ref()
    }

    pub const fn host(&self) -> Option<&Host> {
        self.host.as_ref()
    }

    /// Binds the sync service from a fresh client of the host.
    pub fn bind_sync_service(&mut self) {
        let host = self.host.as_ref().expect("host bootstrapped");
        let caller = CallerChannel::new(
            ProcessId::new(9100),
            RemoteHandle::from_object(LocalObject::new("bdd-client")),
        );
        let client = ServiceClient::new(
            caller,
            Arc::clone(host.catalog()) as _,
            Arc::clone(host.connector()) as _,
        );
        let queue = Arc::new(SerialQueue::spawn("bdd-owner").expect("spawn owner queue"));
        let owner = OwnerContext::new("bdd-owner", Arc::clone(&queue));
        let listener: Arc<dyn ConnectionListener> = Arc::clone(&self.listener) as _;
        let bound = client.bind(
            &owner,
            &Intent::new(sync_service()),
            &listener,
            BindFlags::AUTO_CREATE,
        );
        queue
            .run_sync(|| (), Duration::from_secs(5))
            .expect("owner queue drains");
        self.bind_result = Some(bound);
    }

    pub fn connections(&self) -> usize {
        self.host()
            .and_then(|host| {
                host.snapshot()
                    .component(&sync_service())
                    .map(|entry| entry.connections)
            })
            .unwrap_or_default()
    }

    pub fn serves(&self, slot: ProcessSlot) -> bool {
        self.host().is_some_and(|host| host.slot() == slot)
    }

    pub fn shutdown(&mut self) {
        if let Some(host) = self.host.take() {
            host.shutdown();
        }
    }
}

/// Fixture constructing a fresh world for each scenario.
pub fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::new())
}
