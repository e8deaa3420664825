//! Component, listener, and shutdown doubles.

use std::sync::{Arc, Mutex};

use rebind_registry::{
    Component, ComponentFactory, ComponentKind, ComponentMetadata, ComponentName,
    ConnectionListener, InstallFailure, Intent, KindedFactory, LocalObject, RemoteHandle,
};

use crate::process::{ShutdownError, ShutdownSignal};

/// Component handing out one live binding object per episode.
struct Echo;

impl Component for Echo {
    fn on_start(&self, _intent: &Intent) {}

    fn create_binding(&self, intent: &Intent) -> Option<RemoteHandle> {
        Some(RemoteHandle::from_object(LocalObject::new(
            intent.component().to_string(),
        )))
    }

    fn destroy_binding(&self, _intent: &Intent) {}

    fn on_destroy(&self) {}
}

/// Factory instantiating [`Echo`] for every plugin component.
pub struct EchoFactory;

impl EchoFactory {
    /// Builds a kinded factory with the echo factory registered for plugins.
    pub fn kinded() -> Arc<KindedFactory> {
        let mut factory = KindedFactory::new();
        factory.register(ComponentKind::Plugin, Arc::new(Self));
        Arc::new(factory)
    }
}

impl ComponentFactory for EchoFactory {
    fn instantiate(
        &self,
        _metadata: &ComponentMetadata,
    ) -> Result<Arc<dyn Component>, InstallFailure> {
        Ok(Arc::new(Echo))
    }
}

/// Listener remembering which components connected.
#[derive(Default)]
pub struct RecordingListener {
    connected: Mutex<Vec<ComponentName>>,
}

impl RecordingListener {
    pub fn connected(&self) -> Vec<ComponentName> {
        self.connected.lock().expect("listener mutex poisoned").clone()
    }
}

impl ConnectionListener for RecordingListener {
    fn on_connected(&self, name: &ComponentName, _handle: RemoteHandle) {
        self.connected
            .lock()
            .expect("listener mutex poisoned")
            .push(name.clone());
    }

    fn on_disconnected(&self, _name: &ComponentName) {}
}

/// Shutdown signal that fires as soon as it is awaited.
pub struct ImmediateShutdown(pub i32);

impl ShutdownSignal for ImmediateShutdown {
    fn wait(&self) -> Result<i32, ShutdownError> {
        Ok(self.0)
    }
}
