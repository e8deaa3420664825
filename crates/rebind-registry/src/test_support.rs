//! Test doubles shared by unit and behaviour tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use crate::catalog::ComponentCatalog;
use crate::client::{ConnectionListener, RegistryConnector, ServiceClient};
use crate::component::{BindFlags, ComponentKind, ComponentMetadata, ComponentName, Intent};
use crate::error::InstallFailure;
use crate::executor::{OwnerContext, SerialQueue};
use crate::host::{Component, ComponentFactory, ProcessAnchor, SlotAnchor};
use crate::loopback::LoopbackConnector;
use crate::process::{ProcessId, ProcessSlot};
use crate::registry::{
    CallerChannel, ConnectionSink, HostCollaborators, RegistryService, ServiceRegistry,
};
use crate::transport::{LocalObject, RemoteHandle, RemoteObject};

pub(crate) const MAIN_QUEUE: &str = "registry-main";

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poison| poison.into_inner())
}

pub(crate) fn sync_service() -> ComponentName {
    ComponentName::new("demo.plugin", "SyncService")
}

pub(crate) fn upload_service() -> ComponentName {
    ComponentName::new("demo.plugin", "UploadService")
}

pub(crate) fn test_catalog() -> ComponentCatalog {
    ComponentCatalog::from_entries([
        ComponentMetadata::new(
            sync_service(),
            "demo",
            ProcessSlot::Plugin(0),
            ComponentKind::Plugin,
        ),
        ComponentMetadata::new(
            upload_service(),
            "demo",
            ProcessSlot::Persistent,
            ComponentKind::Host,
        ),
    ])
    .expect("test catalogue is valid")
}

// ---------------------------------------------------------------------------
// Component probe
// ---------------------------------------------------------------------------

/// Component counting every entry point invocation.
#[derive(Default)]
pub(crate) struct ProbeComponent {
    null_binding: bool,
    pub(crate) starts: AtomicUsize,
    pub(crate) creates: AtomicUsize,
    pub(crate) destroys: AtomicUsize,
    pub(crate) destroyed: AtomicUsize,
    pub(crate) start_threads: Mutex<Vec<Option<String>>>,
    bindings: Mutex<Vec<Arc<LocalObject>>>,
}

impl ProbeComponent {
    pub(crate) fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    /// Simulates the death of every binding handed out so far.
    pub(crate) fn kill_bindings(&self) {
        let bindings = lock(&self.bindings).clone();
        for binding in bindings {
            binding.kill();
        }
    }
}

impl Component for ProbeComponent {
    fn on_start(&self, _intent: &Intent) {
        self.starts.fetch_add(1, Ordering::SeqCst);
        lock(&self.start_threads).push(thread::current().name().map(str::to_owned));
    }

    fn create_binding(&self, intent: &Intent) -> Option<RemoteHandle> {
        let episode = self.creates.fetch_add(1, Ordering::SeqCst);
        if self.null_binding {
            return None;
        }
        let binding = Arc::new(LocalObject::new(format!("{}#{episode}", intent.component())));
        lock(&self.bindings).push(Arc::clone(&binding));
        Some(RemoteHandle::new(binding))
    }

    fn destroy_binding(&self, _intent: &Intent) {
        self.destroys.fetch_add(1, Ordering::SeqCst);
    }

    fn on_destroy(&self) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Factory producing [`ProbeComponent`]s and remembering each one.
#[derive(Default)]
pub(crate) struct ProbeFactory {
    pub(crate) instances: Mutex<Vec<Arc<ProbeComponent>>>,
    pub(crate) failures_left: AtomicUsize,
    pub(crate) delay: Mutex<Option<Duration>>,
    pub(crate) null_binding: bool,
}

impl ProbeFactory {
    pub(crate) fn with_null_binding() -> Self {
        Self {
            null_binding: true,
            ..Self::default()
        }
    }

    pub(crate) fn fail_next(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    pub(crate) fn delay_by(&self, delay: Option<Duration>) {
        *lock(&self.delay) = delay;
    }

    pub(crate) fn instantiations(&self) -> usize {
        lock(&self.instances).len()
    }

    pub(crate) fn latest(&self) -> Option<Arc<ProbeComponent>> {
        lock(&self.instances).last().cloned()
    }
}

impl ComponentFactory for ProbeFactory {
    fn instantiate(
        &self,
        metadata: &ComponentMetadata,
    ) -> Result<Arc<dyn Component>, InstallFailure> {
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(InstallFailure::Factory {
                component: metadata.name().to_string(),
                message: String::from("probe failure"),
            });
        }
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            thread::sleep(delay);
        }
        let instance = Arc::new(ProbeComponent {
            null_binding: self.null_binding,
            ..ProbeComponent::default()
        });
        lock(&self.instances).push(Arc::clone(&instance));
        Ok(instance)
    }
}

// ---------------------------------------------------------------------------
// Connection sink
// ---------------------------------------------------------------------------

/// Sink recording every event the registry delivers.
#[derive(Default)]
pub(crate) struct RecordingSink {
    pub(crate) events: Mutex<Vec<(ComponentName, Option<RemoteHandle>)>>,
}

impl RecordingSink {
    pub(crate) fn events(&self) -> Vec<(ComponentName, Option<RemoteHandle>)> {
        lock(&self.events).clone()
    }

    pub(crate) fn last_handle(&self) -> Option<RemoteHandle> {
        lock(&self.events)
            .last()
            .and_then(|(_, handle)| handle.clone())
    }
}

impl ConnectionSink for RecordingSink {
    fn connected(&self, name: &ComponentName, handle: Option<RemoteHandle>) {
        lock(&self.events).push((name.clone(), handle));
    }
}

// ---------------------------------------------------------------------------
// Registry harness
// ---------------------------------------------------------------------------

/// A registry wired to probe collaborators.
pub(crate) struct Harness {
    pub(crate) registry: ServiceRegistry,
    pub(crate) factory: Arc<ProbeFactory>,
    pub(crate) anchor: Arc<SlotAnchor>,
    pub(crate) main: Arc<SerialQueue>,
}

impl Harness {
    pub(crate) fn new(factory: ProbeFactory, install_timeout: Duration) -> Self {
        let main = Arc::new(SerialQueue::spawn(MAIN_QUEUE).expect("main queue starts"));
        let factory = Arc::new(factory);
        let anchor = Arc::new(SlotAnchor::new());
        let registry = ServiceRegistry::new(
            HostCollaborators {
                resolver: Arc::new(test_catalog()),
                factory: Arc::clone(&factory) as Arc<dyn ComponentFactory>,
                anchor: Arc::clone(&anchor) as Arc<dyn ProcessAnchor>,
            },
            Arc::clone(&main),
            install_timeout,
        );
        Self {
            registry,
            factory,
            anchor,
            main,
        }
    }

    /// Waits until every job queued on the main context has run.
    pub(crate) fn drain_main(&self) {
        let drained = self.main.run_sync(|| (), Duration::from_secs(5));
        assert!(drained.is_ok(), "main context did not drain");
    }
}

/// A client process identity whose death can be simulated.
pub(crate) struct ClientProcess {
    pub(crate) object: Arc<LocalObject>,
    pub(crate) caller: CallerChannel,
}

impl ClientProcess {
    pub(crate) fn new(pid: u32) -> Self {
        let object = Arc::new(LocalObject::new(format!("client-{pid}")));
        let caller = CallerChannel::new(
            ProcessId::new(pid),
            RemoteHandle::new(Arc::clone(&object) as Arc<dyn RemoteObject>),
        );
        Self { object, caller }
    }
}

// ---------------------------------------------------------------------------
// Client side
// ---------------------------------------------------------------------------

pub(crate) const OWNER_QUEUE: &str = "owner-main";

/// Callback observed by a [`RecordingListener`].
#[derive(Debug, Clone)]
pub(crate) enum ListenerEvent {
    Connected(ComponentName, RemoteHandle),
    Disconnected(ComponentName),
}

impl ListenerEvent {
    pub(crate) fn describe(&self) -> String {
        match self {
            Self::Connected(name, _) => format!("connected {name}"),
            Self::Disconnected(name) => format!("disconnected {name}"),
        }
    }
}

/// Listener recording each callback and the thread it arrived on.
#[derive(Default)]
pub(crate) struct RecordingListener {
    events: Mutex<Vec<ListenerEvent>>,
    threads: Mutex<Vec<Option<String>>>,
}

impl RecordingListener {
    pub(crate) fn events(&self) -> Vec<ListenerEvent> {
        lock(&self.events).clone()
    }

    pub(crate) fn described(&self) -> Vec<String> {
        lock(&self.events).iter().map(ListenerEvent::describe).collect()
    }

    pub(crate) fn threads(&self) -> Vec<Option<String>> {
        lock(&self.threads).clone()
    }

    fn record(&self, event: ListenerEvent) {
        lock(&self.threads).push(thread::current().name().map(str::to_owned));
        lock(&self.events).push(event);
    }
}

impl ConnectionListener for RecordingListener {
    fn on_connected(&self, name: &ComponentName, handle: RemoteHandle) {
        self.record(ListenerEvent::Connected(name.clone(), handle));
    }

    fn on_disconnected(&self, name: &ComponentName) {
        self.record(ListenerEvent::Disconnected(name.clone()));
    }
}

/// A registry reachable over loopback plus one client process using it.
pub(crate) struct ClientHarness {
    pub(crate) host: Harness,
    pub(crate) connector: Arc<LoopbackConnector>,
    pub(crate) registry_object: Arc<LocalObject>,
    pub(crate) process: ClientProcess,
    pub(crate) client: ServiceClient,
    pub(crate) owner: OwnerContext,
    pub(crate) recorder: Arc<RecordingListener>,
    pub(crate) listener: Arc<dyn ConnectionListener>,
}

impl ClientHarness {
    pub(crate) fn new() -> Self {
        let host = Harness::new(ProbeFactory::default(), Duration::from_secs(5));
        let connector = Arc::new(LoopbackConnector::new());
        let registry_object = Self::serve(&connector, &host);
        let process = ClientProcess::new(4242);
        let client = ServiceClient::new(
            process.caller.clone(),
            Arc::new(test_catalog()),
            Arc::clone(&connector) as Arc<dyn RegistryConnector>,
        );
        let owner = OwnerContext::new(
            "activity",
            Arc::new(SerialQueue::spawn(OWNER_QUEUE).expect("owner queue starts")),
        );
        let recorder = Arc::new(RecordingListener::default());
        let listener = Arc::clone(&recorder) as Arc<dyn ConnectionListener>;
        Self {
            host,
            connector,
            registry_object,
            process,
            client,
            owner,
            recorder,
            listener,
        }
    }

    /// Registers the host registry for every slot the test catalogue uses.
    pub(crate) fn serve(connector: &LoopbackConnector, host: &Harness) -> Arc<LocalObject> {
        let service = Arc::new(host.registry.clone());
        connector.register(
            ProcessSlot::Persistent,
            Arc::clone(&service) as Arc<dyn RegistryService>,
        );
        connector.register(ProcessSlot::Plugin(0), service)
    }

    pub(crate) fn bind(&self, flags: BindFlags) -> bool {
        self.client.bind(
            &self.owner,
            &Intent::new(sync_service()),
            &self.listener,
            flags,
        )
    }

    /// Waits until every callback queued for the owner has run.
    pub(crate) fn drain_owner(&self) {
        let drained = self.owner.queue().run_sync(|| (), Duration::from_secs(5));
        assert!(drained.is_ok(), "owner context did not drain");
    }
}
