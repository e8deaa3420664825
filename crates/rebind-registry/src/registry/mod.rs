//! Server-side binding registry.
//!
//! One [`ServiceRegistry`] runs in each host process. It owns every record
//! describing which components are installed, which clients are bound to
//! them, and through which connections. All five operations of
//! [`RegistryService`] run under one registry-wide lock.
//!
//! Installing a component hops onto the registry's main execution context
//! with a bounded wait. Code running on that context must never call back
//! into the same registry synchronously; such a call waits for the lock the
//! installer holds and is only released by the install timeout.

mod records;
mod snapshot;
mod state;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::component::{BindFlags, ComponentMetadata, ComponentName, Intent};
use crate::error::{InstallFailure, RegistryError, RendezvousError, TransportError};
use crate::executor::SerialQueue;
use crate::host::{Component, ComponentFactory, ComponentResolver, ProcessAnchor};
use crate::process::{ConnectionHandle, ProcessId};
use crate::transport::RemoteHandle;

use self::records::{ClientProcessRecord, ComponentRecord, ComponentState};
use self::state::{BindRequest, RegistryState};

pub use self::snapshot::{ComponentSnapshot, RegistrySnapshot};

pub(crate) const REGISTRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::registry");

/// Receives connection events for one client connection handle.
///
/// Called while the registry lock is held; implementations must hand the
/// event off without blocking.
pub trait ConnectionSink: Send + Sync {
    /// Reports a binding handle, or `None` when the component went away.
    fn connected(&self, name: &ComponentName, handle: Option<RemoteHandle>);
}

/// Identity of a calling process together with the channel whose death
/// signals that the process is gone.
#[derive(Debug, Clone)]
pub struct CallerChannel {
    pid: ProcessId,
    channel: RemoteHandle,
}

impl CallerChannel {
    /// Describes the caller `pid` reachable through `channel`.
    #[must_use]
    pub const fn new(pid: ProcessId, channel: RemoteHandle) -> Self {
        Self { pid, channel }
    }

    /// Returns the caller's process id.
    #[must_use]
    pub const fn pid(&self) -> ProcessId {
        self.pid
    }

    /// Returns the caller's callback channel.
    #[must_use]
    pub const fn channel(&self) -> &RemoteHandle {
        &self.channel
    }
}

/// Operations a registry exposes to its clients.
pub trait RegistryService: Send + Sync {
    /// Installs the target if needed, records a start request, and schedules
    /// the component's start entry point on the main execution context.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for unknown targets and the
    /// install errors when instantiation fails or times out.
    fn start_component(
        &self,
        intent: &Intent,
        caller: &CallerChannel,
    ) -> Result<ComponentName, RegistryError>;

    /// Clears the start request and recycles the component if idle.
    ///
    /// Returns `false` when the component has no record.
    fn stop_component(&self, intent: &Intent) -> bool;

    /// Installs the target if needed and records a connection for
    /// `connection`. The binding handle is delivered through `sink`.
    ///
    /// # Errors
    ///
    /// As for [`RegistryService::start_component`], plus
    /// [`RegistryError::RemoteUnavailable`] when the caller's channel is
    /// already dead.
    fn bind_component(
        &self,
        intent: &Intent,
        connection: ConnectionHandle,
        sink: Arc<dyn ConnectionSink>,
        flags: BindFlags,
        caller: &CallerChannel,
    ) -> Result<(), RegistryError>;

    /// Removes every connection registered under `connection`.
    ///
    /// Returns `false` and changes nothing when the handle is unknown.
    fn unbind_component(&self, connection: ConnectionHandle) -> bool;

    /// Returns a diagnostic snapshot of the installed components.
    fn dump(&self) -> RegistrySnapshot;
}

/// External collaborators of a registry.
#[derive(Clone)]
pub struct HostCollaborators {
    /// Maps component names to metadata.
    pub resolver: Arc<dyn ComponentResolver>,
    /// Creates component instances.
    pub factory: Arc<dyn ComponentFactory>,
    /// Keeps hosting processes alive.
    pub anchor: Arc<dyn ProcessAnchor>,
}

impl fmt::Debug for HostCollaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostCollaborators").finish_non_exhaustive()
    }
}

/// Binding registry of one host process.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use rebind_registry::{
///     ComponentCatalog, HostCollaborators, KindedFactory, RegistryService, SerialQueue,
///     ServiceRegistry, SlotAnchor,
/// };
///
/// let main = Arc::new(SerialQueue::spawn("main").expect("spawn main context"));
/// let registry = ServiceRegistry::new(
///     HostCollaborators {
///         resolver: Arc::new(ComponentCatalog::new()),
///         factory: Arc::new(KindedFactory::new()),
///         anchor: Arc::new(SlotAnchor::new()),
///     },
///     main,
///     Duration::from_secs(6),
/// );
/// assert!(registry.dump().components.is_empty());
/// ```
#[derive(Clone)]
pub struct ServiceRegistry {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<RegistryState>,
    host: HostCollaborators,
    main: Arc<SerialQueue>,
    install_timeout: Duration,
}

impl ServiceRegistry {
    /// Creates an empty registry installing components on `main`.
    #[must_use]
    pub fn new(host: HostCollaborators, main: Arc<SerialQueue>, install_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(RegistryState::default()),
                host,
                main,
                install_timeout,
            }),
        }
    }

    /// Returns the main execution context.
    #[must_use]
    pub fn main_context(&self) -> &Arc<SerialQueue> {
        &self.shared.main
    }

    /// Returns the install rendezvous timeout.
    #[must_use]
    pub fn install_timeout(&self) -> Duration {
        self.shared.install_timeout
    }

    #[cfg(test)]
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.shared.lock()
    }
}

impl RegistryService for ServiceRegistry {
    fn start_component(
        &self,
        intent: &Intent,
        caller: &CallerChannel,
    ) -> Result<ComponentName, RegistryError> {
        self.shared.start(intent, caller)
    }

    fn stop_component(&self, intent: &Intent) -> bool {
        self.shared.stop(intent)
    }

    fn bind_component(
        &self,
        intent: &Intent,
        connection: ConnectionHandle,
        sink: Arc<dyn ConnectionSink>,
        flags: BindFlags,
        caller: &CallerChannel,
    ) -> Result<(), RegistryError> {
        Shared::bind(&self.shared, intent, connection, sink, flags, caller)
    }

    fn unbind_component(&self, connection: ConnectionHandle) -> bool {
        self.shared.unbind(connection)
    }

    fn dump(&self) -> RegistrySnapshot {
        self.shared.lock().snapshot()
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("main", &self.shared.main)
            .field("install_timeout", &self.shared.install_timeout)
            .finish_non_exhaustive()
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    fn start(
        &self,
        intent: &Intent,
        caller: &CallerChannel,
    ) -> Result<ComponentName, RegistryError> {
        let name = intent.component().clone();
        let mut state = self.lock();
        self.ensure_installed(&mut state, &name)?;
        let Some(record) = state.components.get_mut(&name) else {
            return Err(not_found(&name));
        };
        record.start_requested = true;
        if let Some(instance) = record.instance() {
            let start_intent = intent.clone();
            let posted = self.main.post(move || instance.on_start(&start_intent));
            if let Err(error) = posted {
                warn!(
                    target: REGISTRY_TARGET,
                    component = %name,
                    %error,
                    "start entry point not scheduled"
                );
            }
        }
        debug!(
            target: REGISTRY_TARGET,
            component = %name,
            caller = %caller.pid(),
            "component started"
        );
        Ok(name)
    }

    fn stop(&self, intent: &Intent) -> bool {
        let name = intent.component();
        let mut state = self.lock();
        let Some(record) = state.components.get_mut(name) else {
            debug!(target: REGISTRY_TARGET, component = %name, "stop for unknown component");
            return false;
        };
        record.start_requested = false;
        state.recycle_if_idle(name, self.host.anchor.as_ref());
        true
    }

    fn bind(
        this: &Arc<Self>,
        intent: &Intent,
        connection: ConnectionHandle,
        sink: Arc<dyn ConnectionSink>,
        flags: BindFlags,
        caller: &CallerChannel,
    ) -> Result<(), RegistryError> {
        let name = intent.component().clone();
        let mut state = this.lock();
        let fresh = this.ensure_installed(&mut state, &name)?;
        if let Err(source) = Self::ensure_client(this, &mut state, caller) {
            warn!(
                target: REGISTRY_TARGET,
                component = %name,
                caller = %caller.pid(),
                error = %source,
                "caller channel unavailable"
            );
            if fresh {
                state.recycle_if_idle(&name, this.host.anchor.as_ref());
            }
            return Err(RegistryError::RemoteUnavailable { source });
        }
        let attached = state.attach(BindRequest {
            intent,
            handle: connection,
            sink,
            flags,
            pid: caller.pid(),
        });
        if attached {
            Ok(())
        } else {
            Err(not_found(&name))
        }
    }

    fn unbind(&self, connection: ConnectionHandle) -> bool {
        let removed = self
            .lock()
            .unbind(connection, self.host.anchor.as_ref());
        if !removed {
            debug!(target: REGISTRY_TARGET, %connection, "unbind for unknown connection");
        }
        removed
    }

    fn client_died(&self, pid: ProcessId) {
        let released = self.lock().drop_client(pid, self.host.anchor.as_ref());
        info!(
            target: REGISTRY_TARGET,
            %pid,
            connections = released,
            "client process died"
        );
    }

    /// Registers a death watch on the caller's channel the first time a
    /// process binds.
    fn ensure_client(
        this: &Arc<Self>,
        state: &mut RegistryState,
        caller: &CallerChannel,
    ) -> Result<(), TransportError> {
        let pid = caller.pid();
        if state.has_client(pid) {
            return Ok(());
        }
        let registry: Weak<Self> = Arc::downgrade(this);
        let token = caller.channel().watch_death(Box::new(move || {
            if let Some(shared) = registry.upgrade() {
                shared.client_died(pid);
            }
        }))?;
        state.add_client(
            pid,
            ClientProcessRecord::new(caller.channel().clone(), Some(token)),
        );
        Ok(())
    }

    /// Installs `name` unless it already has a record. Returns `true` when
    /// this call performed the install.
    ///
    /// A record created here is removed again when installation fails, so
    /// a later call may retry.
    fn ensure_installed(
        &self,
        state: &mut RegistryState,
        name: &ComponentName,
    ) -> Result<bool, RegistryError> {
        if state.components.contains_key(name) {
            return Ok(false);
        }
        let metadata = self
            .host
            .resolver
            .resolve(name)
            .ok_or_else(|| not_found(name))?;
        state
            .components
            .insert(name.clone(), ComponentRecord::installing(metadata.clone()));

        let instance = match self.instantiate(&metadata) {
            Ok(instance) => instance,
            Err(error) => {
                state.components.remove(name);
                warn!(target: REGISTRY_TARGET, component = %name, %error, "install failed");
                return Err(error);
            }
        };
        let anchor = match self.host.anchor.acquire(metadata.process()) {
            Ok(anchor) => Some(anchor),
            Err(error) => {
                warn!(
                    target: REGISTRY_TARGET,
                    component = %name,
                    %error,
                    "process anchor unavailable"
                );
                None
            }
        };
        if let Some(record) = state.components.get_mut(name) {
            record.state = ComponentState::Installed { instance, anchor };
        }
        info!(
            target: REGISTRY_TARGET,
            component = %name,
            plugin = metadata.plugin(),
            process = %metadata.process(),
            "component installed"
        );
        Ok(true)
    }

    /// Runs the factory on the main execution context.
    fn instantiate(
        &self,
        metadata: &ComponentMetadata,
    ) -> Result<Arc<dyn Component>, RegistryError> {
        let component = metadata.name().to_string();
        let factory = Arc::clone(&self.host.factory);
        let job_metadata = metadata.clone();
        let late_component = component.clone();
        let outcome = self.main.run_sync_or_dispose(
            move || factory.instantiate(&job_metadata),
            move |late: Result<Arc<dyn Component>, InstallFailure>| {
                if let Ok(instance) = late {
                    warn!(
                        target: REGISTRY_TARGET,
                        component = %late_component,
                        "destroying instance created after install timeout"
                    );
                    instance.on_destroy();
                }
            },
            self.install_timeout,
        );
        match outcome {
            Ok(Ok(instance)) => Ok(instance),
            Ok(Err(source)) => Err(RegistryError::InstallFailure { component, source }),
            Err(RendezvousError::Timeout { timeout_ms, .. }) => {
                Err(RegistryError::InstallTimeout {
                    component,
                    timeout_ms,
                })
            }
            Err(other) => Err(RegistryError::InstallFailure {
                component,
                source: InstallFailure::ContextUnavailable {
                    message: other.to_string(),
                },
            }),
        }
    }
}

fn not_found(name: &ComponentName) -> RegistryError {
    RegistryError::NotFound {
        component: name.to_string(),
    }
}
