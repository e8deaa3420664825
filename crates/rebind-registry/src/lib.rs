//! Binding registry for components hosted in other processes.
//!
//! The `rebind-registry` crate lets code loaded into a host process be
//! started, stopped, and bound to by other processes. Each host process runs
//! one [`ServiceRegistry`], which tracks which components are installed,
//! which client processes are bound to them, and through which connections.
//! Client processes talk to those registries through a [`ServiceClient`],
//! which delivers connection events to each listener in order on the
//! listener owner's queue.
//!
//! # Architecture
//!
//! The registry never calls a transport directly. Remote processes are
//! represented by [`RemoteHandle`]s, and component code is reached through
//! the [`ComponentResolver`], [`ComponentFactory`], and [`ProcessAnchor`]
//! collaborators. The [`LoopbackConnector`] serves registries living in the
//! current process, which is how the host daemon and the tests wire
//! everything together.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use rebind_registry::{
//!     BindFlags, CallerChannel, ComponentCatalog, ComponentKind, ComponentMetadata,
//!     ComponentName, ConnectionListener, HostCollaborators, Intent, KindedFactory, LocalObject,
//!     LoopbackConnector, OwnerContext, ProcessId, ProcessSlot, RemoteHandle, SerialQueue,
//!     ServiceClient, ServiceRegistry, SlotAnchor,
//! };
//!
//! struct Quiet;
//!
//! impl ConnectionListener for Quiet {
//!     fn on_connected(&self, _name: &ComponentName, _handle: RemoteHandle) {}
//!     fn on_disconnected(&self, _name: &ComponentName) {}
//! }
//!
//! let name = ComponentName::new("demo.plugin", "SyncService");
//! let catalog = Arc::new(
//!     ComponentCatalog::from_entries([ComponentMetadata::new(
//!         name.clone(),
//!         "demo",
//!         ProcessSlot::Persistent,
//!         ComponentKind::Plugin,
//!     )])
//!     .expect("valid catalogue"),
//! );
//! let registry = ServiceRegistry::new(
//!     HostCollaborators {
//!         resolver: Arc::clone(&catalog) as _,
//!         factory: Arc::new(KindedFactory::new()),
//!         anchor: Arc::new(SlotAnchor::new()),
//!     },
//!     Arc::new(SerialQueue::spawn("main").expect("spawn main context")),
//!     Duration::from_secs(6),
//! );
//! let connector = Arc::new(LoopbackConnector::new());
//! connector.register(ProcessSlot::Persistent, Arc::new(registry));
//!
//! let caller = CallerChannel::new(
//!     ProcessId::current(),
//!     RemoteHandle::from_object(LocalObject::new("client")),
//! );
//! let client = ServiceClient::new(caller, catalog, connector);
//! let owner = OwnerContext::new(
//!     "owner",
//!     Arc::new(SerialQueue::spawn("owner").expect("spawn owner context")),
//! );
//! let listener: Arc<dyn ConnectionListener> = Arc::new(Quiet);
//!
//! // No factory is registered for plugin components, so installation fails
//! // and the bind is refused without disturbing the registry.
//! assert!(!client.bind(&owner, &Intent::new(name), &listener, BindFlags::AUTO_CREATE));
//! let snapshot = client.dump(ProcessSlot::Persistent).expect("registry reachable");
//! assert!(snapshot.components.is_empty());
//! ```

pub mod catalog;
pub mod client;
pub mod component;
pub mod error;
pub mod executor;
pub mod host;
pub mod loopback;
pub mod process;
pub mod registry;
pub mod transport;

#[cfg(test)]
mod test_support;
#[cfg(test)]
mod tests;

pub use self::catalog::ComponentCatalog;
pub use self::client::{
    ClientDispatcher, ConnectionListener, DispatcherDirectory, RegistryConnector, RegistryHandle,
    RemoteRegistryLocator, ServiceClient,
};
pub use self::component::{
    BindFlags, ComponentKind, ComponentMetadata, ComponentName, Intent, IntentKey,
};
pub use self::error::{
    AnchorError, CatalogError, DescriptorError, DispatcherError, InstallFailure, RegistryError,
    RendezvousError, TransportError, UnbindError,
};
pub use self::executor::{OwnerContext, SerialQueue};
pub use self::host::{
    Component, ComponentFactory, ComponentResolver, KindedFactory, ProcessAnchor, SlotAnchor,
};
pub use self::loopback::LoopbackConnector;
pub use self::process::{AnchorId, ConnectionHandle, ProcessId, ProcessSlot};
pub use self::registry::{
    CallerChannel, ComponentSnapshot, ConnectionSink, HostCollaborators, RegistryService,
    RegistrySnapshot, ServiceRegistry,
};
pub use self::transport::{
    DeathCallback, HandleSource, LocalObject, RecoveringHandle, RemoteHandle, RemoteObject,
    RequestHandler, WatchToken,
};
