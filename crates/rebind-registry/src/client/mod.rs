//! Caller side of the binding protocol.
//!
//! A [`ServiceClient`] is the facade one client process uses to start,
//! stop, bind, and unbind components hosted by the registries of other
//! processes. It finds the hosting slot through a [`ComponentResolver`],
//! reaches the slot's registry through a [`RemoteRegistryLocator`], and
//! routes connection events back to listeners through the
//! [`ClientDispatcher`] the [`DispatcherDirectory`] keeps for each
//! (owner, listener) pair.
//!
//! Every failure is logged and reported as a negative result; no transport
//! or registry error reaches the caller.

mod directory;
mod dispatcher;
mod locator;

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::component::{BindFlags, ComponentName, Intent};
use crate::executor::OwnerContext;
use crate::host::ComponentResolver;
use crate::process::ProcessSlot;
use crate::registry::{CallerChannel, RegistrySnapshot};
use crate::transport::{RecoveringHandle, RemoteHandle};

pub use self::directory::DispatcherDirectory;
pub use self::dispatcher::ClientDispatcher;
pub use self::locator::{RegistryConnector, RegistryHandle, RemoteRegistryLocator};

pub(crate) const CLIENT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::client");

/// Receives connection callbacks on its owner's queue.
pub trait ConnectionListener: Send + Sync {
    /// Called when `name` delivers a binding handle.
    fn on_connected(&self, name: &ComponentName, handle: RemoteHandle);

    /// Called when a previously connected `name` went away.
    fn on_disconnected(&self, name: &ComponentName);
}

/// Facade of one client process.
pub struct ServiceClient {
    caller: CallerChannel,
    resolver: Arc<dyn ComponentResolver>,
    locator: Arc<RemoteRegistryLocator>,
    directory: DispatcherDirectory,
}

impl ServiceClient {
    /// Creates a client identified to registries by `caller`.
    #[must_use]
    pub fn new(
        caller: CallerChannel,
        resolver: Arc<dyn ComponentResolver>,
        connector: Arc<dyn RegistryConnector>,
    ) -> Self {
        Self {
            directory: DispatcherDirectory::new(caller.pid()),
            caller,
            resolver,
            locator: Arc::new(RemoteRegistryLocator::new(connector)),
        }
    }

    /// Returns the dispatcher directory of this process.
    #[must_use]
    pub const fn directory(&self) -> &DispatcherDirectory {
        &self.directory
    }

    /// Returns the registry locator of this process.
    #[must_use]
    pub fn locator(&self) -> &RemoteRegistryLocator {
        &self.locator
    }

    /// Starts the component `intent` targets.
    ///
    /// Returns the resolved name, or `None` when the component is unknown,
    /// its registry is unreachable, or installation failed.
    #[must_use]
    pub fn start(&self, intent: &Intent) -> Option<ComponentName> {
        let (_, registry) = self.registry_for(intent.component())?;
        match registry.service().start_component(intent, &self.caller) {
            Ok(name) => Some(name),
            Err(error) => {
                warn!(
                    target: CLIENT_TARGET,
                    component = %intent.component(),
                    %error,
                    "start failed"
                );
                None
            }
        }
    }

    /// Clears the start request of the component `intent` targets.
    ///
    /// Returns `true` when the registry had a record of it.
    #[must_use]
    pub fn stop(&self, intent: &Intent) -> bool {
        self.registry_for(intent.component())
            .is_some_and(|(_, registry)| registry.service().stop_component(intent))
    }

    /// Lets a running component request its own stop.
    #[must_use]
    pub fn stop_self(&self, name: &ComponentName) -> bool {
        self.stop(&Intent::new(name.clone()))
    }

    /// Binds `listener` to the component `intent` targets. Callbacks are
    /// delivered on `owner`'s queue.
    ///
    /// Returns `false` when the bind was rejected; the listener must still be
    /// unbound if an earlier bind through it succeeded.
    #[must_use]
    pub fn bind(
        &self,
        owner: &OwnerContext,
        intent: &Intent,
        listener: &Arc<dyn ConnectionListener>,
        flags: BindFlags,
    ) -> bool {
        let Some((slot, registry)) = self.registry_for(intent.component()) else {
            return false;
        };
        let dispatcher = match self.directory.get(owner, listener, flags, slot) {
            Ok(dispatcher) => dispatcher,
            Err(error) => {
                warn!(target: CLIENT_TARGET, owner = owner.id(), %error, "bind rejected");
                return false;
            }
        };
        let outcome = registry.service().bind_component(
            intent,
            dispatcher.connection(),
            dispatcher.sink(),
            flags,
            &self.caller,
        );
        match outcome {
            Ok(()) => {
                debug!(
                    target: CLIENT_TARGET,
                    component = %intent.component(),
                    connection = %dispatcher.connection(),
                    %slot,
                    "bound"
                );
                true
            }
            Err(error) => {
                warn!(
                    target: CLIENT_TARGET,
                    component = %intent.component(),
                    %error,
                    "bind failed"
                );
                false
            }
        }
    }

    /// Unbinds `listener` from everything it was bound to through `owner`.
    ///
    /// Returns `false` when the listener was not bound, or when no registry
    /// acknowledged the unbind.
    #[must_use]
    #[track_caller]
    pub fn unbind(&self, owner: &OwnerContext, listener: &Arc<dyn ConnectionListener>) -> bool {
        let Ok(dispatcher) = self.directory.forget(owner, listener) else {
            return false;
        };
        self.release(&dispatcher)
    }

    /// Unbinds every listener of `owner` and drops the records kept for
    /// duplicate-unbind reports. Call when the owner goes away.
    ///
    /// Returns the number of listeners that were still bound.
    #[must_use]
    #[track_caller]
    pub fn release_owner(&self, owner: &OwnerContext) -> usize {
        let released = self.directory.forget_owner(owner.id());
        for dispatcher in &released {
            self.release(dispatcher);
        }
        released.len()
    }

    /// Returns the snapshot of the registry serving `slot`.
    #[must_use]
    pub fn dump(&self, slot: ProcessSlot) -> Option<RegistrySnapshot> {
        self.locator
            .resolve(slot)
            .map(|registry| registry.service().dump())
    }

    /// Returns a handle to the registry serving `slot` that reconnects by
    /// itself after the registry dies.
    #[must_use]
    pub fn recovering_registry(&self, slot: ProcessSlot) -> RemoteHandle {
        let locator = Arc::clone(&self.locator);
        RemoteHandle::from_object(RecoveringHandle::new(
            format!("registry:{slot}"),
            move || locator.resolve(slot).map(|registry| registry.remote().clone()),
        ))
    }

    fn release(&self, dispatcher: &ClientDispatcher) -> bool {
        let connection = dispatcher.connection();
        let mut acknowledged = false;
        for slot in dispatcher.slots() {
            let Some(registry) = self.locator.resolve(slot) else {
                continue;
            };
            acknowledged |= registry.service().unbind_component(connection);
        }
        debug!(target: CLIENT_TARGET, %connection, acknowledged, "unbound");
        acknowledged
    }

    fn registry_for(&self, name: &ComponentName) -> Option<(ProcessSlot, RegistryHandle)> {
        let Some(metadata) = self.resolver.resolve(name) else {
            warn!(target: CLIENT_TARGET, component = %name, "unknown component");
            return None;
        };
        let slot = metadata.process();
        self.locator.resolve(slot).map(|registry| (slot, registry))
    }
}

impl fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceClient")
            .field("pid", &self.caller.pid())
            .field("locator", &self.locator)
            .field("directory", &self.directory)
            .finish_non_exhaustive()
    }
}
