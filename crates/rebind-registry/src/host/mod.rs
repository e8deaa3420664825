//! Collaborators the registry consumes but does not implement.
//!
//! The registry knows nothing about how component code is found, loaded, or
//! kept resident. It asks a [`ComponentResolver`] what a name refers to, a
//! [`ComponentFactory`] for a running [`Component`], and a [`ProcessAnchor`]
//! to keep the hosting process alive while anything is installed there.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use crate::component::{ComponentKind, ComponentMetadata, ComponentName, Intent};
use crate::error::{AnchorError, InstallFailure};
use crate::process::{AnchorId, ProcessSlot};
use crate::transport::RemoteHandle;

const ANCHOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::anchor");

/// A running component instance.
///
/// Entry points are invoked by the registry: `on_start` on the registry's
/// main execution context, the binding and destroy entry points on the
/// thread serving the triggering call.
pub trait Component: Send + Sync {
    /// Called after each start request.
    fn on_start(&self, intent: &Intent);

    /// Called once per binding episode; the returned handle is shared by
    /// every connection of the episode.
    fn create_binding(&self, intent: &Intent) -> Option<RemoteHandle>;

    /// Called once when the last client of a binding episode leaves.
    fn destroy_binding(&self, intent: &Intent);

    /// Called once when the component is recycled.
    fn on_destroy(&self);
}

/// Looks up which package and class implement a component name.
pub trait ComponentResolver: Send + Sync {
    /// Returns the metadata for `name`, or `None` when it is unknown.
    fn resolve(&self, name: &ComponentName) -> Option<ComponentMetadata>;
}

/// Creates running component instances.
pub trait ComponentFactory: Send + Sync {
    /// Instantiates the component described by `metadata`.
    ///
    /// # Errors
    ///
    /// Returns [`InstallFailure`] when the instance cannot be created.
    fn instantiate(&self, metadata: &ComponentMetadata)
    -> Result<Arc<dyn Component>, InstallFailure>;
}

/// Keeps hosting processes alive while components are installed in them.
pub trait ProcessAnchor: Send + Sync {
    /// Requests that `slot` be kept alive.
    ///
    /// # Errors
    ///
    /// Returns [`AnchorError`] when the slot cannot be anchored.
    fn acquire(&self, slot: ProcessSlot) -> Result<AnchorId, AnchorError>;

    /// Releases an anchor previously returned by [`ProcessAnchor::acquire`].
    fn release(&self, slot: ProcessSlot, anchor: &AnchorId);
}

impl<T: ComponentResolver + ?Sized> ComponentResolver for Arc<T> {
    fn resolve(&self, name: &ComponentName) -> Option<ComponentMetadata> {
        (**self).resolve(name)
    }
}

/// Factory dispatching on [`ComponentKind`].
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use rebind_registry::{
///     ComponentFactory, ComponentKind, ComponentMetadata, ComponentName, InstallFailure,
///     KindedFactory, ProcessSlot,
/// };
///
/// let factory = KindedFactory::new();
/// let metadata = ComponentMetadata::new(
///     ComponentName::new("demo", "Sync"),
///     "demo",
///     ProcessSlot::Persistent,
///     ComponentKind::Plugin,
/// );
/// assert!(matches!(
///     factory.instantiate(&metadata),
///     Err(InstallFailure::UnsupportedKind { kind: ComponentKind::Plugin })
/// ));
/// ```
#[derive(Default)]
pub struct KindedFactory {
    factories: HashMap<ComponentKind, Arc<dyn ComponentFactory>>,
}

impl KindedFactory {
    /// Creates a factory with no registered kinds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the factory for `kind`, returning the one it replaces.
    pub fn register(
        &mut self,
        kind: ComponentKind,
        factory: Arc<dyn ComponentFactory>,
    ) -> Option<Arc<dyn ComponentFactory>> {
        self.factories.insert(kind, factory)
    }

    /// Returns `true` when a factory is registered for `kind`.
    #[must_use]
    pub fn supports(&self, kind: ComponentKind) -> bool {
        self.factories.contains_key(&kind)
    }
}

impl ComponentFactory for KindedFactory {
    fn instantiate(
        &self,
        metadata: &ComponentMetadata,
    ) -> Result<Arc<dyn Component>, InstallFailure> {
        let kind = metadata.kind();
        let factory = self
            .factories
            .get(&kind)
            .ok_or(InstallFailure::UnsupportedKind { kind })?;
        factory.instantiate(metadata)
    }
}

/// Anchor that names each slot after its well-known anchor id and counts
/// outstanding acquisitions.
#[derive(Debug, Default)]
pub struct SlotAnchor {
    held: Mutex<HashMap<ProcessSlot, usize>>,
}

impl SlotAnchor {
    /// Creates an anchor with nothing held.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of outstanding acquisitions for `slot`.
    #[must_use]
    pub fn held(&self, slot: ProcessSlot) -> usize {
        self.lock().get(&slot).copied().unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ProcessSlot, usize>> {
        self.held
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

impl ProcessAnchor for SlotAnchor {
    fn acquire(&self, slot: ProcessSlot) -> Result<AnchorId, AnchorError> {
        let anchor = slot.anchor_id();
        let mut held = self.lock();
        let count = held.entry(slot).or_default();
        *count = count.saturating_add(1);
        if *count == 1 {
            info!(target: ANCHOR_TARGET, %slot, anchor = %anchor, "process anchored");
        }
        Ok(anchor)
    }

    fn release(&self, slot: ProcessSlot, anchor: &AnchorId) {
        let mut held = self.lock();
        let Some(count) = held.get_mut(&slot) else {
            debug!(target: ANCHOR_TARGET, %slot, anchor = %anchor, "release without anchor");
            return;
        };
        *count = count.saturating_sub(1);
        if *count == 0 {
            held.remove(&slot);
            info!(target: ANCHOR_TARGET, %slot, anchor = %anchor, "process anchor released");
        }
    }
}
