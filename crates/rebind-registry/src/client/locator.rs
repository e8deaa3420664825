//! Cached handles to the registries of other processes.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::process::ProcessSlot;
use crate::registry::RegistryService;
use crate::transport::RemoteHandle;

use super::CLIENT_TARGET;

/// A reachable registry: the remote object whose death ends the connection,
/// and the operations served through it.
#[derive(Clone)]
pub struct RegistryHandle {
    remote: RemoteHandle,
    service: Arc<dyn RegistryService>,
}

impl RegistryHandle {
    /// Pairs a registry's remote object with its operations.
    #[must_use]
    pub fn new(remote: RemoteHandle, service: Arc<dyn RegistryService>) -> Self {
        Self { remote, service }
    }

    /// Returns the remote object backing the registry.
    #[must_use]
    pub const fn remote(&self) -> &RemoteHandle {
        &self.remote
    }

    /// Returns the registry operations.
    #[must_use]
    pub fn service(&self) -> &dyn RegistryService {
        self.service.as_ref()
    }

    /// Returns `true` while the remote object is alive.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.remote.is_alive()
    }
}

impl fmt::Debug for RegistryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryHandle")
            .field("remote", &self.remote)
            .finish_non_exhaustive()
    }
}

/// Spawns or attaches to the process hosting a slot's registry.
pub trait RegistryConnector: Send + Sync {
    /// Returns a handle to the registry serving `slot`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the process cannot be reached.
    fn connect(&self, slot: ProcessSlot) -> Result<RegistryHandle, TransportError>;
}

type Cache = Mutex<HashMap<ProcessSlot, RegistryHandle>>;

/// Resolves and caches one registry handle per process slot.
///
/// A cached handle is evicted when its remote object dies, so the next
/// resolution reconnects.
pub struct RemoteRegistryLocator {
    connector: Arc<dyn RegistryConnector>,
    cache: Arc<Cache>,
}

impl RemoteRegistryLocator {
    /// Creates a locator with an empty cache.
    #[must_use]
    pub fn new(connector: Arc<dyn RegistryConnector>) -> Self {
        Self {
            connector,
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns the registry serving `slot`, connecting on first use.
    ///
    /// Failures are logged and reported as `None`.
    #[must_use]
    pub fn resolve(&self, slot: ProcessSlot) -> Option<RegistryHandle> {
        {
            let mut cache = lock(&self.cache);
            match cache.get(&slot) {
                Some(cached) if cached.is_alive() => return Some(cached.clone()),
                Some(_) => {
                    cache.remove(&slot);
                    debug!(target: CLIENT_TARGET, %slot, "evicted dead registry handle");
                }
                None => {}
            }
        }

        let handle = match self.connector.connect(slot) {
            Ok(handle) => handle,
            Err(error) => {
                warn!(target: CLIENT_TARGET, %slot, %error, "registry unreachable");
                return None;
            }
        };
        let cache: Weak<Cache> = Arc::downgrade(&self.cache);
        let watched = handle.remote.clone();
        let watch = handle.remote.watch_death(Box::new(move || {
            evict(&cache, slot, &watched);
        }));
        let token = match watch {
            Ok(token) => token,
            Err(error) => {
                warn!(target: CLIENT_TARGET, %slot, %error, "registry died while connecting");
                return None;
            }
        };

        let mut cache = lock(&self.cache);
        if let Some(existing) = cache.get(&slot).filter(|existing| existing.is_alive()) {
            let existing = existing.clone();
            drop(cache);
            handle.remote.unwatch(token);
            return Some(existing);
        }
        cache.insert(slot, handle.clone());
        info!(target: CLIENT_TARGET, %slot, "registry connected");
        Some(handle)
    }

    /// Returns `true` when a handle for `slot` is cached.
    #[must_use]
    pub fn is_cached(&self, slot: ProcessSlot) -> bool {
        lock(&self.cache).contains_key(&slot)
    }
}

impl fmt::Debug for RemoteRegistryLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteRegistryLocator")
            .field("cached", &lock(&self.cache).len())
            .finish_non_exhaustive()
    }
}

fn evict(cache: &Weak<Cache>, slot: ProcessSlot, dead: &RemoteHandle) {
    let Some(cache) = cache.upgrade() else {
        return;
    };
    let mut entries = lock(&cache);
    let same = entries
        .get(&slot)
        .is_some_and(|cached| cached.remote.same_object(dead));
    if same {
        entries.remove(&slot);
        info!(target: CLIENT_TARGET, %slot, "registry died");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poison| poison.into_inner())
}
