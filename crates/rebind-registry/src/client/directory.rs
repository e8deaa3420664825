//! One dispatcher per (owner, listener) pair.

use std::collections::HashMap;
use std::panic::Location;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::component::BindFlags;
use crate::error::{DispatcherError, UnbindError};
use crate::executor::OwnerContext;
use crate::process::{ConnectionHandle, ProcessId, ProcessSlot};

use super::dispatcher::ClientDispatcher;
use super::{CLIENT_TARGET, ConnectionListener};

/// Owner id plus the address of the listener allocation.
type DispatcherKey = (String, usize);

#[derive(Default)]
struct Entries {
    active: HashMap<DispatcherKey, Arc<ClientDispatcher>>,
    unbound: HashMap<DispatcherKey, Arc<ClientDispatcher>>,
}

/// Directory of the dispatchers of one client process.
///
/// Listeners are identified by allocation, so the same `Arc` must be passed
/// to bind and unbind.
#[derive(Debug)]
pub struct DispatcherDirectory {
    pid: ProcessId,
    next_local: AtomicU64,
    entries: Mutex<Entries>,
}

impl std::fmt::Debug for Entries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entries")
            .field("active", &self.active.len())
            .field("unbound", &self.unbound.len())
            .finish()
    }
}

impl DispatcherDirectory {
    /// Creates an empty directory for client process `pid`.
    #[must_use]
    pub fn new(pid: ProcessId) -> Self {
        Self {
            pid,
            next_local: AtomicU64::new(1),
            entries: Mutex::new(Entries::default()),
        }
    }

    /// Returns the dispatcher for `(owner, listener)`, creating it on first
    /// use, and records that it is bound in `slot`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatcherError::ContextMismatch`] when the pair already
    /// exists on a different execution context.
    pub fn get(
        &self,
        owner: &OwnerContext,
        listener: &Arc<dyn ConnectionListener>,
        flags: BindFlags,
        slot: ProcessSlot,
    ) -> Result<Arc<ClientDispatcher>, DispatcherError> {
        let key = dispatcher_key(owner, listener);
        let mut entries = self.lock();
        if let Some(existing) = entries.active.get(&key) {
            existing.validate(owner)?;
            existing.record_slot(slot);
            return Ok(Arc::clone(existing));
        }
        let local = self.next_local.fetch_add(1, Ordering::Relaxed);
        let dispatcher = ClientDispatcher::new(
            ConnectionHandle::new(self.pid, local),
            Arc::clone(listener),
            owner.clone(),
            flags,
        );
        dispatcher.record_slot(slot);
        entries.unbound.remove(&key);
        entries.active.insert(key, Arc::clone(&dispatcher));
        debug!(
            target: CLIENT_TARGET,
            owner = owner.id(),
            connection = %dispatcher.connection(),
            flags = %flags,
            "dispatcher created"
        );
        Ok(dispatcher)
    }

    /// Removes the dispatcher for `(owner, listener)` and forgets it.
    ///
    /// # Errors
    ///
    /// Returns [`UnbindError::AlreadyUnbound`] with the first unbind's
    /// location when the pair was unbound before with
    /// [`BindFlags::DEBUG_UNBIND`], and [`UnbindError::NotRegistered`]
    /// otherwise. Both are logged.
    #[track_caller]
    pub fn forget(
        &self,
        owner: &OwnerContext,
        listener: &Arc<dyn ConnectionListener>,
    ) -> Result<Arc<ClientDispatcher>, UnbindError> {
        let origin = Location::caller();
        let key = dispatcher_key(owner, listener);
        let mut entries = self.lock();
        if let Some(dispatcher) = entries.active.remove(&key) {
            dispatcher.forget(origin);
            if dispatcher.flags().contains(BindFlags::DEBUG_UNBIND) {
                entries.unbound.insert(key, Arc::clone(&dispatcher));
            }
            return Ok(dispatcher);
        }
        let error = match entries
            .unbound
            .get(&key)
            .and_then(|dispatcher| dispatcher.unbind_origin())
        {
            Some(first) => UnbindError::AlreadyUnbound { origin: first },
            None => UnbindError::NotRegistered {
                owner: owner.id().to_owned(),
            },
        };
        warn!(
            target: CLIENT_TARGET,
            owner = owner.id(),
            at = %origin,
            %error,
            "unbind of unknown listener"
        );
        Err(error)
    }

    /// Forgets every dispatcher of `owner_id`, including the unbind records
    /// kept for duplicate-unbind reports. Returns the dispatchers that were
    /// still bound so their registries can be told.
    #[must_use]
    #[track_caller]
    pub fn forget_owner(&self, owner_id: &str) -> Vec<Arc<ClientDispatcher>> {
        let origin = Location::caller();
        let mut entries = self.lock();
        entries.unbound.retain(|(owner, _), _| owner != owner_id);
        let keys: Vec<DispatcherKey> = entries
            .active
            .keys()
            .filter(|(owner, _)| owner == owner_id)
            .cloned()
            .collect();
        let released: Vec<Arc<ClientDispatcher>> = keys
            .iter()
            .filter_map(|key| entries.active.remove(key))
            .collect();
        drop(entries);
        for dispatcher in &released {
            dispatcher.forget(origin);
        }
        debug!(
            target: CLIENT_TARGET,
            owner = owner_id,
            released = released.len(),
            "owner released"
        );
        released
    }

    /// Returns the number of dispatchers still bound.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().active.len()
    }

    /// Returns `true` when no dispatcher is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().active.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn retained_unbound(&self) -> usize {
        self.lock().unbound.len()
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

fn dispatcher_key(owner: &OwnerContext, listener: &Arc<dyn ConnectionListener>) -> DispatcherKey {
    (owner.id().to_owned(), Arc::as_ptr(listener).cast::<()>().addr())
}
