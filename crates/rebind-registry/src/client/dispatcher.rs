//! Ordered delivery of connection events to one listener.
//!
//! Registry events and binding deaths arrive on arbitrary threads. Both are
//! posted onto the owner's queue, and the table of active connections is
//! only changed there, so callbacks for one listener never overlap and
//! always match the order in which events were queued.

use std::collections::HashMap;
use std::fmt;
use std::panic::Location;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::{debug, info, warn};

use crate::component::{BindFlags, ComponentName};
use crate::error::DispatcherError;
use crate::executor::OwnerContext;
use crate::process::{ConnectionHandle, ProcessSlot};
use crate::registry::ConnectionSink;
use crate::transport::{RemoteHandle, WatchToken};

use super::{CLIENT_TARGET, ConnectionListener};

struct ActiveConnection {
    handle: RemoteHandle,
    watch: WatchToken,
    serial: u64,
}

#[derive(Default)]
struct DispatchState {
    forgotten: bool,
    unbind_origin: Option<&'static Location<'static>>,
    active: HashMap<ComponentName, ActiveConnection>,
    next_serial: u64,
}

/// Dispatcher of one (owner, listener) pair.
pub struct ClientDispatcher {
    connection: ConnectionHandle,
    listener: Arc<dyn ConnectionListener>,
    owner: OwnerContext,
    flags: BindFlags,
    slots: Mutex<Vec<ProcessSlot>>,
    state: Mutex<DispatchState>,
    this: Weak<Self>,
}

impl ClientDispatcher {
    pub(crate) fn new(
        connection: ConnectionHandle,
        listener: Arc<dyn ConnectionListener>,
        owner: OwnerContext,
        flags: BindFlags,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            connection,
            listener,
            owner,
            flags,
            slots: Mutex::new(Vec::new()),
            state: Mutex::new(DispatchState::default()),
            this: this.clone(),
        })
    }

    /// Returns the connection handle registries know this listener by.
    #[must_use]
    pub const fn connection(&self) -> ConnectionHandle {
        self.connection
    }

    /// Returns the flags the dispatcher was created with.
    #[must_use]
    pub const fn flags(&self) -> BindFlags {
        self.flags
    }

    /// Returns the owner delivering this listener's callbacks.
    #[must_use]
    pub const fn owner(&self) -> &OwnerContext {
        &self.owner
    }

    /// Returns every process slot this listener was bound in.
    #[must_use]
    pub fn slots(&self) -> Vec<ProcessSlot> {
        lock(&self.slots).clone()
    }

    /// Returns `true` once the listener has been unbound.
    #[must_use]
    pub fn is_forgotten(&self) -> bool {
        self.lock().forgotten
    }

    /// Returns where the listener was unbound, when that was recorded.
    #[must_use]
    pub fn unbind_origin(&self) -> Option<&'static Location<'static>> {
        self.lock().unbind_origin
    }

    /// Returns the number of components currently connected.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.lock().active.len()
    }

    /// Returns the sink handed to registries for this listener.
    #[must_use]
    pub fn sink(&self) -> Arc<dyn ConnectionSink> {
        Arc::new(DispatcherSink {
            dispatcher: self.this.clone(),
        })
    }

    /// Checks that `owner` delivers on the queue this dispatcher uses.
    pub(crate) fn validate(&self, owner: &OwnerContext) -> Result<(), DispatcherError> {
        if self.owner.shares_queue(owner) {
            return Ok(());
        }
        Err(DispatcherError::ContextMismatch {
            owner: owner.id().to_owned(),
            listener: self.connection.to_string(),
        })
    }

    pub(crate) fn record_slot(&self, slot: ProcessSlot) {
        let mut slots = lock(&self.slots);
        if !slots.contains(&slot) {
            slots.push(slot);
        }
    }

    /// Drops every active connection and ignores all later events.
    pub(crate) fn forget(&self, origin: &'static Location<'static>) {
        let drained: Vec<ActiveConnection> = {
            let mut state = self.lock();
            state.forgotten = true;
            if self.flags.contains(BindFlags::DEBUG_UNBIND) {
                state.unbind_origin = Some(origin);
            }
            state.active.drain().map(|(_, active)| active).collect()
        };
        for active in drained {
            active.handle.unwatch(active.watch);
        }
        debug!(
            target: CLIENT_TARGET,
            connection = %self.connection,
            owner = self.owner.id(),
            "dispatcher forgotten"
        );
    }

    fn schedule_connected(&self, name: ComponentName, handle: Option<RemoteHandle>) {
        let Some(this) = self.this.upgrade() else {
            return;
        };
        let posted = self
            .owner
            .queue()
            .post(move || this.deliver_connected(&name, handle));
        if let Err(error) = posted {
            warn!(
                target: CLIENT_TARGET,
                connection = %self.connection,
                %error,
                "connection event dropped"
            );
        }
    }

    /// Applies a registry event and notifies the listener. Runs on the
    /// owner's queue.
    fn deliver_connected(&self, name: &ComponentName, handle: Option<RemoteHandle>) {
        let (previous, current) = {
            let mut state = self.lock();
            if state.forgotten {
                debug!(
                    target: CLIENT_TARGET,
                    connection = %self.connection,
                    component = %name,
                    "event after unbind ignored"
                );
                return;
            }
            let unchanged = match (&handle, state.active.get(name)) {
                (Some(incoming), Some(existing)) => existing.handle.same_object(incoming),
                _ => false,
            };
            if unchanged {
                return;
            }
            match handle {
                Some(incoming) => match self.watch(&mut state, name, &incoming) {
                    Some(active) => (state.active.insert(name.clone(), active), Some(incoming)),
                    None => (state.active.remove(name), None),
                },
                None => (state.active.remove(name), None),
            }
        };
        if let Some(previous) = previous {
            previous.handle.unwatch(previous.watch);
            self.listener.on_disconnected(name);
        }
        if let Some(current) = current {
            self.listener.on_connected(name, current);
        }
    }

    fn watch(
        &self,
        state: &mut DispatchState,
        name: &ComponentName,
        handle: &RemoteHandle,
    ) -> Option<ActiveConnection> {
        state.next_serial = state.next_serial.saturating_add(1);
        let serial = state.next_serial;
        let dispatcher = self.this.clone();
        let watched = name.clone();
        let registered = handle.watch_death(Box::new(move || {
            if let Some(dispatcher) = dispatcher.upgrade() {
                dispatcher.remote_died(&watched, serial);
            }
        }));
        match registered {
            Ok(watch) => Some(ActiveConnection {
                handle: handle.clone(),
                watch,
                serial,
            }),
            Err(error) => {
                warn!(
                    target: CLIENT_TARGET,
                    connection = %self.connection,
                    component = %name,
                    %error,
                    "binding died before it was delivered"
                );
                None
            }
        }
    }

    /// Queues the disconnect for a dead binding. The table is only touched
    /// on the owner's queue, behind any connect event already waiting there.
    fn remote_died(&self, name: &ComponentName, serial: u64) {
        let Some(this) = self.this.upgrade() else {
            return;
        };
        let component = name.clone();
        let posted = self
            .owner
            .queue()
            .post(move || this.deliver_death(&component, serial));
        if let Err(error) = posted {
            warn!(
                target: CLIENT_TARGET,
                connection = %self.connection,
                component = %name,
                %error,
                "disconnect notification dropped"
            );
        }
    }

    /// Removes the connection a death watch belonged to, unless it has been
    /// replaced or forgotten since. Runs on the owner's queue.
    fn deliver_death(&self, name: &ComponentName, serial: u64) {
        let removed = {
            let mut state = self.lock();
            let current = !state.forgotten
                && state
                    .active
                    .get(name)
                    .is_some_and(|active| active.serial == serial);
            if current { state.active.remove(name) } else { None }
        };
        if removed.is_none() {
            debug!(
                target: CLIENT_TARGET,
                connection = %self.connection,
                component = %name,
                "stale death notification ignored"
            );
            return;
        }
        info!(
            target: CLIENT_TARGET,
            connection = %self.connection,
            component = %name,
            "bound component died"
        );
        self.listener.on_disconnected(name);
    }

    fn lock(&self) -> MutexGuard<'_, DispatchState> {
        lock(&self.state)
    }
}

impl fmt::Debug for ClientDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientDispatcher")
            .field("connection", &self.connection)
            .field("owner", &self.owner.id())
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

/// Registry-facing half of a dispatcher.
struct DispatcherSink {
    dispatcher: Weak<ClientDispatcher>,
}

impl ConnectionSink for DispatcherSink {
    fn connected(&self, name: &ComponentName, handle: Option<RemoteHandle>) {
        if let Some(dispatcher) = self.dispatcher.upgrade() {
            dispatcher.schedule_connected(name.clone(), handle);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poison| poison.into_inner())
}
