//! In-process implementation of [`RemoteObject`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;
use tracing::debug;

use super::{DeathCallback, RemoteObject, WatchToken};
use crate::error::TransportError;

const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");

/// Request handler backing a [`LocalObject`].
pub type RequestHandler = Box<dyn Fn(Value) -> Result<Value, TransportError> + Send + Sync>;

/// Object living in the current process.
///
/// Used by the loopback transport and as the callback channel of in-process
/// clients. [`LocalObject::kill`] simulates the death of the hosting process.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use rebind_registry::{LocalObject, RemoteObject};
///
/// let object = LocalObject::new("client");
/// let fired = Arc::new(AtomicBool::new(false));
/// let flag = Arc::clone(&fired);
/// object
///     .watch_death(Box::new(move || flag.store(true, Ordering::SeqCst)))
///     .expect("object is alive");
/// object.kill();
/// assert!(fired.load(Ordering::SeqCst));
/// assert!(!object.is_alive());
/// ```
pub struct LocalObject {
    label: String,
    handler: Option<RequestHandler>,
    state: Mutex<LocalState>,
}

struct LocalState {
    alive: bool,
    next_token: u64,
    watchers: BTreeMap<WatchToken, DeathCallback>,
}

impl LocalObject {
    /// Creates a live object that rejects every request.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            handler: None,
            state: Mutex::new(LocalState {
                alive: true,
                next_token: 1,
                watchers: BTreeMap::new(),
            }),
        }
    }

    /// Creates a live object answering requests with `handler`.
    #[must_use]
    pub fn with_handler<F>(label: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value) -> Result<Value, TransportError> + Send + Sync + 'static,
    {
        Self {
            handler: Some(Box::new(handler)),
            ..Self::new(label)
        }
    }

    /// Returns the diagnostic label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the number of registered death watches.
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        self.lock().watchers.len()
    }

    /// Marks the object dead and fires every registered death watch.
    ///
    /// Callbacks run on the calling thread after the internal lock has been
    /// released. Killing an already dead object does nothing.
    pub fn kill(&self) {
        let watchers = {
            let mut state = self.lock();
            if !state.alive {
                return;
            }
            state.alive = false;
            std::mem::take(&mut state.watchers)
        };
        debug!(
            target: TRANSPORT_TARGET,
            label = %self.label,
            watchers = watchers.len(),
            "local object died"
        );
        for callback in watchers.into_values() {
            callback();
        }
    }

    fn lock(&self) -> MutexGuard<'_, LocalState> {
        self.state
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    fn dead(&self) -> TransportError {
        TransportError::Dead {
            label: self.label.clone(),
        }
    }
}

impl RemoteObject for LocalObject {
    fn is_alive(&self) -> bool {
        self.lock().alive
    }

    fn invoke(&self, request: Value) -> Result<Value, TransportError> {
        if !self.is_alive() {
            return Err(self.dead());
        }
        match &self.handler {
            Some(handler) => handler(request),
            None => Err(TransportError::Rejected {
                label: self.label.clone(),
                message: String::from("object accepts no requests"),
            }),
        }
    }

    fn watch_death(&self, callback: DeathCallback) -> Result<WatchToken, TransportError> {
        let mut state = self.lock();
        if !state.alive {
            return Err(self.dead());
        }
        let token = WatchToken::new(state.next_token);
        state.next_token = state.next_token.saturating_add(1);
        state.watchers.insert(token, callback);
        Ok(token)
    }

    fn unwatch(&self, token: WatchToken) -> bool {
        self.lock().watchers.remove(&token).is_some()
    }
}

impl fmt::Debug for LocalObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalObject")
            .field("label", &self.label)
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}
