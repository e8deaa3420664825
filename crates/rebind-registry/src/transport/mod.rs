//! Transport-neutral remote object capability.
//!
//! The registry never talks to a concrete IPC mechanism. Everything it needs
//! from a cross-process reference is captured by [`RemoteObject`]: a liveness
//! probe, a request/response call, and death notification. [`RemoteHandle`]
//! is the cloneable, identity-comparable wrapper passed around the crate.

mod local;
mod recovering;

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::TransportError;

pub use self::local::{LocalObject, RequestHandler};
pub use self::recovering::{HandleSource, RecoveringHandle};

/// Callback fired once when a watched object dies.
pub type DeathCallback = Box<dyn FnOnce() + Send + 'static>;

/// Token identifying one registered death watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchToken(u64);

impl WatchToken {
    /// Wraps a raw token value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw token value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// A reference to an object living in some (possibly remote) process.
///
/// Implementations must run death callbacks exactly once and never while
/// holding their own internal locks.
pub trait RemoteObject: Send + Sync + fmt::Debug {
    /// Returns `true` while the object is reachable.
    fn is_alive(&self) -> bool;

    /// Sends a request and waits for the response.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the object is dead or refuses the
    /// request.
    fn invoke(&self, request: Value) -> Result<Value, TransportError>;

    /// Registers `callback` to run when the object dies.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Dead`] when the object is already dead, or
    /// [`TransportError::Unsupported`] when the handle forbids death watches.
    fn watch_death(&self, callback: DeathCallback) -> Result<WatchToken, TransportError>;

    /// Removes a death watch. Returns `false` when the token was unknown.
    fn unwatch(&self, token: WatchToken) -> bool;
}

/// Cloneable handle to a [`RemoteObject`] with identity comparison.
///
/// # Example
///
/// ```
/// use rebind_registry::{LocalObject, RemoteHandle};
///
/// let handle = RemoteHandle::from_object(LocalObject::new("echo"));
/// let copy = handle.clone();
/// assert!(handle.same_object(&copy));
/// assert!(handle.is_alive());
/// ```
#[derive(Clone)]
pub struct RemoteHandle {
    object: Arc<dyn RemoteObject>,
}

impl RemoteHandle {
    /// Wraps a shared remote object.
    #[must_use]
    pub fn new(object: Arc<dyn RemoteObject>) -> Self {
        Self { object }
    }

    /// Wraps an owned remote object.
    #[must_use]
    pub fn from_object<T: RemoteObject + 'static>(object: T) -> Self {
        Self::new(Arc::new(object))
    }

    /// Returns `true` when both handles refer to the same object.
    #[must_use]
    pub fn same_object(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.object), Arc::as_ptr(&other.object))
    }

    /// Returns `true` while the object is reachable.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.object.is_alive()
    }

    /// Sends a request and waits for the response.
    ///
    /// # Errors
    ///
    /// Propagates the object's [`TransportError`].
    pub fn invoke(&self, request: Value) -> Result<Value, TransportError> {
        self.object.invoke(request)
    }

    /// Registers a death watch.
    ///
    /// # Errors
    ///
    /// Propagates the object's [`TransportError`].
    pub fn watch_death(&self, callback: DeathCallback) -> Result<WatchToken, TransportError> {
        self.object.watch_death(callback)
    }

    /// Removes a death watch.
    pub fn unwatch(&self, token: WatchToken) -> bool {
        self.object.unwatch(token)
    }
}

impl fmt::Debug for RemoteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RemoteHandle").field(&self.object).finish()
    }
}

#[cfg(test)]
mod tests;
