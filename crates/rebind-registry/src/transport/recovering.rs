//! Handle that re-resolves its target after the target dies.

use std::fmt;
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;
use tracing::{debug, warn};

use super::{DeathCallback, RemoteHandle, RemoteObject, WatchToken};
use crate::error::TransportError;

const RECOVERING_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport::recovering");

/// Supplies a fresh handle whenever a [`RecoveringHandle`] needs one.
pub type HandleSource = Box<dyn Fn() -> Option<RemoteHandle> + Send + Sync>;

/// Remote object proxy that survives restarts of its target.
///
/// Each call goes to the most recently fetched handle. When that handle is
/// dead the proxy fetches a new one, and a call that fails with
/// [`TransportError::Dead`] is retried once against the replacement.
///
/// Because the proxied target changes over time, death watches are
/// meaningless here: registering one is rejected in debug builds and
/// silently ignored in release builds.
pub struct RecoveringHandle {
    label: String,
    source: HandleSource,
    current: Mutex<Option<RemoteHandle>>,
}

impl RecoveringHandle {
    /// Creates a proxy fetching its target from `source`.
    #[must_use]
    pub fn new<F>(label: impl Into<String>, source: F) -> Self
    where
        F: Fn() -> Option<RemoteHandle> + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            source: Box::new(source),
            current: Mutex::new(None),
        }
    }

    /// Returns a live target handle, fetching a new one when needed.
    #[must_use]
    pub fn current(&self) -> Option<RemoteHandle> {
        let mut current = self.lock();
        if let Some(handle) = current.as_ref().filter(|handle| handle.is_alive()) {
            return Some(handle.clone());
        }
        let fetched = (self.source)().filter(RemoteHandle::is_alive);
        if fetched.is_some() {
            debug!(target: RECOVERING_TARGET, label = %self.label, "target re-resolved");
        }
        *current = fetched.clone();
        fetched
    }

    fn forget_current(&self) {
        self.lock().take();
    }

    fn lock(&self) -> MutexGuard<'_, Option<RemoteHandle>> {
        self.current
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    fn unreachable(&self) -> TransportError {
        TransportError::Dead {
            label: self.label.clone(),
        }
    }
}

impl RemoteObject for RecoveringHandle {
    fn is_alive(&self) -> bool {
        self.current().is_some()
    }

    fn invoke(&self, request: Value) -> Result<Value, TransportError> {
        let handle = self.current().ok_or_else(|| self.unreachable())?;
        match handle.invoke(request.clone()) {
            Err(TransportError::Dead { .. }) => {
                self.forget_current();
                let retry = self.current().ok_or_else(|| self.unreachable())?;
                retry.invoke(request)
            }
            other => other,
        }
    }

    fn watch_death(&self, callback: DeathCallback) -> Result<WatchToken, TransportError> {
        drop(callback);
        if cfg!(debug_assertions) {
            return Err(TransportError::Unsupported {
                label: self.label.clone(),
                operation: "watch_death",
            });
        }
        warn!(
            target: RECOVERING_TARGET,
            label = %self.label,
            "death watch on a recovering handle ignored"
        );
        Ok(WatchToken::new(0))
    }

    fn unwatch(&self, _token: WatchToken) -> bool {
        false
    }
}

impl fmt::Debug for RecoveringHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveringHandle")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}
