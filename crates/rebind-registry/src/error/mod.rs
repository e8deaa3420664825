//! Domain errors raised by the registry, its transport, and its clients.
//!
//! Every layer owns one `thiserror` enum with structured fields so callers
//! can inspect failures programmatically. I/O errors are wrapped in `Arc` to
//! satisfy the `result_large_err` Clippy lint.

use std::panic::Location;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::component::ComponentKind;
use crate::process::ProcessSlot;

/// Errors raised while parsing or validating identity types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    /// A component name was not of the form `package/class`.
    #[error("component name '{value}' must be of the form 'package/class'")]
    MalformedName {
        /// Rejected input.
        value: String,
    },

    /// A component name had an empty package or class part.
    #[error("component name '{value}' has a blank package or class")]
    BlankName {
        /// Rejected input.
        value: String,
    },

    /// Component metadata named no plugin.
    #[error("component '{component}' does not name its plugin")]
    BlankPlugin {
        /// Component whose metadata is incomplete.
        component: String,
    },

    /// A process slot was not `ui`, `persistent`, or `p<n>`.
    #[error("unknown process slot '{value}'")]
    UnknownProcess {
        /// Rejected input.
        value: String,
    },
}

/// Failures reported by a remote handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The remote object is no longer reachable.
    #[error("remote object '{label}' is dead")]
    Dead {
        /// Label of the dead object.
        label: String,
    },

    /// The operation is not supported by this handle.
    #[error("operation '{operation}' is not supported by '{label}'")]
    Unsupported {
        /// Label of the handle.
        label: String,
        /// Name of the rejected operation.
        operation: &'static str,
    },

    /// The remote side refused the request.
    #[error("remote object '{label}' rejected the request: {message}")]
    Rejected {
        /// Label of the remote object.
        label: String,
        /// Description of the refusal.
        message: String,
    },
}

/// Failures of a blocking hop onto a serial execution context.
#[derive(Debug, Clone, Error)]
pub enum RendezvousError {
    /// The job did not complete within the allotted time.
    #[error("execution context '{queue}' did not answer within {timeout_ms}ms")]
    Timeout {
        /// Queue name.
        queue: String,
        /// Allotted time in milliseconds.
        timeout_ms: u128,
    },

    /// The context has shut down and accepts no more work.
    #[error("execution context '{queue}' is closed")]
    Closed {
        /// Queue name.
        queue: String,
    },

    /// The worker thread could not be started.
    #[error("failed to spawn execution context '{queue}': {source}")]
    Spawn {
        /// Queue name.
        queue: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },
}

/// Why a component factory could not produce an instance.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstallFailure {
    /// No factory was registered for the component's kind.
    #[error("no factory registered for {kind} components")]
    UnsupportedKind {
        /// Kind that had no factory.
        kind: ComponentKind,
    },

    /// The factory itself failed.
    #[error("factory failed to create '{component}': {message}")]
    Factory {
        /// Component that failed to instantiate.
        component: String,
        /// Description of the failure.
        message: String,
    },

    /// The main execution context was unavailable.
    #[error("main execution context unavailable: {message}")]
    ContextUnavailable {
        /// Description of the failure.
        message: String,
    },
}

/// Errors returned by a process anchor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to anchor process slot {slot}: {message}")]
pub struct AnchorError {
    /// Slot that could not be anchored.
    pub slot: ProcessSlot,
    /// Description of the failure.
    pub message: String,
}

/// Errors returned by registry operations.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// The target does not name a known component.
    #[error("component '{component}' not found")]
    NotFound {
        /// Requested component.
        component: String,
    },

    /// The registry or the caller's channel could not be reached.
    #[error("remote unavailable: {source}")]
    RemoteUnavailable {
        /// Underlying transport failure.
        #[source]
        source: TransportError,
    },

    /// Installation did not finish before the rendezvous timeout.
    #[error("installing '{component}' timed out after {timeout_ms}ms")]
    InstallTimeout {
        /// Component being installed.
        component: String,
        /// Allotted time in milliseconds.
        timeout_ms: u128,
    },

    /// The factory failed to create the component.
    #[error("installing '{component}' failed: {source}")]
    InstallFailure {
        /// Component being installed.
        component: String,
        /// Underlying failure.
        #[source]
        source: InstallFailure,
    },
}

/// Errors raised while obtaining a client dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatcherError {
    /// A listener was reused from the same owner with a different queue.
    #[error(
        "listener {listener} registered with owner '{owner}' on a different execution context"
    )]
    ContextMismatch {
        /// Owner identity.
        owner: String,
        /// Connection handle of the existing dispatcher.
        listener: String,
    },
}

/// Errors raised when forgetting a dispatcher on unbind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnbindError {
    /// The listener was already unbound.
    #[error("listener was already unbound at {origin}")]
    AlreadyUnbound {
        /// Source location of the first unbind.
        origin: &'static Location<'static>,
    },

    /// The listener was never bound through this owner.
    #[error("listener is not registered with owner '{owner}'")]
    NotRegistered {
        /// Owner identity.
        owner: String,
    },
}

/// Errors raised while loading or populating the component catalogue.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalogue file could not be read.
    #[error("failed to read component catalogue {path}: {source}")]
    Io {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The catalogue file was not valid JSON.
    #[error("failed to parse component catalogue {path}: {source}")]
    Parse {
        /// Path that was parsed.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: Arc<serde_json::Error>,
    },

    /// An entry failed validation.
    #[error("invalid catalogue entry: {0}")]
    Invalid(#[from] DescriptorError),

    /// Two entries described the same component.
    #[error("component '{component}' is already registered")]
    Duplicate {
        /// Component registered twice.
        component: String,
    },
}

#[cfg(test)]
mod tests;
