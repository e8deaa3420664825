//! Tests for error formatting.

use std::io;
use std::panic::Location;
use std::path::PathBuf;
use std::sync::Arc;

use rstest::rstest;

use super::*;

#[rstest]
#[case::not_found(
    RegistryError::NotFound { component: String::from("demo/Sync") },
    "component 'demo/Sync' not found",
)]
#[case::timeout(
    RegistryError::InstallTimeout { component: String::from("demo/Sync"), timeout_ms: 6_000 },
    "installing 'demo/Sync' timed out after 6000ms",
)]
#[case::failure(
    RegistryError::InstallFailure {
        component: String::from("demo/Sync"),
        source: InstallFailure::UnsupportedKind { kind: ComponentKind::Plugin },
    },
    "installing 'demo/Sync' failed: no factory registered for plugin components",
)]
fn registry_errors_render(#[case] error: RegistryError, #[case] expected: &str) {
    assert_eq!(error.to_string(), expected);
}

#[test]
fn remote_unavailable_exposes_transport_source() {
    let error = RegistryError::RemoteUnavailable {
        source: TransportError::Dead {
            label: String::from("registry:p1"),
        },
    };
    let source = std::error::Error::source(&error).expect("source present");
    assert_eq!(source.to_string(), "remote object 'registry:p1' is dead");
}

#[test]
fn already_unbound_names_origin() {
    let origin = Location::caller();
    let error = UnbindError::AlreadyUnbound { origin };
    assert!(error.to_string().contains(origin.file()));
}

#[test]
fn catalog_io_error_is_cloneable_through_arc() {
    let error = CatalogError::Io {
        path: PathBuf::from("/missing.json"),
        source: Arc::new(io::Error::new(io::ErrorKind::NotFound, "gone")),
    };
    assert!(error.to_string().contains("/missing.json"));
}

#[test]
fn anchor_error_names_slot() {
    let error = AnchorError {
        slot: ProcessSlot::Plugin(1),
        message: String::from("watchdog unavailable"),
    };
    assert_eq!(
        error.to_string(),
        "failed to anchor process slot p1: watchdog unavailable"
    );
}
