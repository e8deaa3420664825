//! Tests for the remote handle capability.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rstest::{fixture, rstest};
use serde_json::json;

use super::*;

fn counting_callback(counter: &Arc<AtomicUsize>) -> DeathCallback {
    let counter = Arc::clone(counter);
    Box::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

#[fixture]
fn echo() -> Arc<LocalObject> {
    Arc::new(LocalObject::with_handler("echo", Ok))
}

// ---------------------------------------------------------------------------
// LocalObject
// ---------------------------------------------------------------------------

#[rstest]
fn death_watchers_fire_exactly_once(echo: Arc<LocalObject>) {
    let counter = Arc::new(AtomicUsize::new(0));
    echo.watch_death(counting_callback(&counter))
        .expect("watch registers");
    echo.watch_death(counting_callback(&counter))
        .expect("watch registers");

    echo.kill();
    echo.kill();

    assert_eq!(counter.load(Ordering::SeqCst), 2);
    assert_eq!(echo.watcher_count(), 0);
}

#[rstest]
fn unwatched_callbacks_do_not_fire(echo: Arc<LocalObject>) {
    let counter = Arc::new(AtomicUsize::new(0));
    let token = echo
        .watch_death(counting_callback(&counter))
        .expect("watch registers");
    assert!(echo.unwatch(token));
    assert!(!echo.unwatch(token));

    echo.kill();
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[rstest]
fn dead_objects_refuse_calls_and_watches(echo: Arc<LocalObject>) {
    echo.kill();
    let counter = Arc::new(AtomicUsize::new(0));
    assert!(matches!(
        echo.watch_death(counting_callback(&counter)),
        Err(TransportError::Dead { .. })
    ));
    assert!(matches!(
        echo.invoke(json!({"ping": 1})),
        Err(TransportError::Dead { .. })
    ));
}

#[test]
fn objects_without_handler_reject_requests() {
    let object = LocalObject::new("mute");
    assert!(matches!(
        object.invoke(json!(null)),
        Err(TransportError::Rejected { .. })
    ));
}

#[rstest]
fn handles_compare_by_identity(echo: Arc<LocalObject>) {
    let first = RemoteHandle::new(echo.clone());
    let second = RemoteHandle::new(echo);
    let other = RemoteHandle::from_object(LocalObject::new("other"));
    assert!(first.same_object(&second));
    assert!(!first.same_object(&other));
}

// ---------------------------------------------------------------------------
// RecoveringHandle
// ---------------------------------------------------------------------------

#[test]
fn recovering_handle_follows_replacement_targets() {
    let generation = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&generation);
    let proxy = RecoveringHandle::new("service", move || {
        let id = counter.fetch_add(1, Ordering::SeqCst);
        Some(RemoteHandle::from_object(LocalObject::with_handler(
            format!("service-{id}"),
            move |_| Ok(json!(id)),
        )))
    });

    let first = proxy.current().expect("first target");
    assert_eq!(proxy.invoke(json!(null)).expect("call"), json!(0));
    assert_eq!(generation.load(Ordering::SeqCst), 1);

    // A second call reuses the cached target.
    assert_eq!(proxy.invoke(json!(null)).expect("call"), json!(0));
    assert!(proxy.current().expect("cached").same_object(&first));
}

#[test]
fn recovering_handle_reports_unreachable_target() {
    let proxy = RecoveringHandle::new("absent", || None);
    assert!(!proxy.is_alive());
    assert!(matches!(
        proxy.invoke(json!(null)),
        Err(TransportError::Dead { .. })
    ));
}

#[test]
fn recovering_handle_refetches_after_death() {
    let targets: Vec<Arc<LocalObject>> = (0..2)
        .map(|id| Arc::new(LocalObject::with_handler(format!("t{id}"), move |_| Ok(json!(id)))))
        .collect();
    let source_targets = targets.clone();
    let proxy = RecoveringHandle::new("service", move || {
        source_targets
            .iter()
            .find(|target| target.is_alive())
            .map(|target| RemoteHandle::new(Arc::clone(target) as Arc<dyn RemoteObject>))
    });

    assert_eq!(proxy.invoke(json!(null)).expect("first call"), json!(0));
    targets.first().expect("first target").kill();
    assert_eq!(proxy.invoke(json!(null)).expect("second call"), json!(1));
}

#[cfg(debug_assertions)]
#[test]
fn recovering_handle_rejects_death_watches_in_debug_builds() {
    let proxy = RecoveringHandle::new("service", || None);
    let result = proxy.watch_death(Box::new(|| {}));
    assert!(matches!(
        result,
        Err(TransportError::Unsupported {
            operation: "watch_death",
            ..
        })
    ));
}

#[cfg(not(debug_assertions))]
#[test]
fn recovering_handle_ignores_death_watches_in_release_builds() {
    let proxy = RecoveringHandle::new("service", || None);
    assert!(proxy.watch_death(Box::new(|| {})).is_ok());
}
