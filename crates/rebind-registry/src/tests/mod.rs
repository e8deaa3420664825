//! Crate-level integration and BDD tests.

use crate::component::{BindFlags, Intent};
use crate::process::ProcessSlot;
use crate::test_support::{ClientHarness, ListenerEvent, sync_service, upload_service};


#[test]
fn end_to_end_bind_and_unbind_over_loopback() {
    let env = ClientHarness::new();
    assert!(env.bind(BindFlags::AUTO_CREATE));
    assert!(env.client.bind(
        &env.owner,
        &Intent::new(upload_service()),
        &env.listener,
        BindFlags::empty(),
    ));
    env.drain_owner();

    let events = env.recorder.events();
    assert_eq!(events.len(), 2);
    assert!(
        events
            .iter()
            .all(|event| matches!(event, ListenerEvent::Connected(_, handle) if handle.is_alive()))
    );

    let snapshot = env.client.dump(ProcessSlot::Plugin(0)).expect("dump");
    let sync = snapshot.component(&sync_service()).expect("sync installed");
    assert_eq!(sync.connections, 1);

    assert!(env.client.unbind(&env.owner, &env.listener));
    env.drain_owner();

    let after = env.client.dump(ProcessSlot::Plugin(0)).expect("dump");
    assert!(after.component(&sync_service()).is_none());
    assert!(after.component(&upload_service()).is_some());
    assert_eq!(after.client_processes, 0);
    assert!(env.client.directory().is_empty());
}
