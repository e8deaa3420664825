//! Behavioural tests for the host bootstrap sequence.

use std::cell::RefCell;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use rebind_registry::ProcessSlot;

use super::support::{self, HealthEvent, TestWorld, sync_service};

type StepResult = Result<(), String>;

#[fixture]
fn world() -> RefCell<TestWorld> {
    support::world()
}

#[given("a healthy configuration loader")]
fn given_healthy_loader(world: &RefCell<TestWorld>) {
    world.borrow_mut().use_process("p0");
}

#[given("a failing configuration loader")]
fn given_failing_loader(world: &RefCell<TestWorld>) {
    world.borrow_mut().use_failing_loader();
}

#[given("a configuration hosting process {process}")]
fn given_process(world: &RefCell<TestWorld>, process: String) {
    world.borrow_mut().use_process(process.trim_matches('"'));
}

#[when("the host bootstrap runs")]
fn when_bootstrap_runs(world: &RefCell<TestWorld>) {
    world.borrow_mut().bootstrap();
}

#[when("a client binds the sync service")]
fn when_client_binds(world: &RefCell<TestWorld>) {
    world.borrow_mut().bind_sync_service();
}

#[when("the host shuts down")]
fn when_host_shuts_down(world: &RefCell<TestWorld>) {
    world.borrow_mut().shutdown();
}

#[then("bootstrap succeeds")]
fn then_bootstrap_succeeds(world: &RefCell<TestWorld>) {
    let world = world.borrow();
    assert!(
        world.bootstrap_error().is_none(),
        "bootstrap error: {:?}",
        world.bootstrap_error()
    );
    assert!(world.host().is_some(), "host should have been started");
}

#[then("bootstrap fails")]
fn then_bootstrap_fails(world: &RefCell<TestWorld>) {
    assert!(
        world.borrow().bootstrap_error().is_some(),
        "bootstrap succeeded unexpectedly"
    );
}

#[then("the host serves process {process}")]
fn then_serves(world: &RefCell<TestWorld>, process: String) -> StepResult {
    let slot: ProcessSlot = process
        .trim_matches('"')
        .parse()
        .map_err(|error| format!("bad process in step: {error}"))?;
    if world.borrow().serves(slot) {
        Ok(())
    } else {
        Err(format!("host does not serve {slot}"))
    }
}

#[then("the reporter recorded bootstrap success with {count} component(s)")]
fn then_reporter_success(world: &RefCell<TestWorld>, count: usize) {
    let events = world.borrow().reporter.events();
    assert!(
        events.contains(&HealthEvent::BootstrapSucceeded { components: count }),
        "bootstrap success event missing: {events:?}"
    );
}

#[then("the reporter recorded bootstrap failure")]
fn then_reporter_failure(world: &RefCell<TestWorld>) {
    let events = world.borrow().reporter.events();
    assert!(
        events
            .iter()
            .any(|event| matches!(event, HealthEvent::BootstrapFailed(_))),
        "bootstrap failure event missing: {events:?}"
    );
    assert_eq!(events.first(), Some(&HealthEvent::BootstrapStarting));
}

#[then("the bind succeeded and the listener connected")]
fn then_listener_connected(world: &RefCell<TestWorld>) {
    let world = world.borrow();
    assert_eq!(world.bind_result, Some(true));
    assert_eq!(world.listener.connected(), vec![sync_service()]);
}

#[then("the sync service has {count} connection(s)")]
fn then_connections(world: &RefCell<TestWorld>, count: usize) {
    assert_eq!(world.borrow().connections(), count);
}

#[then("the host stopped with {components} component(s) and {clients} client(s)")]
fn then_host_stopped(world: &RefCell<TestWorld>, components: usize, clients: usize) {
    let events = world.borrow().reporter.events();
    assert_eq!(
        events.last(),
        Some(&HealthEvent::HostStopped { components, clients })
    );
}

#[scenario(path = "tests/features/host_bootstrap.feature")]
fn host_bootstrap_behaviour(world: RefCell<TestWorld>) {
    let _ = world;
}
