use super::signals::raise_hangup_for_tests;
use super::*;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn cancel_token_is_shared_between_clones() {
    let token = CancelToken::new();
    let clone = token.clone();
    assert!(!clone.is_cancelled());
    token.cancel();
    assert!(clone.is_cancelled());
}

#[test]
fn slot_tracks_child_and_termination_request() {
    let slot = SessionSlot::new("/dev/ttyS1");
    assert_eq!(slot.device(), "/dev/ttyS1");
    assert_eq!(slot.child_pid(), None);

    slot.request_child_termination();
    slot.attach_child(4242);
    assert_eq!(slot.child_pid(), Some(4242));
    assert!(!slot.termination_requested());

    slot.request_child_termination();
    assert!(slot.termination_requested());
    slot.detach_child();
    assert!(!slot.child_active());
    assert!(!slot.termination_requested());
}

#[test]
fn registry_counts_active_children() {
    let registry = SessionRegistry::new();
    assert!(registry.is_empty());
    let first = registry.register("/dev/ttyS0");
    let _second = registry.register("/dev/ttyS1");
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.active_children(), 0);
    first.attach_child(100);
    assert_eq!(registry.active_children(), 1);
    assert_eq!(registry.slots()[0].device(), "/dev/ttyS0");
}

#[test]
fn interrupt_cancels_sessions_even_without_children() {
    let registry = Arc::new(SessionRegistry::new());
    registry.register("/dev/ttyS0");
    let cancel = CancelToken::new();
    let coordinator =
        ShutdownCoordinator::new(Arc::clone(&registry), cancel.clone(), Duration::from_secs(1));
    assert_eq!(coordinator.handle(ShutdownKind::Interrupt), 0);
    assert!(cancel.is_cancelled());
}

#[test]
fn hangup_asks_owner_to_stop_child_and_waits_for_it() {
    let registry = Arc::new(SessionRegistry::new());
    let slot = registry.register("/dev/ttyS0");
    slot.attach_child(31337);
    let cancel = CancelToken::new();

    let owner = {
        let slot = Arc::clone(&slot);
        thread::spawn(move || {
            let deadline = Instant::now() + Duration::from_secs(5);
            while !slot.termination_requested() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(5));
            }
            slot.detach_child();
        })
    };

    let coordinator =
        ShutdownCoordinator::new(Arc::clone(&registry), cancel.clone(), Duration::from_secs(5));
    assert_eq!(coordinator.handle(ShutdownKind::Hangup), 0);
    assert!(!cancel.is_cancelled());
    owner.join().expect("owner thread");
}

#[test]
fn coordinator_gives_up_after_wait() {
    let registry = Arc::new(SessionRegistry::new());
    let slot = registry.register("/dev/ttyS0");
    slot.attach_child(31337);
    let coordinator = ShutdownCoordinator::new(
        Arc::clone(&registry),
        CancelToken::new(),
        Duration::from_millis(60),
    );
    assert_eq!(coordinator.handle(ShutdownKind::Hangup), 1);
    assert!(slot.termination_requested());
}

#[test]
fn hangup_flag_is_consumed_once() {
    raise_hangup_for_tests();
    assert!(take_hangup());
    assert!(!take_hangup());
}
