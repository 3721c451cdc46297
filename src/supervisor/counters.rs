#[cfg(any(test, feature = "mutants"))]
use std::cell::Cell;

#[cfg(any(test, feature = "mutants"))]
thread_local! {
    static DAEMON_SPAWN_COUNT: Cell<usize> = const { Cell::new(0) };
}

#[cfg(any(test, feature = "mutants"))]
#[allow(dead_code)]
pub(crate) fn reset_daemon_spawn_count() {
    DAEMON_SPAWN_COUNT.with(|count| count.set(0));
}

#[cfg(any(test, feature = "mutants"))]
#[allow(dead_code)]
pub(crate) fn daemon_spawn_count() -> usize {
    DAEMON_SPAWN_COUNT.with(|count| count.get())
}

pub(super) fn record_daemon_spawn() {
    #[cfg(any(test, feature = "mutants"))]
    DAEMON_SPAWN_COUNT.with(|count| count.set(count.get().saturating_add(1)));
}
