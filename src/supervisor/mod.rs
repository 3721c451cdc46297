//! Launches the point-to-point daemon on an answered line and waits for it to finish.

mod counters;
mod process;


#[cfg(any(test, feature = "mutants"))]
#[allow(unused_imports)]
pub(crate) use counters::{daemon_spawn_count, reset_daemon_spawn_count};
pub use process::{
    describe_exit, DaemonProcess, DaemonSupervisor, DEFAULT_DAEMON, DEFAULT_DAEMON_OPTIONS,
    TERMINATE_GRACE,
};
