use super::{CancelToken, SessionRegistry};
use crate::log_debug;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const CHILD_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownKind {
    /// SIGINT/SIGTERM: stop every daemon, then every session.
    Interrupt,
    /// SIGHUP: stop every daemon; sessions keep serving.
    Hangup,
}

/// Runs on the main thread after a signal flag was consumed; never inside a handler.
pub struct ShutdownCoordinator {
    registry: Arc<SessionRegistry>,
    cancel: CancelToken,
    child_wait: Duration,
}

impl ShutdownCoordinator {
    pub fn new(registry: Arc<SessionRegistry>, cancel: CancelToken, child_wait: Duration) -> Self {
        Self {
            registry,
            cancel,
            child_wait,
        }
    }

    /// Ask every live daemon to terminate and wait for the sessions to reap them.
    /// Returns how many daemons were still running when the wait gave up.
    pub fn handle(&self, kind: ShutdownKind) -> usize {
        log_debug(&format!("shutdown coordinator handling {kind:?}"));
        if kind == ShutdownKind::Interrupt {
            self.cancel.cancel();
        }

        let targets: Vec<_> = self
            .registry
            .slots()
            .into_iter()
            .filter(|slot| slot.child_active())
            .collect();
        for slot in &targets {
            info!(
                device = slot.device(),
                pid = slot.child_pid().unwrap_or_default(),
                "terminating daemon"
            );
            slot.request_child_termination();
        }

        let deadline = Instant::now() + self.child_wait;
        loop {
            let alive = targets.iter().filter(|slot| slot.child_active()).count();
            if alive == 0 {
                return 0;
            }
            if Instant::now() >= deadline {
                warn!(alive, "daemons still running after shutdown wait");
                return alive;
            }
            thread::sleep(CHILD_POLL_INTERVAL);
        }
    }
}
