//! Process-wide shutdown: signal flags, the registry of live lines and the coordinator that
//! terminates daemons from the main thread.

mod coordinator;
mod registry;
mod signals;

#[cfg(test)]
mod tests;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use coordinator::{ShutdownCoordinator, ShutdownKind};
pub use registry::{SessionRegistry, SessionSlot};
pub use signals::{install_signal_handlers, take_hangup, take_interrupt};

/// Cooperative stop flag checked by every session loop at iteration boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
