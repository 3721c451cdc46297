use crate::log_debug;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Shared view of one line: which daemon it runs and whether someone asked to stop it.
///
/// Only the owning session spawns, signals and reaps its daemon; other threads go through
/// [`SessionSlot::request_child_termination`].
#[derive(Debug)]
pub struct SessionSlot {
    device: String,
    child_pid: AtomicU32,
    terminate_child: AtomicBool,
}

impl SessionSlot {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            child_pid: AtomicU32::new(0),
            terminate_child: AtomicBool::new(false),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// Pid of the running daemon, if any.
    pub fn child_pid(&self) -> Option<u32> {
        match self.child_pid.load(Ordering::SeqCst) {
            0 => None,
            pid => Some(pid),
        }
    }

    pub fn child_active(&self) -> bool {
        self.child_pid().is_some()
    }

    pub fn attach_child(&self, pid: u32) {
        self.terminate_child.store(false, Ordering::SeqCst);
        self.child_pid.store(pid, Ordering::SeqCst);
    }

    pub fn detach_child(&self) {
        self.child_pid.store(0, Ordering::SeqCst);
        self.terminate_child.store(false, Ordering::SeqCst);
    }

    pub fn request_child_termination(&self) {
        self.terminate_child.store(true, Ordering::SeqCst);
    }

    pub fn termination_requested(&self) -> bool {
        self.terminate_child.load(Ordering::SeqCst)
    }
}

/// Every line configured at startup.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    slots: Mutex<Vec<Arc<SessionSlot>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots_guard(&self, context: &str) -> MutexGuard<'_, Vec<Arc<SessionSlot>>> {
        match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log_debug(&format!("registry mutex poisoned in {context}; recovering"));
                poisoned.into_inner()
            }
        }
    }

    pub fn register(&self, device: impl Into<String>) -> Arc<SessionSlot> {
        let slot = Arc::new(SessionSlot::new(device));
        self.slots_guard("register").push(Arc::clone(&slot));
        slot
    }

    /// Snapshot of the registered slots; the lock is not held by the caller.
    pub fn slots(&self) -> Vec<Arc<SessionSlot>> {
        self.slots_guard("slots").clone()
    }

    pub fn len(&self) -> usize {
        self.slots_guard("len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn active_children(&self) -> usize {
        self.slots_guard("active_children")
            .iter()
            .filter(|slot| slot.child_active())
            .count()
    }
}
