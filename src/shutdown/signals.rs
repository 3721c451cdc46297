use crate::log_debug;
use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};

/// Set by SIGINT/SIGTERM.
static INTERRUPT_RECEIVED: AtomicBool = AtomicBool::new(false);
/// Set by SIGHUP.
static HANGUP_RECEIVED: AtomicBool = AtomicBool::new(false);

// Handlers only flip atomics (async-signal-safe); the main thread does the actual work.
extern "C" fn handle_interrupt(_: libc::c_int) {
    INTERRUPT_RECEIVED.store(true, Ordering::SeqCst);
}

extern "C" fn handle_hangup(_: libc::c_int) {
    HANGUP_RECEIVED.store(true, Ordering::SeqCst);
}

fn install(signo: libc::c_int, handler: extern "C" fn(libc::c_int), name: &str) -> Result<()> {
    unsafe {
        // SAFETY: the handler is an extern "C" fn that only stores to an atomic.
        let handler = handler as *const () as libc::sighandler_t;
        if libc::signal(signo, handler) == libc::SIG_ERR {
            log_debug(&format!("failed to install {name} handler"));
            return Err(anyhow!("failed to install {name} handler"));
        }
    }
    Ok(())
}

pub fn install_signal_handlers() -> Result<()> {
    install(libc::SIGINT, handle_interrupt, "SIGINT")?;
    install(libc::SIGTERM, handle_interrupt, "SIGTERM")?;
    install(libc::SIGHUP, handle_hangup, "SIGHUP")?;
    Ok(())
}

/// Consume a pending interrupt request.
pub fn take_interrupt() -> bool {
    INTERRUPT_RECEIVED.swap(false, Ordering::SeqCst)
}

/// Consume a pending hangup request.
pub fn take_hangup() -> bool {
    HANGUP_RECEIVED.swap(false, Ordering::SeqCst)
}

#[cfg(test)]
pub(super) fn raise_hangup_for_tests() {
    handle_hangup(libc::SIGHUP);
}
