use super::counters::record_daemon_spawn;
use crate::error::SessionError;
use crate::log_debug;
use crate::modem::LineSettings;
use std::ffi::OsString;
use std::io;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Daemon launched on an answered line; resolved through `PATH`.
pub const DEFAULT_DAEMON: &str = "pppd";
/// Options file handed to the daemon with `file`. It must keep the daemon in the foreground.
pub const DEFAULT_DAEMON_OPTIONS: &str = "/etc/ppp/options.dialin";
/// Time between SIGTERM and SIGKILL when a daemon is asked to stop.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(3);

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Knows how to start the daemon for a line.
#[derive(Debug, Clone)]
pub struct DaemonSupervisor {
    daemon: PathBuf,
    options_file: PathBuf,
    terminate_grace: Duration,
}

impl DaemonSupervisor {
    pub fn new(daemon: impl Into<PathBuf>, options_file: impl Into<PathBuf>) -> Self {
        Self {
            daemon: daemon.into(),
            options_file: options_file.into(),
            terminate_grace: TERMINATE_GRACE,
        }
    }

    pub fn with_terminate_grace(mut self, grace: Duration) -> Self {
        self.terminate_grace = grace;
        self
    }

    pub fn daemon(&self) -> &Path {
        &self.daemon
    }

    /// `<device> <rate> file <options>`
    pub fn arguments(&self, line: &LineSettings) -> Vec<OsString> {
        vec![
            OsString::from(&line.device),
            OsString::from(line.rate.to_string()),
            OsString::from("file"),
            self.options_file.clone().into_os_string(),
        ]
    }

    /// Start the daemon in its own process group so terminal signals only reach it through us.
    pub fn spawn(&self, line: &LineSettings) -> Result<DaemonProcess, SessionError> {
        let mut command = Command::new(&self.daemon);
        command
            .args(self.arguments(line))
            .stdin(Stdio::null())
            .process_group(0);
        record_daemon_spawn();
        let child = command.spawn().map_err(|source| SessionError::Spawn {
            daemon: self.daemon.display().to_string(),
            source,
        })?;
        log_debug(&format!(
            "{}: spawned {} as pid {}",
            line.device,
            self.daemon.display(),
            child.id()
        ));
        Ok(DaemonProcess::new(child, self.terminate_grace))
    }
}

/// An owned daemon child. Dropping it kills and reaps a child that is still running.
#[derive(Debug)]
pub struct DaemonProcess {
    child: Child,
    started: Instant,
    grace: Duration,
    term_sent_at: Option<Instant>,
    kill_sent: bool,
    reaped: bool,
}

impl DaemonProcess {
    fn new(child: Child, grace: Duration) -> Self {
        Self {
            child,
            started: Instant::now(),
            grace,
            term_sent_at: None,
            kill_sent: false,
            reaped: false,
        }
    }

    #[cfg(test)]
    pub(super) fn from_child_for_tests(child: Child, grace: Duration) -> Self {
        Self::new(child, grace)
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Non-blocking exit check; reaps the child when it has finished.
    pub fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        let status = self.child.try_wait()?;
        if status.is_some() {
            self.reaped = true;
        }
        Ok(status)
    }

    /// Request cooperative shutdown. Only the first call sends SIGTERM.
    pub fn terminate(&mut self) {
        if self.term_sent_at.is_some() || self.reaped {
            return;
        }
        log_debug(&format!("sending SIGTERM to daemon pid {}", self.id()));
        send_signal(self.id(), Signal::Term);
        self.term_sent_at = Some(Instant::now());
    }

    /// Block until the child exits, polling `should_stop` to decide when to terminate it.
    pub fn wait(&mut self, mut should_stop: impl FnMut() -> bool) -> io::Result<ExitStatus> {
        loop {
            if let Some(status) = self.try_wait()? {
                return Ok(status);
            }
            if should_stop() {
                self.terminate();
            }
            if should_send_sigkill(self.kill_sent, self.term_sent_at, Instant::now(), self.grace)
            {
                log_debug(&format!("escalating to SIGKILL for daemon pid {}", self.id()));
                send_signal(self.id(), Signal::Kill);
                self.kill_sent = true;
            }
            thread::sleep(WAIT_POLL_INTERVAL);
        }
    }
}

impl Drop for DaemonProcess {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        if let Ok(None) = self.child.try_wait() {
            send_signal(self.id(), Signal::Kill);
        }
        if let Err(err) = self.child.wait() {
            log_debug(&format!("waitpid for daemon pid {} failed: {err}", self.id()));
        }
    }
}

pub(super) fn should_send_sigkill(
    kill_sent: bool,
    term_sent_at: Option<Instant>,
    now: Instant,
    grace: Duration,
) -> bool {
    if kill_sent {
        return false;
    }
    match term_sent_at {
        Some(start) => now.duration_since(start) >= grace,
        None => false,
    }
}

pub(super) enum Signal {
    Term,
    Kill,
}

pub(super) fn send_signal(pid: u32, signal: Signal) {
    let signo = match signal {
        Signal::Term => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
    };
    // SAFETY: kill only delivers a signal; pid belongs to a child this process spawned.
    if unsafe { libc::kill(pid as libc::pid_t, signo) } != 0 {
        log_debug(&format!(
            "failed to send signal {signo} to pid {pid}: {}",
            io::Error::last_os_error()
        ));
    }
}

/// Human-readable exit status for the operator log.
pub fn describe_exit(status: &ExitStatus) -> String {
    if let Some(code) = status.code() {
        format!("exit code {code}")
    } else if let Some(signal) = status.signal() {
        format!("signal {signal}")
    } else {
        "unknown status".to_string()
    }
}
