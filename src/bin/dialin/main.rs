//! Dial-in answering service entrypoint.
//!
//! Opens every configured line, runs one session thread per line and keeps signal handling
//! on the main thread:
//!
//! - SIGHUP terminates every running daemon; lines return to offering a dial tone.
//! - SIGINT/SIGTERM terminate every daemon, stop every session and exit.

use clap::Parser;
use crossbeam_channel::{unbounded, RecvTimeoutError};
use dialin::config::AppConfig;
use dialin::modem::ModemSession;
use dialin::serial::SerialPort;
use dialin::shutdown::{
    install_signal_handlers, take_hangup, take_interrupt, CancelToken, SessionRegistry,
    ShutdownCoordinator, ShutdownKind,
};
use dialin::supervisor::TERMINATE_GRACE;
use dialin::telemetry::init_tracing;
use dialin::{init_logging, install_panic_hook, log_debug, log_file_path};
use std::process::ExitCode;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{error, info, warn};

const EXIT_INVALID_CONFIG: u8 = 2;

/// How often the main thread looks at the signal flags.
const SIGNAL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long the coordinator waits for sessions to reap their daemons.
const CHILD_SHUTDOWN_WAIT: Duration = TERMINATE_GRACE.saturating_add(Duration::from_secs(2));

fn main() -> ExitCode {
    let mut config = AppConfig::parse();
    init_logging(&config);
    init_tracing(&config);
    install_panic_hook();

    if let Err(err) = config.validate() {
        error!(error = %format!("{err:#}"), "invalid configuration");
        return ExitCode::from(EXIT_INVALID_CONFIG);
    }
    log_debug(&format!(
        "dialin {} starting; trace log at {}",
        env!("CARGO_PKG_VERSION"),
        log_file_path().display()
    ));

    let lines = config.lines();
    let mut ports = Vec::with_capacity(lines.len());
    for line in &lines {
        match SerialPort::open(&line.device, line.rate) {
            Ok(port) => ports.push(port),
            Err(err) => {
                error!(device = %line.device, error = %err, "failed to open line");
                return ExitCode::from(err.exit_code());
            }
        }
    }

    if let Err(err) = install_signal_handlers() {
        error!(error = %err, "failed to install signal handlers");
        return ExitCode::FAILURE;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        lines = lines.len(),
        rate = config.rate,
        daemon = %config.daemon,
        answer_now = config.answer_now,
        "dialin starting"
    );

    let registry = Arc::new(SessionRegistry::new());
    let cancel = CancelToken::new();
    let supervisor = config.daemon_supervisor();
    let timings = config.session_timings();
    let (exit_tx, exit_rx) = unbounded::<String>();

    let mut workers: Vec<JoinHandle<()>> = Vec::with_capacity(lines.len());
    for (port, line) in ports.into_iter().zip(lines) {
        let slot = registry.register(line.device.clone());
        let device = line.device.clone();
        let mut session = ModemSession::new(
            port,
            line,
            supervisor.clone(),
            timings.clone(),
            slot,
            cancel.clone(),
        )
        .answer_immediately(config.answer_now);
        let exit_tx = exit_tx.clone();
        let spawned = thread::Builder::new()
            .name(format!("line {device}"))
            .spawn(move || {
                session.run();
                let _ = exit_tx.send(device);
            });
        match spawned {
            Ok(handle) => workers.push(handle),
            Err(err) => {
                error!(error = %err, "failed to start session thread");
                cancel.cancel();
                break;
            }
        }
    }
    drop(exit_tx);

    let coordinator =
        ShutdownCoordinator::new(Arc::clone(&registry), cancel.clone(), CHILD_SHUTDOWN_WAIT);
    while !workers.iter().all(JoinHandle::is_finished) {
        if take_interrupt() {
            info!("interrupt received; shutting down");
            coordinator.handle(ShutdownKind::Interrupt);
        }
        if take_hangup() {
            info!("hangup received; terminating daemons");
            coordinator.handle(ShutdownKind::Hangup);
        }
        match exit_rx.recv_timeout(SIGNAL_POLL_INTERVAL) {
            Ok(device) => {
                if !cancel.is_cancelled() {
                    warn!(device = %device, "line stopped before shutdown");
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => thread::sleep(SIGNAL_POLL_INTERVAL),
        }
    }

    let mut panicked = 0usize;
    for worker in workers {
        if worker.join().is_err() {
            panicked += 1;
        }
    }
    if panicked > 0 {
        error!(panicked, "session threads panicked");
        return ExitCode::FAILURE;
    }
    info!("dialin stopped");
    ExitCode::SUCCESS
}
