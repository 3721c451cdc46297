//! Per-line state machine: offer a dial tone, wait for the caller to dial, answer, hand the
//! line to the daemon, reset, repeat.
//!
//! ```text
//! Idle -> OfferingDialTone -> DialDetected -> (tone stop) Idle -> Answering -> Connected -> Idle
//! ```
//!
//! Every failure of a cycle is recoverable: the session logs it with the modem's numeric
//! response, resets the modem and starts over. Only cancellation ends [`ModemSession::run`].

use super::at::{self, CommandChannel, Response, DLE, ETX};
use super::detector::{DialDetector, DEFAULT_DIGIT_SETTLE};
use super::dialtone::DialToneSynth;
use crate::error::SessionError;
use crate::logging::content_logging_enabled;
use crate::serial::ModemPort;
use crate::shutdown::{CancelToken, SessionSlot};
use crate::supervisor::{describe_exit, DaemonProcess, DaemonSupervisor};
use crate::log_debug;
use std::process::ExitStatus;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Configuration that puts the modem into voice transmit, in order, with expected replies.
const OFFER_SEQUENCE: [(&str, Response); 5] = [
    (at::CMD_AUTO_ANSWER_OFF, Response::OK),
    (at::CMD_VOICE_CLASS, Response::OK),
    (at::CMD_VOICE_LINE, Response::OK),
    (at::CMD_VOICE_FORMAT, Response::OK),
    (at::CMD_VOICE_TRANSMIT, Response::CONNECT),
];

/// Cold-start initialization. Replies are read but not checked: echo and verbosity are
/// unknown until these commands have run.
const RESET_SEQUENCE: [&str; 3] = [at::CMD_RESET, at::CMD_ECHO_OFF, at::CMD_VERBOSE_OFF];

const CANCEL_POLL_SLICE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    OfferingDialTone,
    DialDetected,
    Answering,
    Connected,
}

/// The line a session serves, as passed to the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineSettings {
    pub device: String,
    pub rate: u32,
}

/// Delays and deadlines of the modem conversation.
#[derive(Debug, Clone)]
pub struct SessionTimings {
    /// Deadline for a reply to an ordinary command.
    pub response_timeout: Duration,
    /// Silence the modem needs after `+++` before it accepts commands.
    pub escape_guard: Duration,
    /// Pause after `ATZ0` while the modem reloads its profile.
    pub reset_settle: Duration,
    /// Detector poll timeout; also bounds the gap between tone bursts.
    pub poll_interval: Duration,
    /// Silence after the last digit that ends dialing.
    pub digit_settle: Duration,
    /// Pause after `ATA` before listening for the connect result.
    pub answer_settle: Duration,
    /// Deadline for the connect result after `ATA`.
    pub answer_timeout: Duration,
    /// Pause before retrying after a failed cycle.
    pub retry_backoff: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_millis(1_000),
            escape_guard: Duration::from_millis(1_100),
            reset_settle: Duration::from_millis(1_000),
            poll_interval: Duration::from_millis(50),
            digit_settle: DEFAULT_DIGIT_SETTLE,
            answer_settle: Duration::from_millis(500),
            answer_timeout: Duration::from_secs(30),
            retry_backoff: Duration::from_secs(1),
        }
    }
}

/// One serial line and everything needed to serve calls on it.
pub struct ModemSession<P: ModemPort> {
    channel: CommandChannel<P>,
    state: SessionState,
    synth: DialToneSynth,
    detector: DialDetector,
    child: Option<DaemonProcess>,
    line: LineSettings,
    supervisor: DaemonSupervisor,
    timings: SessionTimings,
    slot: Arc<SessionSlot>,
    cancel: CancelToken,
    answer_immediately: bool,
}

impl<P: ModemPort> ModemSession<P> {
    pub fn new(
        port: P,
        line: LineSettings,
        supervisor: DaemonSupervisor,
        timings: SessionTimings,
        slot: Arc<SessionSlot>,
        cancel: CancelToken,
    ) -> Self {
        let channel = CommandChannel::new(
            port,
            line.device.clone(),
            timings.response_timeout,
            timings.escape_guard,
            cancel.clone(),
        );
        Self {
            channel,
            state: SessionState::Idle,
            synth: DialToneSynth::new(Instant::now()),
            detector: DialDetector::new(timings.digit_settle),
            child: None,
            line,
            supervisor,
            timings,
            slot,
            cancel,
            answer_immediately: false,
        }
    }

    /// Skip the dial tone and answer straight away on every cycle.
    pub fn answer_immediately(mut self, enabled: bool) -> Self {
        self.answer_immediately = enabled;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn line(&self) -> &LineSettings {
        &self.line
    }

    pub fn channel(&self) -> &CommandChannel<P> {
        &self.channel
    }

    pub fn synth(&self) -> &DialToneSynth {
        &self.synth
    }

    pub fn has_child(&self) -> bool {
        self.child.is_some()
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            log_debug(&format!(
                "{}: {:?} -> {:?}",
                self.line.device, self.state, next
            ));
        }
        self.state = next;
    }

    /// Return the modem to its cold-start configuration.
    pub fn reset_modem(&mut self) -> Result<(), SessionError> {
        for command in RESET_SEQUENCE {
            self.channel.send_command(command)?;
            if command == at::CMD_RESET {
                thread::sleep(self.timings.reset_settle);
            }
            let response = self.channel.await_response(self.timings.response_timeout)?;
            log_debug(&format!(
                "{}: {command} answered {response} during reset",
                self.line.device
            ));
        }
        self.channel.flush_input()?;
        self.transition(SessionState::Idle);
        Ok(())
    }

    /// Configure voice mode and start transmitting. Stops at the first unexpected reply.
    pub fn start_dialtone(&mut self) -> Result<(), SessionError> {
        debug_assert_eq!(self.state, SessionState::Idle);
        for (command, expected) in OFFER_SEQUENCE {
            self.channel.expect(command, expected)?;
        }
        self.synth.restart(Instant::now());
        self.detector.reset();
        self.transition(SessionState::OfferingDialTone);
        Ok(())
    }

    /// Stream the tone and listen for digits until the caller stops dialing.
    /// Returns the dialed digits.
    pub fn offer_until_dialed(&mut self) -> Result<String, SessionError> {
        while self.state == SessionState::OfferingDialTone {
            if self.cancel.is_cancelled() {
                return Err(SessionError::Cancelled);
            }
            self.synth.tick(Instant::now(), self.channel.port_mut())?;
            self.detector
                .poll(self.channel.port_mut(), self.timings.poll_interval)?;
            if self.detector.is_complete(Instant::now()) {
                self.transition(SessionState::DialDetected);
            }
        }
        Ok(self.detector.dialed().to_string())
    }

    fn end_voice_transmit(&mut self) -> Result<(), SessionError> {
        self.channel.write_raw(&[DLE, ETX])?;
        self.channel.send_escape()?;
        self.channel.expect(at::CMD_DATA_CLASS, Response::OK)
    }

    /// Leave voice mode and reset. The session is idle afterwards even when this fails.
    pub fn stop_dialtone(&mut self) -> Result<(), SessionError> {
        let stopped = self.end_voice_transmit();
        self.transition(SessionState::Idle);
        match stopped {
            Ok(()) => self.reset_modem(),
            Err(err) => {
                if let Err(reset_err) = self.reset_modem() {
                    log_debug(&format!(
                        "{}: reset after failed tone stop also failed: {reset_err}",
                        self.line.device
                    ));
                }
                Err(err)
            }
        }
    }

    fn negotiate_answer(&mut self) -> Result<(), SessionError> {
        self.channel.expect(at::CMD_MONITOR, Response::OK)?;
        self.channel.send_command(at::CMD_ANSWER)?;
        thread::sleep(self.timings.answer_settle);
        let response = self.channel.await_response(self.timings.answer_timeout)?;
        if response != Response::CONNECT {
            return Err(SessionError::Protocol {
                command: at::CMD_ANSWER,
                response,
                expected: Response::CONNECT,
            });
        }
        Ok(())
    }

    /// Answer the call and start the daemon on a connect; anything else returns to idle.
    pub fn answer(&mut self) -> Result<(), SessionError> {
        self.transition(SessionState::Answering);
        if let Err(err) = self.negotiate_answer() {
            self.transition(SessionState::Idle);
            return Err(err);
        }
        match self.supervisor.spawn(&self.line) {
            Ok(process) => {
                info!(
                    device = %self.line.device,
                    pid = process.id(),
                    daemon = %self.supervisor.daemon().display(),
                    "call connected; daemon started"
                );
                self.slot.attach_child(process.id());
                self.child = Some(process);
                self.transition(SessionState::Connected);
                Ok(())
            }
            Err(err) => {
                self.transition(SessionState::Idle);
                Err(err)
            }
        }
    }

    /// Block until the daemon exits (or is told to), then reset the modem.
    pub fn supervise(&mut self) -> Result<Option<ExitStatus>, SessionError> {
        let Some(mut process) = self.child.take() else {
            self.transition(SessionState::Idle);
            return Ok(None);
        };
        let slot = Arc::clone(&self.slot);
        let cancel = self.cancel.clone();
        let waited = process.wait(|| slot.termination_requested() || cancel.is_cancelled());
        let uptime = process.uptime();
        drop(process);
        self.slot.detach_child();
        let status = waited.map_err(SessionError::Supervise)?;
        info!(
            device = %self.line.device,
            status = %describe_exit(&status),
            uptime_secs = uptime.as_secs(),
            "daemon exited"
        );
        self.reset_modem()?;
        Ok(Some(status))
    }

    /// One pass from idle back to idle.
    pub fn run_cycle(&mut self) -> Result<(), SessionError> {
        if !self.answer_immediately {
            self.start_dialtone()?;
            let dialed = self.offer_until_dialed()?;
            if content_logging_enabled() {
                info!(device = %self.line.device, %dialed, "caller finished dialing");
            } else {
                info!(device = %self.line.device, digits = dialed.len(), "caller finished dialing");
            }
            self.stop_dialtone()?;
        }
        self.answer()?;
        self.supervise()?;
        Ok(())
    }

    /// Serve calls until the cancel token fires.
    pub fn run(&mut self) {
        info!(device = %self.line.device, rate = self.line.rate, "line ready");
        if let Err(err) = self.reset_modem() {
            self.report(&err);
        }
        while !self.cancel.is_cancelled() {
            match self.run_cycle() {
                Ok(()) => {}
                Err(SessionError::Cancelled) => break,
                Err(err) => {
                    self.report(&err);
                    self.recover();
                    self.sleep_unless_cancelled(self.timings.retry_backoff);
                }
            }
        }
        if self.state != SessionState::Idle {
            self.recover();
        }
        info!(device = %self.line.device, "line stopped");
    }

    fn report(&self, err: &SessionError) {
        let device = &self.line.device;
        match err {
            SessionError::Spawn { .. } | SessionError::Supervise(_) => {
                error!(device = %device, error = %err, "call attempt failed")
            }
            _ => match err.response_code() {
                Some(code) => warn!(device = %device, code, error = %err, "modem step failed"),
                None => warn!(device = %device, error = %err, "modem step failed"),
            },
        }
    }

    /// Best-effort return to a known modem state after a failed cycle.
    fn recover(&mut self) {
        if matches!(
            self.state,
            SessionState::OfferingDialTone | SessionState::DialDetected
        ) {
            if let Err(err) = self.end_voice_transmit() {
                log_debug(&format!(
                    "{}: tone stop during recovery failed: {err}",
                    self.line.device
                ));
            }
        }
        if let Err(err) = self.reset_modem() {
            warn!(device = %self.line.device, error = %err, "modem reset failed");
        }
        self.transition(SessionState::Idle);
    }

    fn sleep_unless_cancelled(&self, total: Duration) {
        let deadline = Instant::now() + total;
        while !self.cancel.is_cancelled() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(CANCEL_POLL_SLICE));
        }
    }
}

#[cfg(test)]
impl<P: ModemPort> ModemSession<P> {
    pub(crate) fn port_mut(&mut self) -> &mut P {
        self.channel.port_mut()
    }
}
