//! Hayes AT command exchange with numeric result codes (`ATV` mode).

use crate::error::SessionError;
use crate::logging::printable_bytes;
use crate::serial::ModemPort;
use crate::shutdown::CancelToken;
use crate::log_debug;
use std::fmt;
use std::io;
use std::thread;
use std::time::{Duration, Instant};

pub const CMD_RESET: &str = "ATZ0";
pub const CMD_ECHO_OFF: &str = "ATE";
pub const CMD_VERBOSE_OFF: &str = "ATV";
pub const CMD_AUTO_ANSWER_OFF: &str = "ATH";
pub const CMD_VOICE_CLASS: &str = "AT+FCLASS=8";
pub const CMD_DATA_CLASS: &str = "AT+FCLASS=0";
pub const CMD_VOICE_LINE: &str = "AT+VLS=1";
pub const CMD_VOICE_FORMAT: &str = "AT+VSM=1,8000";
pub const CMD_VOICE_TRANSMIT: &str = "AT+VTX";
pub const CMD_MONITOR: &str = "ATM1";
pub const CMD_ANSWER: &str = "ATA";

/// Data-link escape; prefixes in-band events from the modem in voice mode.
pub const DLE: u8 = 0x10;
/// End of text; `DLE ETX` ends voice transmit.
pub const ETX: u8 = 0x03;

const ESCAPE_SEQUENCE: &[u8] = b"+++";
const ESCAPE_LABEL: &str = "+++";
const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Longest single wait inside `await_response`; bounds how late a shutdown is noticed.
const CANCEL_POLL_SLICE: Duration = Duration::from_millis(100);

/// A numeric result code, or no parsable reply within the deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Code(i32),
    Timeout,
}

impl Response {
    pub const OK: Response = Response::Code(0);
    pub const CONNECT: Response = Response::Code(1);
    pub const NO_CARRIER: Response = Response::Code(3);
    pub const ERROR: Response = Response::Code(4);

    /// Numeric form used in logs; a timeout is `-1`.
    pub fn code(self) -> i32 {
        match self {
            Response::Code(code) => code,
            Response::Timeout => -1,
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Code(code) => write!(f, "{code}"),
            Response::Timeout => f.write_str("timeout (-1)"),
        }
    }
}

/// Parse the leading integer of a reply, skipping leading whitespace.
pub fn parse_response(raw: &[u8]) -> Response {
    let text = String::from_utf8_lossy(raw);
    let trimmed = text.trim_start();
    let (negative, rest) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let end = rest
        .find(|ch: char| !ch.is_ascii_digit())
        .unwrap_or(rest.len());
    match rest[..end].parse::<i32>() {
        Ok(value) if negative => Response::Code(-value),
        Ok(value) => Response::Code(value),
        Err(_) => Response::Timeout,
    }
}

/// Strictly sequential command/response channel that owns the line's transport.
pub struct CommandChannel<P: ModemPort> {
    port: P,
    device: String,
    response_timeout: Duration,
    escape_guard: Duration,
    cancel: CancelToken,
}

impl<P: ModemPort> CommandChannel<P> {
    pub fn new(
        port: P,
        device: impl Into<String>,
        response_timeout: Duration,
        escape_guard: Duration,
        cancel: CancelToken,
    ) -> Self {
        Self {
            port,
            device: device.into(),
            response_timeout,
            escape_guard,
            cancel,
        }
    }

    /// Raw access for the tone and digit paths, which bypass the command framing.
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// Send one command line.
    pub fn send_command(&mut self, text: &str) -> io::Result<()> {
        log_debug(&format!("{} -> {text}", self.device));
        let mut line = Vec::with_capacity(text.len() + LINE_TERMINATOR.len());
        line.extend_from_slice(text.as_bytes());
        line.extend_from_slice(LINE_TERMINATOR);
        self.port.write_all(&line)
    }

    /// Wait until `timeout` elapses for the first non-blank reply and parse its code.
    pub fn await_response(&mut self, timeout: Duration) -> io::Result<Response> {
        let deadline = Instant::now() + timeout;
        let mut raw = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let slice = (deadline - now).min(CANCEL_POLL_SLICE);
            let n = self.port.read_timeout(&mut buf, slice)?;
            raw.extend_from_slice(&buf[..n]);
            if raw.iter().any(|byte| !byte.is_ascii_whitespace()) {
                break;
            }
        }
        let response = parse_response(&raw);
        log_debug(&format!(
            "{} <- {} ({response})",
            self.device,
            printable_bytes(&raw)
        ));
        Ok(response)
    }

    /// Send `command` and require `expected` back; resynchronize input on success.
    pub fn expect(
        &mut self,
        command: &'static str,
        expected: Response,
    ) -> Result<(), SessionError> {
        self.send_command(command)?;
        let response = self.await_response(self.response_timeout)?;
        if response != expected {
            return Err(SessionError::Protocol {
                command,
                response,
                expected,
            });
        }
        self.port.flush_input()?;
        Ok(())
    }

    /// Drop from online/voice mode back to command mode with `+++` and the guard time.
    pub fn send_escape(&mut self) -> Result<(), SessionError> {
        log_debug(&format!("{} -> {ESCAPE_LABEL}", self.device));
        self.port.write_all(ESCAPE_SEQUENCE)?;
        thread::sleep(self.escape_guard);
        let response = self.await_response(self.response_timeout)?;
        if response != Response::OK {
            return Err(SessionError::Protocol {
                command: ESCAPE_LABEL,
                response,
                expected: Response::OK,
            });
        }
        Ok(())
    }

    /// Write raw bytes outside the command framing.
    pub fn write_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        log_debug(&format!("{} -> {}", self.device, printable_bytes(bytes)));
        self.port.write_all(bytes)
    }

    pub fn flush_input(&mut self) -> io::Result<()> {
        self.port.flush_input()
    }
}
