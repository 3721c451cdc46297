//! In-memory modem that answers commands from a script.

use super::at::{DLE, ETX};
use super::SessionTimings;
use crate::serial::ModemPort;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::thread;
use std::time::Duration;

/// Label recorded for a `DLE ETX` write.
pub(crate) const END_OF_VOICE: &str = "<DLE><ETX>";
pub(crate) const ESCAPE: &str = "+++";

/// Timings short enough for unit tests; no settle or guard delays.
pub(crate) fn fast_timings() -> SessionTimings {
    SessionTimings {
        response_timeout: Duration::from_millis(20),
        escape_guard: Duration::ZERO,
        reset_settle: Duration::ZERO,
        poll_interval: Duration::from_millis(2),
        digit_settle: Duration::from_millis(30),
        answer_settle: Duration::ZERO,
        answer_timeout: Duration::from_millis(40),
        retry_backoff: Duration::ZERO,
    }
}

/// Scripted replies keyed by command text. Commands without a script answer `0` (OK),
/// except `AT+VTX` and `ATA`, which answer `1` (CONNECT).
#[derive(Debug, Default)]
pub(crate) struct ScriptedPort {
    replies: HashMap<String, Option<Vec<u8>>>,
    pending: VecDeque<u8>,
    on_first_audio: Option<Vec<u8>>,
    fail_write: Option<String>,
    line_down: bool,
    pub(crate) commands: Vec<String>,
    pub(crate) audio: Vec<u8>,
    pub(crate) flushes: usize,
}

impl ScriptedPort {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Answer `command` with `bytes`.
    pub(crate) fn reply(mut self, command: &str, bytes: &[u8]) -> Self {
        self.replies.insert(command.to_string(), Some(bytes.to_vec()));
        self
    }

    /// Never answer `command`.
    pub(crate) fn silent(mut self, command: &str) -> Self {
        self.replies.insert(command.to_string(), None);
        self
    }

    /// Input that shows up once the first audio byte was written.
    pub(crate) fn after_first_audio(mut self, bytes: &[u8]) -> Self {
        self.on_first_audio = Some(bytes.to_vec());
        self
    }

    /// Fail the write of `command` (and every later write) as if the line dropped.
    pub(crate) fn fail_write(mut self, command: &str) -> Self {
        self.fail_write = Some(command.to_string());
        self
    }

    pub(crate) fn push_input(&mut self, bytes: &[u8]) {
        self.pending.extend(bytes);
    }

    fn default_reply(command: &str) -> &'static [u8] {
        match command {
            "AT+VTX" | "ATA" => b"1\r",
            _ => b"0\r",
        }
    }

    fn record_command(&mut self, command: String) {
        let reply = match self.replies.get(&command) {
            Some(Some(bytes)) => Some(bytes.clone()),
            Some(None) => None,
            None => Some(Self::default_reply(&command).to_vec()),
        };
        if let Some(bytes) = reply {
            self.pending.extend(bytes);
        }
        self.commands.push(command);
    }

    /// Commands in the order they were written, up to and including the first `until`.
    pub(crate) fn commands_until(&self, until: &str) -> Vec<&str> {
        let mut out = Vec::new();
        for command in &self.commands {
            out.push(command.as_str());
            if command == until {
                break;
            }
        }
        out
    }
}

impl ModemPort for ScriptedPort {
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        if self.pending.is_empty() {
            thread::sleep(timeout);
            return Ok(0);
        }
        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        if let Some(command) = &self.fail_write {
            if bytes.starts_with(command.as_bytes()) {
                self.line_down = true;
            }
        }
        if self.line_down {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        if bytes == ESCAPE.as_bytes() {
            self.record_command(ESCAPE.to_string());
        } else if bytes == [DLE, ETX] {
            self.commands.push(END_OF_VOICE.to_string());
        } else if let Some(text) = bytes.strip_suffix(b"\r\n") {
            self.record_command(String::from_utf8_lossy(text).into_owned());
        } else {
            if self.audio.is_empty() {
                if let Some(input) = self.on_first_audio.take() {
                    self.pending.extend(input);
                }
            }
            self.audio.extend_from_slice(bytes);
        }
        Ok(())
    }

    fn flush_input(&mut self) -> io::Result<()> {
        self.pending.clear();
        self.flushes += 1;
        Ok(())
    }
}
