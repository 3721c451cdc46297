use super::at::DLE;
use crate::logging::printable_bytes;
use crate::serial::ModemPort;
use crate::{log_debug, log_debug_content};
use std::io;
use std::time::{Duration, Instant};

/// Quiet time after the last digit that ends dialing.
pub const DEFAULT_DIGIT_SETTLE: Duration = Duration::from_millis(500);

/// A `DLE <digit>` event reported by the modem's DTMF decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigitFrame {
    pub digit: char,
}

/// Recognize a digit frame; anything else is noise.
pub fn parse_frame(bytes: &[u8]) -> Option<DigitFrame> {
    match bytes {
        [DLE, digit] if digit.is_ascii_digit() => Some(DigitFrame {
            digit: *digit as char,
        }),
        _ => None,
    }
}

/// Debounce over digit frames. There is no end-of-dial event, only silence.
#[derive(Debug)]
pub struct DialDetector {
    settle: Duration,
    last_digit: Option<Instant>,
    dialed: String,
}

impl DialDetector {
    pub fn new(settle: Duration) -> Self {
        Self {
            settle,
            last_digit: None,
            dialed: String::new(),
        }
    }

    /// Wait up to `timeout` for one frame. A stray byte ahead of a `DLE` is dropped and the
    /// frame completed with one more read, so noise never shifts the framing.
    pub fn poll<P: ModemPort + ?Sized>(
        &mut self,
        port: &mut P,
        timeout: Duration,
    ) -> io::Result<Option<DigitFrame>> {
        let mut raw = [0u8; 2];
        let mut n = port.read_timeout(&mut raw, timeout)?;
        if n == 2 && raw[0] != DLE && raw[1] == DLE {
            log_debug(&format!("discarding noise {}", printable_bytes(&raw[..1])));
            raw[0] = DLE;
            n = 1;
        }
        if n == 1 && raw[0] == DLE {
            n += port.read_timeout(&mut raw[1..], timeout)?;
        }
        let bytes = &raw[..n];
        match parse_frame(bytes) {
            Some(frame) => {
                self.record(frame, Instant::now());
                Ok(Some(frame))
            }
            None => {
                if !bytes.is_empty() {
                    log_debug(&format!("discarding noise {}", printable_bytes(bytes)));
                }
                Ok(None)
            }
        }
    }

    pub fn record(&mut self, frame: DigitFrame, at: Instant) {
        self.last_digit = Some(at);
        self.dialed.push(frame.digit);
        log_debug_content(&format!("digit {} (dialed so far: {})", frame.digit, self.dialed));
    }

    pub fn dialing_in_progress(&self) -> bool {
        self.last_digit.is_some()
    }

    /// True once a digit was heard and more than the settle time has passed since.
    pub fn is_complete(&self, now: Instant) -> bool {
        self.last_digit
            .is_some_and(|last| now.saturating_duration_since(last) > self.settle)
    }

    pub fn dialed(&self) -> &str {
        &self.dialed
    }

    pub fn reset(&mut self) {
        self.last_digit = None;
        self.dialed.clear();
    }
}
