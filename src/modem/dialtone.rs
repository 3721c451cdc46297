//! Dial-tone waveform and the wall-clock pacing that streams it during voice transmit.
//!
//! The modem plays 8-bit unsigned PCM at 8000 samples/s (`AT+VSM=1,8000`). Output is paced
//! one byte per second faster than that so the modem's playback buffer never runs dry.

use crate::serial::ModemPort;
use std::f32::consts::PI;
use std::io;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Sample rate the modem consumes in voice mode.
pub const NOMINAL_SAMPLE_RATE: u32 = 8_000;

/// Bytes per second written to the modem.
pub const OUTPUT_BYTE_RATE: u64 = NOMINAL_SAMPLE_RATE as u64 + 1;

/// North American precise dial tone.
const DIAL_TONE_FREQS: [f32; 2] = [350.0, 440.0];

/// 100 ms of audio: 35 cycles of 350 Hz and 44 of 440 Hz, so the buffer loops without a seam.
pub const WAVEFORM_LEN: usize = 800;

/// Peak deviation of each tone in 8-bit steps. Two tones peak at 96, keeping samples in 32..=224.
const TONE_AMPLITUDE: f32 = 48.0;

const SILENCE_LEVEL: f32 = 128.0;

static WAVEFORM: OnceLock<Box<[u8]>> = OnceLock::new();

/// The process-wide dial-tone buffer.
pub fn waveform() -> &'static [u8] {
    WAVEFORM.get_or_init(build_waveform)
}

fn build_waveform() -> Box<[u8]> {
    let sample_rate = NOMINAL_SAMPLE_RATE as f32;
    (0..WAVEFORM_LEN)
        .map(|n| {
            let t = n as f32 / sample_rate;
            let mix: f32 = DIAL_TONE_FREQS
                .iter()
                .map(|freq| (2.0 * PI * freq * t).sin())
                .sum();
            (SILENCE_LEVEL + mix * TONE_AMPLITUDE)
                .round()
                .clamp(0.0, 255.0) as u8
        })
        .collect()
}

/// Number of bytes owed for `elapsed` wall-clock time.
pub fn bytes_due(elapsed: Duration) -> usize {
    (elapsed.as_micros() * OUTPUT_BYTE_RATE as u128 / 1_000_000) as usize
}

/// Streams a looping waveform, sized by the time since the previous tick.
pub struct DialToneSynth {
    waveform: &'static [u8],
    cursor: usize,
    last_send: Instant,
}

impl DialToneSynth {
    pub fn new(now: Instant) -> Self {
        Self::with_waveform(waveform(), now)
    }

    /// An empty `waveform` produces silence: `tick` writes nothing.
    pub fn with_waveform(waveform: &'static [u8], now: Instant) -> Self {
        Self {
            waveform,
            cursor: 0,
            last_send: now,
        }
    }

    /// Rewind to the start of the buffer and restart the clock.
    pub fn restart(&mut self, now: Instant) {
        self.cursor = 0;
        self.last_send = now;
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Write the bytes due since the last tick. The clock always advances to `now`.
    pub fn tick<P: ModemPort + ?Sized>(&mut self, now: Instant, port: &mut P) -> io::Result<usize> {
        let elapsed = now.saturating_duration_since(self.last_send);
        self.last_send = now;
        let due = bytes_due(elapsed);
        let len = self.waveform.len();
        if len == 0 {
            return Ok(0);
        }
        let mut remaining = due;
        while remaining > 0 {
            let chunk = remaining.min(len - self.cursor);
            port.write_all(&self.waveform[self.cursor..self.cursor + chunk])?;
            self.cursor = (self.cursor + chunk) % len;
            remaining -= chunk;
        }
        Ok(due)
    }
}
