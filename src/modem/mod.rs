//! Voice-modem session engine: AT protocol, dial-tone pacing, digit detection and the
//! per-line state machine that answers calls.

pub mod at;
pub mod detector;
pub mod dialtone;
mod session;

#[cfg(test)]
pub(crate) mod test_support;

pub use at::{CommandChannel, Response};
pub use detector::{DialDetector, DigitFrame};
pub use dialtone::{waveform, DialToneSynth};
pub use session::{LineSettings, ModemSession, SessionState, SessionTimings};
