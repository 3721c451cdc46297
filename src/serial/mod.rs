//! Duplex byte stream to the modem.
//!
//! The session only sees [`ModemPort`]; [`SerialPort`] is the termios-backed
//! implementation used for real devices.

mod port;

#[cfg(test)]
mod tests;

use std::io;
use std::time::Duration;

pub use port::{baud_constant, SerialPort, SUPPORTED_RATES};

/// Byte-stream contract between the session and its device.
pub trait ModemPort {
    /// Wait at most `timeout` for input, then read once. `Ok(0)` means nothing arrived.
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    /// Write the whole buffer or fail.
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Discard input the device has sent but nobody has read yet.
    fn flush_input(&mut self) -> io::Result<()>;
}
