//! Command-line parsing and validation helpers.

mod defaults;
mod validation;

use clap::Parser;
use std::path::PathBuf;

pub use defaults::{
    DEFAULT_ANSWER_TIMEOUT_SECS, DEFAULT_DIGIT_SETTLE_MS, DEFAULT_POLL_MS, DEFAULT_RATE,
};

/// CLI options for the dial-in answering service. Validated values are safe to hand to the
/// daemon's argv.
#[derive(Debug, Parser, Clone)]
#[command(
    name = "dialin",
    about = "Answer calls on voice modems with a dial tone and hand them to pppd",
    author,
    version
)]
pub struct AppConfig {
    /// Serial devices with a voice modem attached (one session per device)
    #[arg(value_name = "DEVICE", required = true)]
    pub devices: Vec<String>,

    /// Line rate in bits per second
    #[arg(short = 'r', long = "rate", default_value_t = DEFAULT_RATE)]
    pub rate: u32,

    /// Daemon started on an answered line
    #[arg(
        short = 'd',
        long = "daemon",
        env = "DIALIN_DAEMON",
        default_value = crate::supervisor::DEFAULT_DAEMON
    )]
    pub daemon: String,

    /// Options file passed to the daemon with `file`
    #[arg(long = "daemon-options", default_value = crate::supervisor::DEFAULT_DAEMON_OPTIONS)]
    pub daemon_options: PathBuf,

    /// Answer immediately instead of offering a dial tone first
    #[arg(short = 'a', long = "answer-now", default_value_t = false)]
    pub answer_now: bool,

    /// Silence after the last digit that ends dialing (milliseconds)
    #[arg(long = "digit-settle-ms", default_value_t = DEFAULT_DIGIT_SETTLE_MS)]
    pub digit_settle_ms: u64,

    /// How long to wait for a carrier after ATA (seconds)
    #[arg(long = "answer-timeout-secs", default_value_t = DEFAULT_ANSWER_TIMEOUT_SECS)]
    pub answer_timeout_secs: u64,

    /// Digit poll interval while the dial tone plays (milliseconds)
    #[arg(long = "poll-ms", default_value_t = DEFAULT_POLL_MS)]
    pub poll_ms: u64,

    /// Enable the protocol trace log
    #[arg(long = "logs", env = "DIALIN_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all file logging (overrides --logs and log env vars)
    #[arg(long = "no-logs", env = "DIALIN_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,

    /// Allow dialed digits in the logs
    #[arg(long = "log-content", env = "DIALIN_LOG_CONTENT", default_value_t = false)]
    pub log_content: bool,

    /// Emit operator logs on stderr as JSON lines
    #[arg(long = "json-logs", default_value_t = false)]
    pub json_logs: bool,
}

#[cfg(test)]
impl AppConfig {
    pub(crate) fn for_tests() -> Self {
        Self::parse_from(["dialin", "/dev/ttyS0"])
    }
}
