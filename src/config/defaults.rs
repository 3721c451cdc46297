pub const DEFAULT_RATE: u32 = 115_200;
pub const DEFAULT_DIGIT_SETTLE_MS: u64 = 500;
pub const DEFAULT_ANSWER_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_POLL_MS: u64 = 50;

pub const MIN_DIGIT_SETTLE_MS: u64 = 100;
pub const MAX_DIGIT_SETTLE_MS: u64 = 5_000;
pub const MIN_ANSWER_TIMEOUT_SECS: u64 = 5;
pub const MAX_ANSWER_TIMEOUT_SECS: u64 = 120;
pub const MIN_POLL_MS: u64 = 5;
pub const MAX_POLL_MS: u64 = 250;

/// Daemon names accepted without a path.
pub const DAEMON_ALLOWLIST: &[&str] = &["pppd"];

/// Upper bound on lines served by one process.
pub const MAX_DEVICES: usize = 32;
