use super::defaults::{
    DAEMON_ALLOWLIST, MAX_ANSWER_TIMEOUT_SECS, MAX_DEVICES, MAX_DIGIT_SETTLE_MS, MAX_POLL_MS,
    MIN_ANSWER_TIMEOUT_SECS, MIN_DIGIT_SETTLE_MS, MIN_POLL_MS,
};
use super::AppConfig;
use crate::modem::{LineSettings, SessionTimings};
use crate::serial::SUPPORTED_RATES;
use crate::supervisor::DaemonSupervisor;
use anyhow::{anyhow, bail, Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

impl AppConfig {
    /// Check CLI values and normalize the daemon path.
    pub fn validate(&mut self) -> Result<()> {
        if !SUPPORTED_RATES.contains(&self.rate) {
            bail!(
                "--rate must be one of {SUPPORTED_RATES:?}, got {}",
                self.rate
            );
        }

        if self.devices.is_empty() {
            bail!("at least one DEVICE is required");
        }
        if self.devices.len() > MAX_DEVICES {
            bail!(
                "too many devices (max {MAX_DEVICES}, got {})",
                self.devices.len()
            );
        }
        let mut seen = HashSet::new();
        for device in &self.devices {
            if device.trim().is_empty() {
                bail!("DEVICE must not be empty");
            }
            if device.contains('\0') {
                bail!("DEVICE '{}' contains a NUL byte", device.escape_debug());
            }
            if !seen.insert(device.as_str()) {
                bail!("DEVICE '{device}' given more than once");
            }
        }

        if !(MIN_DIGIT_SETTLE_MS..=MAX_DIGIT_SETTLE_MS).contains(&self.digit_settle_ms) {
            bail!(
                "--digit-settle-ms must be between {MIN_DIGIT_SETTLE_MS} and {MAX_DIGIT_SETTLE_MS}, got {}",
                self.digit_settle_ms
            );
        }
        if !(MIN_ANSWER_TIMEOUT_SECS..=MAX_ANSWER_TIMEOUT_SECS).contains(&self.answer_timeout_secs)
        {
            bail!(
                "--answer-timeout-secs must be between {MIN_ANSWER_TIMEOUT_SECS} and {MAX_ANSWER_TIMEOUT_SECS}, got {}",
                self.answer_timeout_secs
            );
        }
        if !(MIN_POLL_MS..=MAX_POLL_MS).contains(&self.poll_ms) {
            bail!(
                "--poll-ms must be between {MIN_POLL_MS} and {MAX_POLL_MS}, got {}",
                self.poll_ms
            );
        }
        if self.poll_ms >= self.digit_settle_ms {
            bail!(
                "--poll-ms ({}) must be shorter than --digit-settle-ms ({})",
                self.poll_ms,
                self.digit_settle_ms
            );
        }

        self.daemon = sanitize_binary(&self.daemon, "--daemon", DAEMON_ALLOWLIST)?;

        let options = self
            .daemon_options
            .to_str()
            .ok_or_else(|| anyhow!("--daemon-options must be valid UTF-8"))?;
        if options.trim().is_empty() {
            bail!("--daemon-options must not be empty");
        }
        if options.contains('\0') {
            bail!("--daemon-options contains a NUL byte");
        }

        Ok(())
    }

    /// Conversation timings derived from the CLI; everything else keeps its default.
    pub fn session_timings(&self) -> SessionTimings {
        SessionTimings {
            digit_settle: Duration::from_millis(self.digit_settle_ms),
            answer_timeout: Duration::from_secs(self.answer_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_ms),
            ..SessionTimings::default()
        }
    }

    /// One entry per configured device, in command-line order.
    pub fn lines(&self) -> Vec<LineSettings> {
        self.devices
            .iter()
            .map(|device| LineSettings {
                device: device.clone(),
                rate: self.rate,
            })
            .collect()
    }

    pub fn daemon_supervisor(&self) -> DaemonSupervisor {
        DaemonSupervisor::new(&self.daemon, &self.daemon_options)
    }
}

/// Allow either a known binary name or an absolute path.
pub(super) fn sanitize_binary(value: &str, flag: &str, allowlist: &[&str]) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!("{flag} cannot be empty");
    }
    if let Some(allowed) = allowlist
        .iter()
        .find(|candidate| candidate.eq_ignore_ascii_case(trimmed))
    {
        return Ok((*allowed).to_string());
    }

    let path = Path::new(trimmed);
    if path.is_absolute() || trimmed.contains(std::path::MAIN_SEPARATOR) {
        let canonical = path
            .canonicalize()
            .with_context(|| format!("failed to canonicalize {flag} '{trimmed}'"))?;
        let metadata = fs::metadata(&canonical)
            .with_context(|| format!("failed to inspect {flag} '{}'", canonical.display()))?;
        if !metadata.is_file() {
            bail!("{flag} '{}' is not a file", canonical.display());
        }
        use std::os::unix::fs::PermissionsExt;
        let mode = metadata.permissions().mode();
        if mode & 0o111 == 0 {
            bail!(
                "{flag} '{}' exists but is not executable (mode {:o})",
                canonical.display(),
                mode
            );
        }
        return canonical
            .to_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow!("{flag} must be valid UTF-8"));
    }

    bail!("{flag} must be one of {allowlist:?} or an existing binary path");
}
