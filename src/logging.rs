//! Protocol trace log and crash log.
//!
//! Operator-facing events go through `tracing` (see `telemetry`). This module keeps the
//! byte-level modem conversation out of the operator log: every AT command, reply and
//! discarded noise frame lands in a size-capped file that is only written with `--logs`.

use crate::config::AppConfig;
use std::{
    env, fs,
    io::{self, Write},
    panic,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex, OnceLock,
    },
    time::{SystemTime, UNIX_EPOCH},
};

const LOG_MAX_BYTES: u64 = 5 * 1024 * 1024;
const CRASH_LOG_MAX_BYTES: u64 = 256 * 1024;
static LOG_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_CONTENT_ENABLED: AtomicBool = AtomicBool::new(false);
static CRASH_LOG_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_STATE: OnceLock<Mutex<LogState>> = OnceLock::new();
static PANIC_HOOK_INSTALLED: OnceLock<()> = OnceLock::new();

/// Path of the protocol trace log. `DIALIN_LOG_PATH` overrides the temp-dir default.
pub fn log_file_path() -> PathBuf {
    env::var("DIALIN_LOG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| env::temp_dir().join("dialin.log"))
}

/// Path to the crash log file (metadata only).
pub fn crash_log_path() -> PathBuf {
    env::temp_dir().join("dialin_crash.log")
}

/// Open `path` for appending, starting it over when `incoming` more bytes would pass
/// `cap`. Returns the file and its length after the open.
fn open_capped(path: &Path, incoming: usize, cap: u64) -> io::Result<(fs::File, u64)> {
    let existing = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    let restart = existing.saturating_add(incoming as u64) > cap;
    let mut options = fs::OpenOptions::new();
    options.create(true);
    if restart {
        options.write(true).truncate(true);
    } else {
        options.append(true);
    }
    let file = options.open(path)?;
    Ok((file, if restart { 0 } else { existing }))
}

/// Size-capped trace file; the handle is reopened lazily after a failed write.
struct TraceFile {
    path: PathBuf,
    cap: u64,
    open: Option<(fs::File, u64)>,
}

impl TraceFile {
    fn new(path: PathBuf, cap: u64) -> Self {
        Self {
            path,
            cap,
            open: None,
        }
    }

    fn append(&mut self, line: &str) -> io::Result<()> {
        let incoming = line.len() as u64;
        let (mut file, len) = match self.open.take() {
            Some((file, len)) if len.saturating_add(incoming) <= self.cap => (file, len),
            _ => open_capped(&self.path, line.len(), self.cap)?,
        };
        file.write_all(line.as_bytes())?;
        self.open = Some((file, len + incoming));
        Ok(())
    }
}

#[derive(Default)]
struct LogState {
    trace: Option<TraceFile>,
}

fn log_state() -> &'static Mutex<LogState> {
    LOG_STATE.get_or_init(|| Mutex::new(LogState::default()))
}

/// Configure the trace log from CLI flags. `--no-logs` always wins.
pub fn init_logging(config: &AppConfig) {
    let enabled = config.logs && !config.no_logs;
    set_logging(enabled, enabled && config.log_content);
}

fn set_logging(enabled: bool, content_enabled: bool) {
    LOG_ENABLED.store(enabled, Ordering::Relaxed);
    LOG_CONTENT_ENABLED.store(content_enabled, Ordering::Relaxed);
    CRASH_LOG_ENABLED.store(enabled, Ordering::Relaxed);

    let mut state = log_state()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    state.trace = enabled.then(|| TraceFile::new(log_file_path(), LOG_MAX_BYTES));
}

/// Whether caller-identifying content (dialed digits) may be written to logs.
pub fn content_logging_enabled() -> bool {
    LOG_CONTENT_ENABLED.load(Ordering::Relaxed)
}

/// Append one line to the trace log.
pub fn log_debug(msg: &str) {
    if !LOG_ENABLED.load(Ordering::Relaxed) {
        return;
    }
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let line = format!("[{timestamp}] {msg}\n");
    let mut state = log_state()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(trace) = state.trace.as_mut() {
        let _ = trace.append(&line);
    }
}

/// Trace lines that carry caller content such as dialed digits.
pub fn log_debug_content(msg: &str) {
    if !content_logging_enabled() {
        return;
    }
    log_debug(msg);
}

/// Render raw modem bytes for the trace log, escaping control characters.
pub fn printable_bytes(bytes: &[u8]) -> String {
    bytes.escape_ascii().to_string()
}

/// Write a minimal crash log entry, omitting the payload unless content logging is on.
pub fn log_panic(info: &panic::PanicHookInfo<'_>) {
    if !CRASH_LOG_ENABLED.load(Ordering::Relaxed) {
        return;
    }

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let location = info
        .location()
        .map(|loc| format!("{}:{}", loc.file(), loc.line()))
        .unwrap_or_else(|| "unknown".to_string());

    let payload = if content_logging_enabled() {
        if let Some(text) = info.payload().downcast_ref::<&str>() {
            (*text).to_string()
        } else if let Some(text) = info.payload().downcast_ref::<String>() {
            text.clone()
        } else {
            "non-string panic payload".to_string()
        }
    } else {
        "panic payload omitted (log-content disabled)".to_string()
    };

    let line = format!(
        "[{timestamp}] panic at {location}: {payload} (v{})\n",
        env!("CARGO_PKG_VERSION")
    );
    if let Ok((mut file, _)) = open_capped(&crash_log_path(), line.len(), CRASH_LOG_MAX_BYTES) {
        let _ = file.write_all(line.as_bytes());
    }
}

/// Chain a crash-log writer in front of the existing panic hook. Idempotent.
pub fn install_panic_hook() {
    PANIC_HOOK_INSTALLED.get_or_init(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            log_panic(info);
            previous(info);
        }));
    });
}

#[cfg(test)]
pub(crate) fn set_logging_for_tests(enabled: bool, content_enabled: bool) {
    set_logging(enabled, content_enabled);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn printable_bytes_escapes_control_characters() {
        assert_eq!(printable_bytes(b"0\r\n"), "0\\r\\n");
        assert_eq!(printable_bytes(&[0x10, b'5']), "\\x105");
    }

    fn scratch_path(tag: &str) -> PathBuf {
        env::temp_dir().join(format!("dialin-trace-{tag}-{}.log", std::process::id()))
    }

    #[test]
    fn trace_file_starts_over_past_its_cap() {
        let path = scratch_path("cap");
        let _ = fs::remove_file(&path);
        let mut trace = TraceFile::new(path.clone(), 32);
        trace.append("first line ~~~~\n").expect("append");
        trace.append("second line ~~~\n").expect("append");
        assert_eq!(fs::read_to_string(&path).expect("read").lines().count(), 2);

        trace.append("third line ~~~~\n").expect("append");
        assert_eq!(fs::read_to_string(&path).expect("read"), "third line ~~~~\n");
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn oversized_leftover_log_is_replaced_on_first_write() {
        let path = scratch_path("leftover");
        fs::write(&path, vec![b'x'; 64]).expect("seed");
        let mut trace = TraceFile::new(path.clone(), 32);
        trace.append("fresh\n").expect("append");
        assert_eq!(fs::read_to_string(&path).expect("read"), "fresh\n");

        fs::write(&path, "kept\n").expect("seed");
        let mut trace = TraceFile::new(path.clone(), 32);
        trace.append("more\n").expect("append");
        assert_eq!(fs::read_to_string(&path).expect("read"), "kept\nmore\n");
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn content_logging_requires_base_logging() {
        let mut config = AppConfig::for_tests();
        config.log_content = true;
        config.logs = false;
        init_logging(&config);
        assert!(!content_logging_enabled());

        config.logs = true;
        config.no_logs = true;
        init_logging(&config);
        assert!(!content_logging_enabled());
        set_logging_for_tests(false, false);
    }
}
