use super::port::should_retry_io_error;
use super::*;
use crate::error::SerialError;
use std::ffi::CStr;
use std::io::{self, ErrorKind};
use std::os::unix::io::RawFd;
use std::ptr;
use std::sync::{Mutex, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

struct PtyPair {
    master: RawFd,
    slave: RawFd,
    slave_path: String,
}

impl PtyPair {
    fn close_master(&mut self) {
        unsafe {
            libc::close(self.master);
        }
        self.master = -1;
    }
}

impl Drop for PtyPair {
    fn drop(&mut self) {
        unsafe {
            if self.master >= 0 {
                libc::close(self.master);
            }
            libc::close(self.slave);
        }
    }
}

fn ttyname_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn open_pty_pair() -> PtyPair {
    let mut master = -1;
    let mut slave = -1;
    let result = unsafe {
        libc::openpty(
            &mut master,
            &mut slave,
            ptr::null_mut(),
            ptr::null_mut(),
            ptr::null_mut(),
        )
    };
    assert_eq!(
        result,
        0,
        "openpty() failed with errno {}",
        io::Error::last_os_error()
    );
    let _guard = ttyname_lock().lock().unwrap();
    let name = unsafe { libc::ttyname(slave) };
    assert!(!name.is_null(), "ttyname() failed");
    let slave_path = unsafe { CStr::from_ptr(name) }
        .to_string_lossy()
        .into_owned();
    PtyPair {
        master,
        slave,
        slave_path,
    }
}

fn write_master(fd: RawFd, bytes: &[u8]) {
    let n = unsafe { libc::write(fd, bytes.as_ptr() as *const libc::c_void, bytes.len()) };
    assert_eq!(n, bytes.len() as isize);
}

fn read_master(fd: RawFd, len: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 64];
    let deadline = Instant::now() + Duration::from_secs(2);
    while out.len() < len && Instant::now() < deadline {
        let mut pfd = libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        };
        if unsafe { libc::poll(&mut pfd, 1, 50) } <= 0 {
            continue;
        }
        let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        if n > 0 {
            out.extend_from_slice(&buf[..n as usize]);
        }
    }
    out
}

#[test]
fn open_missing_device_reports_not_found() {
    match SerialPort::open("/dev/does-not-exist-dialin", 115_200) {
        Err(SerialError::NotFound { path }) => assert_eq!(path, "/dev/does-not-exist-dialin"),
        other => panic!("expected NotFound, got {:?}", other.err()),
    }
}

#[test]
fn open_rejects_unsupported_rate_before_touching_device() {
    match SerialPort::open("/dev/does-not-exist-dialin", 1_200) {
        Err(SerialError::UnsupportedRate(rate)) => assert_eq!(rate, 1_200),
        other => panic!("expected UnsupportedRate, got {:?}", other.err()),
    }
}

#[test]
fn open_regular_file_fails_attribute_query() {
    let path = std::env::temp_dir().join(format!("dialin-not-a-tty-{}", std::process::id()));
    std::fs::write(&path, b"").unwrap();
    let result = SerialPort::open(path.to_str().unwrap(), 115_200);
    let _ = std::fs::remove_file(&path);
    assert!(matches!(result, Err(SerialError::AttributeQuery { .. })));
}

#[test]
fn every_supported_rate_has_a_termios_constant() {
    for rate in SUPPORTED_RATES {
        assert!(baud_constant(rate).is_some(), "{rate}");
    }
    assert!(baud_constant(2_400).is_none());
}

#[test]
fn pty_round_trip_reads_and_writes_raw_bytes() {
    let pty = open_pty_pair();
    let mut port = SerialPort::open(&pty.slave_path, 115_200).expect("open pty slave");
    assert_eq!(port.path(), pty.slave_path);
    assert_eq!(port.rate(), 115_200);

    port.write_all(b"AT+VTX\r\n").unwrap();
    assert_eq!(read_master(pty.master, 8), b"AT+VTX\r\n");

    write_master(pty.master, &[0x10, b'7']);
    let mut buf = [0u8; 2];
    let mut got = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(2);
    while got.len() < 2 && Instant::now() < deadline {
        let n = port
            .read_timeout(&mut buf[got.len()..], Duration::from_millis(100))
            .unwrap();
        got.extend_from_slice(&buf[got.len()..got.len() + n]);
    }
    assert_eq!(got, vec![0x10, b'7']);
}

#[test]
fn read_timeout_returns_zero_when_idle() {
    let pty = open_pty_pair();
    let mut port = SerialPort::open(&pty.slave_path, 57_600).expect("open pty slave");
    let mut buf = [0u8; 16];
    let start = Instant::now();
    let n = port
        .read_timeout(&mut buf, Duration::from_millis(30))
        .unwrap();
    assert_eq!(n, 0);
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(20), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(1), "{elapsed:?}");
}

#[test]
fn read_timeout_reports_hangup_instead_of_spinning() {
    let mut pty = open_pty_pair();
    let mut port = SerialPort::open(&pty.slave_path, 115_200).expect("open pty slave");
    pty.close_master();
    let mut buf = [0u8; 16];
    let start = Instant::now();
    let err = port
        .read_timeout(&mut buf, Duration::from_secs(5))
        .expect_err("hung-up line");
    assert!(!should_retry_io_error(&err), "{err:?}");
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn flush_input_discards_pending_bytes() {
    let pty = open_pty_pair();
    let mut port = SerialPort::open(&pty.slave_path, 115_200).expect("open pty slave");
    write_master(pty.master, b"4\r\n");
    thread::sleep(Duration::from_millis(50));
    port.flush_input().unwrap();
    let mut buf = [0u8; 16];
    let n = port
        .read_timeout(&mut buf, Duration::from_millis(20))
        .unwrap();
    assert_eq!(n, 0);
}

#[test]
fn retryable_errors_are_interrupt_and_would_block() {
    assert!(should_retry_io_error(&io::Error::from(ErrorKind::Interrupted)));
    assert!(should_retry_io_error(&io::Error::from(ErrorKind::WouldBlock)));
    assert!(!should_retry_io_error(&io::Error::from(ErrorKind::BrokenPipe)));
}
