use super::ModemPort;
use crate::error::SerialError;
use crate::log_debug;
use std::ffi::CString;
use std::io::{self, ErrorKind};
use std::mem;
use std::os::unix::io::RawFd;
use std::thread;
use std::time::Duration;

/// Line rates the termios layer can be asked for.
pub const SUPPORTED_RATES: [u32; 6] = [9_600, 19_200, 38_400, 57_600, 115_200, 230_400];

/// Map a numeric line rate to the termios speed constant.
pub fn baud_constant(rate: u32) -> Option<libc::speed_t> {
    let speed = match rate {
        9_600 => libc::B9600,
        19_200 => libc::B19200,
        38_400 => libc::B38400,
        57_600 => libc::B57600,
        115_200 => libc::B115200,
        230_400 => libc::B230400,
        _ => return None,
    };
    Some(speed)
}

/// Serial device opened in raw 8N1 mode. The descriptor is closed on drop.
pub struct SerialPort {
    fd: RawFd,
    path: String,
    rate: u32,
}

impl SerialPort {
    /// Open `path` and configure it for `rate` baud, 8 data bits, no parity, one stop bit.
    pub fn open(path: &str, rate: u32) -> Result<Self, SerialError> {
        let speed = baud_constant(rate).ok_or(SerialError::UnsupportedRate(rate))?;
        let c_path = CString::new(path).map_err(|_| SerialError::Open {
            path: path.to_string(),
            source: io::Error::new(ErrorKind::InvalidInput, "device path contains NUL byte"),
        })?;

        // SAFETY: c_path is a valid NUL-terminated string for the duration of the call.
        let fd = unsafe {
            libc::open(
                c_path.as_ptr(),
                libc::O_RDWR | libc::O_NOCTTY | libc::O_CLOEXEC,
            )
        };
        if fd < 0 {
            let err = io::Error::last_os_error();
            let path = path.to_string();
            return Err(match err.kind() {
                ErrorKind::NotFound => SerialError::NotFound { path },
                ErrorKind::PermissionDenied => SerialError::PermissionDenied { path },
                _ => SerialError::Open { path, source: err },
            });
        }

        let port = Self {
            fd,
            path: path.to_string(),
            rate,
        };
        port.configure(speed)?;
        log_debug(&format!("{path}: opened at {rate} baud"));
        Ok(port)
    }

    fn configure(&self, speed: libc::speed_t) -> Result<(), SerialError> {
        // SAFETY: termios is a plain C struct; zeroed is a valid baseline before tcgetattr fills it.
        let mut tty: libc::termios = unsafe { mem::zeroed() };
        // SAFETY: fd is open and owned by self; tty is a valid out-pointer.
        if unsafe { libc::tcgetattr(self.fd, &mut tty) } != 0 {
            return Err(SerialError::AttributeQuery {
                path: self.path.clone(),
                source: io::Error::last_os_error(),
            });
        }

        // SAFETY: tty was initialized by tcgetattr; speed is a termios constant.
        let speed_ok = unsafe {
            libc::cfsetispeed(&mut tty, speed) == 0 && libc::cfsetospeed(&mut tty, speed) == 0
        };
        if !speed_ok {
            return Err(SerialError::AttributeApply {
                path: self.path.clone(),
                source: io::Error::last_os_error(),
            });
        }
        tty.c_cflag &= !(libc::PARENB | libc::CSTOPB | libc::CSIZE);
        tty.c_cflag |= libc::CS8 | libc::CREAD | libc::CLOCAL;
        tty.c_iflag = 0;
        tty.c_lflag = 0;
        tty.c_oflag = 0;
        // Reads never block in the driver; waiting happens in poll(2).
        tty.c_cc[libc::VMIN] = 0;
        tty.c_cc[libc::VTIME] = 0;

        // SAFETY: fd is open; tty is fully initialized.
        if unsafe { libc::tcsetattr(self.fd, libc::TCSANOW, &tty) } != 0 {
            return Err(SerialError::AttributeApply {
                path: self.path.clone(),
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    fn hangup_error(&self) -> io::Error {
        io::Error::new(
            ErrorKind::ConnectionAborted,
            format!("{}: line hung up", self.path),
        )
    }
}

pub(super) fn should_retry_io_error(err: &io::Error) -> bool {
    err.kind() == ErrorKind::Interrupted || err.kind() == ErrorKind::WouldBlock
}

impl ModemPort for SerialPort {
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut pfd = libc::pollfd {
            fd: self.fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
        // SAFETY: pfd points to one valid pollfd for the duration of the call.
        let ready = unsafe { libc::poll(&mut pfd, 1, millis) };
        if ready < 0 {
            let err = io::Error::last_os_error();
            if should_retry_io_error(&err) {
                return Ok(0);
            }
            return Err(err);
        }
        if ready == 0 {
            return Ok(0);
        }
        let hung_up = pfd.revents & (libc::POLLHUP | libc::POLLERR | libc::POLLNVAL) != 0;
        if hung_up && pfd.revents & libc::POLLIN == 0 {
            return Err(self.hangup_error());
        }

        // SAFETY: buf is a valid writable slice of buf.len() bytes.
        let n = unsafe { libc::read(self.fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        if n < 0 {
            let err = io::Error::last_os_error();
            if should_retry_io_error(&err) {
                return Ok(0);
            }
            return Err(err);
        }
        if n == 0 && hung_up {
            return Err(self.hangup_error());
        }
        Ok(n as usize)
    }

    fn write_all(&mut self, mut data: &[u8]) -> io::Result<()> {
        while !data.is_empty() {
            // SAFETY: data is a valid readable slice; fd is open.
            let written =
                unsafe { libc::write(self.fd, data.as_ptr() as *const libc::c_void, data.len()) };
            if written < 0 {
                let err = io::Error::last_os_error();
                if should_retry_io_error(&err) {
                    thread::sleep(Duration::from_millis(1));
                    continue;
                }
                return Err(err);
            }
            if written == 0 {
                return Err(io::Error::new(
                    ErrorKind::WriteZero,
                    format!("write to {} returned 0", self.path),
                ));
            }
            let written = written as usize;
            data = data.get(written..).unwrap_or(&[]);
        }
        Ok(())
    }

    fn flush_input(&mut self) -> io::Result<()> {
        // SAFETY: fd is open and refers to a terminal device.
        if unsafe { libc::tcflush(self.fd, libc::TCIFLUSH) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Drop for SerialPort {
    fn drop(&mut self) {
        if self.fd >= 0 {
            // SAFETY: fd was opened by SerialPort::open and is closed exactly once.
            let _ = unsafe { libc::close(self.fd) };
            log_debug(&format!("{}: closed", self.path));
        }
    }
}
