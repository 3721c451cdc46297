use crate::modem::Response;
use std::io;
use thiserror::Error;

/// Failures opening or configuring a serial line. Fatal for that line; never retried.
#[derive(Debug, Error)]
pub enum SerialError {
    #[error("device {path} not found")]
    NotFound { path: String },

    #[error("permission denied opening {path}")]
    PermissionDenied { path: String },

    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to read line attributes of {path}: {source}")]
    AttributeQuery {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to apply line attributes to {path}: {source}")]
    AttributeApply {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("unsupported line rate {0}")]
    UnsupportedRate(u32),
}

impl SerialError {
    /// Process exit code reported when a line cannot be opened.
    pub fn exit_code(&self) -> u8 {
        match self {
            SerialError::NotFound { .. } => 10,
            SerialError::PermissionDenied { .. } => 11,
            SerialError::Open { .. } => 12,
            SerialError::AttributeQuery { .. } => 13,
            SerialError::AttributeApply { .. } => 14,
            SerialError::UnsupportedRate(_) => 15,
        }
    }
}

/// Failures of one offer/answer cycle. The session logs them and starts over from idle.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{command} answered {response}, expected {expected}")]
    Protocol {
        command: &'static str,
        response: Response,
        expected: Response,
    },

    #[error("serial transport failed: {0}")]
    Transport(#[from] io::Error),

    #[error("failed to spawn {daemon}: {source}")]
    Spawn {
        daemon: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to wait for daemon: {0}")]
    Supervise(#[source] io::Error),

    #[error("shutdown requested")]
    Cancelled,
}

impl SessionError {
    /// Numeric modem response behind a protocol failure, `-1` for a timeout.
    pub fn response_code(&self) -> Option<i32> {
        match self {
            SessionError::Protocol { response, .. } => Some(response.code()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct_per_cause() {
        let errors = [
            SerialError::NotFound { path: "x".into() },
            SerialError::PermissionDenied { path: "x".into() },
            SerialError::Open {
                path: "x".into(),
                source: io::Error::other("busy"),
            },
            SerialError::AttributeQuery {
                path: "x".into(),
                source: io::Error::other("tcgetattr"),
            },
            SerialError::AttributeApply {
                path: "x".into(),
                source: io::Error::other("tcsetattr"),
            },
            SerialError::UnsupportedRate(1200),
        ];
        let mut codes: Vec<u8> = errors.iter().map(SerialError::exit_code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
        assert!(codes.iter().all(|code| *code != 0));
    }

    #[test]
    fn protocol_error_reports_numeric_response() {
        let err = SessionError::Protocol {
            command: "AT+VLS=1",
            response: Response::Code(4),
            expected: Response::OK,
        };
        assert_eq!(err.response_code(), Some(4));
        assert_eq!(err.to_string(), "AT+VLS=1 answered 4, expected 0");

        let timeout = SessionError::Protocol {
            command: "ATA",
            response: Response::Timeout,
            expected: Response::CONNECT,
        };
        assert_eq!(timeout.response_code(), Some(-1));
        assert_eq!(SessionError::Cancelled.response_code(), None);
    }
}
