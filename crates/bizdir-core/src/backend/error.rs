use std::fmt;

use serde_json::Value;

/// Categories of backend errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// HTTP status error (4xx other than 401, 5xx)
    HttpStatus,
    /// Missing or rejected credentials (HTTP 401, or no session to send)
    Unauthenticated,
    /// Connection failure before a response arrived
    Transport,
    /// Response body did not have the expected shape
    Parse,
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendErrorKind::HttpStatus => write!(f, "http_status"),
            BackendErrorKind::Unauthenticated => write!(f, "unauthenticated"),
            BackendErrorKind::Transport => write!(f, "transport"),
            BackendErrorKind::Parse => write!(f, "parse"),
        }
    }
}

/// Structured error from the backend with kind and details.
#[derive(Debug, Clone)]
pub struct BackendError {
    pub kind: BackendErrorKind,
    /// One-line summary suitable for display
    pub message: String,
    /// Raw response body, when there was one
    pub details: Option<String>,
    /// HTTP status, when there was one
    pub status: Option<u16>,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
            status: None,
        }
    }

    /// Creates an error from a non-success HTTP response.
    ///
    /// Auth and row APIs disagree on the error field name, so `msg`,
    /// `message`, `error_description` and `error` are tried in turn.
    pub fn http_status(status: u16, body: &str) -> Self {
        let kind = if status == 401 {
            BackendErrorKind::Unauthenticated
        } else {
            BackendErrorKind::HttpStatus
        };

        let extracted = serde_json::from_str::<Value>(body).ok().and_then(|json| {
            ["msg", "message", "error_description", "error"]
                .iter()
                .find_map(|key| json.get(key).and_then(Value::as_str).map(str::to_string))
        });

        let message = match extracted {
            Some(msg) => format!("HTTP {status}: {msg}"),
            None => format!("HTTP {status}"),
        };

        Self {
            kind,
            message,
            details: (!body.is_empty()).then(|| body.to_string()),
            status: Some(status),
        }
    }

    pub fn transport(err: &reqwest::Error) -> Self {
        Self::new(BackendErrorKind::Transport, format!("Request failed: {err}"))
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Parse, message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Unauthenticated, message)
    }

    /// True for 400/401 responses: the backend rejected the credentials
    /// themselves rather than failing to answer.
    pub fn is_credential_rejection(&self) -> bool {
        matches!(self.status, Some(400 | 401))
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for BackendError {}
