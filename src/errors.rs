//! Error Types
//!
//! Structured error handling for the HTTP VFS.
//! Remote-access failures are propagated verbatim from the transport, and
//! every variant maps to the result code handed back to SQLite.

use rusqlite::ffi;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// HTTP VFS error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("attempt to write a readonly database")]
    ReadOnly,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Server error ({0}): {1}")]
    Server(u16, String),

    #[error("Request error: {0}")]
    Request(String),

    #[error("Range requests not supported (HTTP {0})")]
    RangeNotSupported(u16),

    #[error("invalid Content-Range response: {0}")]
    InvalidContentRange(String),

    #[error("Remote size unknown: no Content-Length or Content-Range header")]
    MissingContentLength,

    #[error("Short response body: expected {expected} bytes, got {actual}")]
    ShortBody { expected: usize, actual: usize },

    #[error("Invalid read offset: {0}")]
    InvalidOffset(i64),

    #[error("Short read at offset {offset}: {read} of {requested} bytes available")]
    ShortRead {
        offset: i64,
        requested: usize,
        read: usize,
    },

    #[error("cache miss right after put (offset {offset}, length {len})")]
    WindowMiss { offset: i64, len: usize },

    #[error("Invalid URL '{0}'")]
    InvalidUrl(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("VFS '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl Error {
    /// Map the error to the SQLite result code returned from a VFS callback
    pub fn to_sqlite_code(&self) -> i32 {
        match self {
            Error::ReadOnly => ffi::SQLITE_READONLY,
            Error::ShortRead { .. } => ffi::SQLITE_IOERR_SHORT_READ,
            Error::Network(_)
            | Error::Timeout
            | Error::NotFound(_)
            | Error::Forbidden(_)
            | Error::Server(_, _)
            | Error::Request(_)
            | Error::RangeNotSupported(_)
            | Error::InvalidContentRange(_)
            | Error::MissingContentLength
            | Error::ShortBody { .. }
            | Error::InvalidOffset(_)
            | Error::WindowMiss { .. } => ffi::SQLITE_IOERR_READ,
            Error::InvalidUrl(_) | Error::Config(_) | Error::Unsupported(_) => {
                ffi::SQLITE_CANTOPEN
            }
            Error::AlreadyRegistered(_) => ffi::SQLITE_MISUSE,
            Error::Io(_) | Error::Sqlite(_) => ffi::SQLITE_IOERR,
        }
    }

    /// Whether a caller could reasonably retry the failed operation.
    ///
    /// The VFS itself never retries; this is for embedders deciding whether
    /// to rerun a query.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Timeout | Error::Network(_) | Error::Server(_, _)
        ) || matches!(self, Error::Request(msg) if msg.starts_with("HTTP 429"))
    }

    /// Create an Error from an HTTP status code and response body
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            403 => Error::Forbidden(body.to_string()),
            404 | 410 => Error::NotFound(body.to_string()),
            408 => Error::Timeout,
            500..=599 => Error::Server(status, body.to_string()),
            _ => Error::Request(format!("HTTP {}: {}", status, body)),
        }
    }

    /// Classify a reqwest failure
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout
        } else if let Some(status) = err.status() {
            Error::from_status(status.as_u16(), &err.to_string())
        } else {
            Error::Network(err.to_string())
        }
    }
}
