//! Error taxonomy.
//!
//! Every fallible operation in this crate returns [`Error`], never panics
//! (see spec §9, "Exceptions / panics: None cross the library boundary").
//! [`ErrorKind`] distinguishes the categories a host needs to act on
//! differently: a not-found source is not the same as a policy rejection,
//! which is not the same as a transient network failure.

use std::fmt;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// A single error produced by this crate.
///
/// Carries a [`ErrorKind`] plus a short human-readable message. The message
/// is not meant for machine matching — match on `kind()` instead.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

impl Error {
    /// Construct a new error of the given kind with a message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The category of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        let kind = match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            _ => ErrorKind::Io,
        };
        Error::new(kind, e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            ErrorKind::Timeout
        } else if e.is_connect() {
            ErrorKind::ConnectionFailed
        } else if e.is_status() {
            ErrorKind::HttpStatus
        } else {
            ErrorKind::Network
        };
        Error::new(kind, e.to_string())
    }
}

/// Category of an [`Error`].
///
/// Grouped to match spec §7: open failures, read failures, size anomalies,
/// policy rejections, and out-of-memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // ---- open failures ----
    /// The source does not exist (file not found, HTTP 404/410).
    NotFound,
    /// The caller lacks permission to open or read the source.
    PermissionDenied,
    /// TCP connect failed, DNS resolution failed, or the server refused.
    ConnectionFailed,
    /// The source's scheme/protocol is not `file`, `http`, or `https`.
    UnsupportedProtocol,
    /// The SSRF filter rejected a connection to a private/loopback/link-local
    /// address.
    SsrfBlocked,
    /// The HTTP server responded with a non-2xx status that is fatal to the
    /// operation (4xx/5xx at open time).
    HttpStatus,

    // ---- read failures ----
    /// The underlying transport reported a network-level error mid-read.
    Network,
    /// A memory-mapped file was truncated while mapped and the access fault
    /// handler recovered from it.
    Truncated,
    /// A generic, non-network I/O failure.
    Io,
    /// A request did not complete within its configured timeout.
    Timeout,

    // ---- size anomalies ----
    /// The server ignored a `Range` request and sent more data than fits in
    /// the caller's buffer, or otherwise behaved inconsistently with its own
    /// advertised size/range support.
    RangeInconsistent,

    // ---- policy rejections ----
    /// A configured option was invalid (e.g. a header containing CR/LF).
    InvalidOption,
    /// The source is not a regular file (directory, device, pipe, socket).
    NotRegularFile,
    /// An archive entry path failed sanitization (absolute, `..`, or empty
    /// after normalization).
    UnsafeArchivePath,
    /// A decompression-bomb guard was tripped (size, ratio, entry count, or
    /// name length).
    BombGuardTripped,

    // ---- resource exhaustion ----
    /// Memory allocation failed.
    OutOfMemory,

    /// A task handle was used incorrectly (e.g. result fetched before the
    /// notification fd signalled readiness).
    InvalidTaskState,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::ConnectionFailed => "connection failed",
            ErrorKind::UnsupportedProtocol => "unsupported protocol",
            ErrorKind::SsrfBlocked => "blocked by SSRF filter",
            ErrorKind::HttpStatus => "unexpected HTTP status",
            ErrorKind::Network => "network error",
            ErrorKind::Truncated => "source truncated during read",
            ErrorKind::Io => "I/O error",
            ErrorKind::Timeout => "operation timed out",
            ErrorKind::RangeInconsistent => "range request handled inconsistently",
            ErrorKind::InvalidOption => "invalid option",
            ErrorKind::NotRegularFile => "not a regular file",
            ErrorKind::UnsafeArchivePath => "unsafe archive entry path",
            ErrorKind::BombGuardTripped => "decompression bomb guard tripped",
            ErrorKind::OutOfMemory => "out of memory",
            ErrorKind::InvalidTaskState => "invalid task state",
        };
        f.write_str(s)
    }
}
