//! Error kinds for the connection core and chunked-file engine.
//!
//! Each variant is distinguishable by the caller per the error handling
//! design: argument errors and operation failures never tear down the
//! connection, while connection failures always do.

use std::fmt;

/// All failure modes surfaced by this crate.
#[derive(Debug)]
pub enum Error {
    /// Malformed URI, bad pair arity, invalid port, invalid safe-check
    /// option, or an illegal file mode. Never triggers teardown.
    ArgumentError(String),
    /// Connecting to a non-master single node without `slave_ok`.
    ConfigurationError(String),
    /// Socket-level I/O error, short read, or closed peer. Always triggers
    /// full connection teardown.
    ConnectionFailure(String),
    /// Pool `checkout` exceeded its timeout. Does not tear down; the
    /// caller may retry.
    ConnectionTimeout,
    /// Raised while replaying saved authentications against a freshly
    /// elected master.
    AuthenticationError(String),
    /// Server-reported `err`/`errmsg` in a safe-check reply. Does not
    /// tear down.
    OperationFailure(String),
    /// File mode misuse: write on a read-mode file, seek on a write-mode
    /// file, or an unrecognized mode string.
    GridError(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ArgumentError(msg) => write!(f, "argument error: {msg}"),
            Error::ConfigurationError(msg) => write!(f, "configuration error: {msg}"),
            Error::ConnectionFailure(msg) => write!(f, "connection failure: {msg}"),
            Error::ConnectionTimeout => write!(f, "timed out waiting for a pooled connection"),
            Error::AuthenticationError(msg) => write!(f, "authentication error: {msg}"),
            Error::OperationFailure(msg) => write!(f, "operation failure: {msg}"),
            Error::GridError(msg) => write!(f, "grid error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::ConnectionFailure(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
