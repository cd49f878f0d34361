use std::fmt;

/// The five error kinds enumerated in spec.md §7, exhaustive.
///
/// Follows the hand-rolled style the rest of the workspace uses
/// (`wire::Error`): a plain enum, manual `Display`, no `thiserror`.
#[derive(Debug)]
pub enum Error {
    /// Caller supplied a value out of domain.
    InvalidParameter(String),
    /// Operation attempted in the wrong lifecycle state.
    InvalidState(&'static str),
    /// Allocation failure, buffer too small, or a size limit exceeded.
    ResourceError(String),
    /// A transport/OS call failed, or a requested feature isn't
    /// supported by the configured transport.
    OperationFailed(String),
    /// Malformed RTP/RTCP bytes on the wire, or internal failure to make
    /// progress within a size budget.
    ProtocolError(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
            Error::InvalidState(msg) => write!(f, "invalid state: {msg}"),
            Error::ResourceError(msg) => write!(f, "resource error: {msg}"),
            Error::OperationFailed(msg) => write!(f, "operation failed: {msg}"),
            Error::ProtocolError(msg) => write!(f, "protocol error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::OperationFailed(err.to_string())
    }
}

impl From<wire::Error> for Error {
    fn from(err: wire::Error) -> Self {
        Error::ProtocolError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
