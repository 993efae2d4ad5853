//! Error taxonomy for every operation that goes through a [`Session`](crate::Session).
//!
//! Four kinds are distinguished so callers can branch on what went wrong rather than on
//! which call produced it:
//!
//! - [`Error::Server`]: the request reached the server and was rejected there.
//! - [`Error::Protocol`]: a frame did not follow the reply grammar. Fatal for the session.
//! - [`Error::Connection`]: the transport failed or the session is no longer usable.
//! - [`Error::Usage`]: the caller broke the contract of a result or cursor.
use thiserror::Error;

use crate::protocol::TransportError;

/// Errors surfaced by sessions, replies and results.
#[derive(Debug, Error)]
pub enum Error {
    #[error("server error {code} ({sql_state}): {message}")]
    Server {
        code: u32,
        sql_state: String,
        message: String,
    },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("usage error: {0}")]
    Usage(String),
}

impl Error {
    /// Server error code, if this error came from the server.
    pub fn code(&self) -> Option<u32> {
        match self {
            Error::Server { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Check if this is a server error with a specific code.
    pub fn is_server_error(&self, code: u32) -> bool {
        matches!(self, Error::Server { code: c, .. } if *c == code)
    }

    /// Protocol and connection errors poison the whole session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Protocol(_) | Error::Connection(_))
    }
}

impl From<TransportError> for Error {
    fn from(value: TransportError) -> Self {
        match value {
            TransportError::Io(e) => Error::Connection(e.to_string()),
            TransportError::Closed => Error::Connection("connection closed by peer".into()),
            TransportError::Serialize(e) => Error::Protocol(format!("failed to encode: {e}")),
            TransportError::Deserialize(e) => Error::Protocol(format!("failed to decode: {e}")),
            TransportError::TrailingBytes(n) => {
                Error::Protocol(format!("{n} trailing bytes after message"))
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Server error codes understood by this crate.
pub mod codes {
    /// Schema already exists.
    pub const DB_CREATE_EXISTS: u32 = 1007;
    /// Dropping a schema that does not exist.
    pub const DB_DROP_EXISTS: u32 = 1008;
    /// Unknown schema.
    pub const BAD_DB: u32 = 1049;
    /// Table, view or collection already exists.
    pub const TABLE_EXISTS: u32 = 1050;
    /// Unknown table, view or collection in a drop.
    pub const BAD_TABLE: u32 = 1051;
    /// Statement could not be parsed.
    pub const PARSE_ERROR: u32 = 1064;
    /// Row does not match the table's column count.
    pub const WRONG_VALUE_COUNT: u32 = 1136;
    /// NULL written into a NOT NULL column.
    pub const BAD_NULL: u32 = 1048;
    /// Table, view or collection does not exist.
    pub const NO_SUCH_TABLE: u32 = 1146;
    /// Document is not a valid JSON object.
    pub const INVALID_JSON: u32 = 3140;
}
