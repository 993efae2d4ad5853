//! Pipelined client sessions for a document/relational database protocol.
//!
//! A [`Session`] writes requests as soon as they are submitted and reads their replies
//! lazily, strictly in submission order. Results may be consumed in any order, closed early,
//! or outlive their session; the engine keeps the connection framed correctly in every case.
//!
//! The [`protocol`] module also carries a small in-memory reference server used by the
//! binaries and the tests.
pub mod cli;
pub mod crud;
pub mod error;
pub mod protocol;
pub mod session;
pub mod value;

pub use cli::{Command, prompt};
pub use crud::{Collection, Schema, Table};
pub use error::{Error, Result};
pub use session::{
    DocResult, DropPolicy, ExecResult, MissingObject, ReplyHandle, RowResult, Session,
    SessionOptions,
};
pub use value::{Column, ColumnType, Document, Row, Value};

#[cfg(test)]
mod tests;
