use bincode::{Decode, Encode};

use crate::value::{Column, Value};

#[derive(Debug, Clone, Copy, Encode, Decode, PartialEq, Eq)]
pub enum WarningLevel {
    Note,
    Warning,
    Error,
}

/// A notice attached to a reply. Notices may appear anywhere inside a reply.
#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub struct Warning {
    pub level: WarningLevel,
    pub code: u32,
    pub message: String,
}

/// Completion status of a statement.
#[derive(Debug, Clone, Default, Encode, Decode, PartialEq, Eq)]
pub struct Status {
    pub affected_items: u64,
    pub last_insert_id: Option<u64>,
}

impl Status {
    pub fn affected(affected_items: u64) -> Self {
        Self {
            affected_items,
            last_insert_id: None,
        }
    }
}

/// One frame of a reply sent by the server.
#[derive(Debug, Clone, Encode, Decode, PartialEq)]
pub enum ServerMessage {
    Notice(Warning),
    /// Acknowledgement; completes the reply.
    Ok(Status),
    /// Failure; completes the reply.
    Error {
        code: u32,
        sql_state: String,
        message: String,
    },
    /// Header of a row stream.
    ColumnMeta(Vec<Column>),
    /// Header of a document stream.
    DocumentStart,
    Row(Vec<Value>),
    Document(String),
    /// End of the rows or documents of a stream.
    FetchDone,
    /// Trailing status; completes a stream reply.
    StatementOk(Status),
    /// Answer to [`Request::Close`](super::Request::Close).
    Closed,
}

impl ServerMessage {
    pub fn error(code: u32, sql_state: &str, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code,
            sql_state: sql_state.to_string(),
            message: message.into(),
        }
    }

    pub fn notice(code: u32, message: impl Into<String>) -> Self {
        ServerMessage::Notice(Warning {
            level: WarningLevel::Note,
            code,
            message: message.into(),
        })
    }

    /// Short name used in logs and protocol errors.
    pub fn name(&self) -> &'static str {
        match self {
            ServerMessage::Notice(_) => "notice",
            ServerMessage::Ok(_) => "ok",
            ServerMessage::Error { .. } => "error",
            ServerMessage::ColumnMeta(_) => "column-meta",
            ServerMessage::DocumentStart => "document-start",
            ServerMessage::Row(_) => "row",
            ServerMessage::Document(_) => "document",
            ServerMessage::FetchDone => "fetch-done",
            ServerMessage::StatementOk(_) => "statement-ok",
            ServerMessage::Closed => "closed",
        }
    }
}
