//! One outstanding server reply and the grammar of its frames.
//!
//! A reply is read from a [`FrameSource`]: the session's transport while the reply is the
//! head of the queue, or an owned buffer once the reply was evicted off the wire.
use std::{collections::VecDeque, sync::Arc};

use log::{trace, warn};

use crate::{
    error::{Error, Result},
    protocol::{ProtocolTransport, ServerMessage, Status, Warning, WireChannel},
    value::{Column, Document, Value},
};

pub(crate) type ReplyId = u64;

/// Anything replies can pull frames from.
pub(crate) trait FrameSource {
    fn next_message(&mut self) -> Result<ServerMessage>;
}

impl<C: WireChannel> FrameSource for ProtocolTransport<C> {
    fn next_message(&mut self) -> Result<ServerMessage> {
        Ok(self.read_message()?)
    }
}

impl FrameSource for VecDeque<ServerMessage> {
    fn next_message(&mut self) -> Result<ServerMessage> {
        self.pop_front()
            .ok_or_else(|| Error::Protocol("buffered reply ended before its last frame".into()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReplyState {
    /// Nothing read yet.
    Pending,
    /// Stream header read, no record pulled.
    HeaderRead,
    /// At least one record pulled.
    StreamOpen,
    /// Every frame consumed.
    Drained,
    /// Remaining frames discarded on request of the owner.
    Closed,
    /// The server failed the request, or the session died under it.
    Errored,
}

/// What the first frames of a reply announced.
#[derive(Debug, Clone)]
pub(crate) enum Header {
    Ack,
    Rows(Arc<[Column]>),
    Documents,
}

/// A decoded record of a stream.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RowFrame {
    Row(Vec<Value>),
    Document(Document),
}

#[derive(Debug, Clone)]
struct ServerFailure {
    code: u32,
    sql_state: String,
    message: String,
}

impl From<ServerFailure> for Error {
    fn from(value: ServerFailure) -> Self {
        Error::Server {
            code: value.code,
            sql_state: value.sql_state,
            message: value.message,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Header,
    Records,
    Trailer,
}

#[derive(Debug)]
pub(crate) struct Reply {
    id: ReplyId,
    state: ReplyState,
    header: Option<Header>,
    status: Status,
    warnings: Vec<Warning>,
    failure: Option<ServerFailure>,
}

impl Reply {
    pub fn new(id: ReplyId) -> Self {
        Self {
            id,
            state: ReplyState::Pending,
            header: None,
            status: Status::default(),
            warnings: Vec::new(),
            failure: None,
        }
    }

    pub fn id(&self) -> ReplyId {
        self.id
    }

    pub fn state(&self) -> ReplyState {
        self.state
    }

    pub fn is_complete(&self) -> bool {
        matches!(
            self.state,
            ReplyState::Drained | ReplyState::Closed | ReplyState::Errored
        )
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Marks the reply as lost with its session.
    pub fn abort(&mut self) {
        if !self.is_complete() {
            self.state = ReplyState::Errored;
        }
    }

    /// Reads up to and including the frame that tells what kind of reply this is.
    ///
    /// An acknowledgement completes the reply. A server error completes it too, and is
    /// raised again by every later read.
    pub fn read_header(&mut self, src: &mut dyn FrameSource) -> Result<Header> {
        match self.state {
            ReplyState::Pending => {}
            ReplyState::Errored => return Err(self.failure_error()),
            ReplyState::Closed => return Err(self.closed_error()),
            _ => {
                return self.header.clone().ok_or_else(|| {
                    Error::Protocol(format!("reply {} lost its header", self.id))
                });
            }
        }

        loop {
            match src.next_message()? {
                ServerMessage::Notice(warning) => self.warnings.push(warning),
                ServerMessage::Ok(status) => {
                    self.status = status;
                    return Ok(self.open(Header::Ack, ReplyState::Drained));
                }
                ServerMessage::ColumnMeta(columns) => {
                    return Ok(self.open(Header::Rows(columns.into()), ReplyState::HeaderRead));
                }
                ServerMessage::DocumentStart => {
                    return Ok(self.open(Header::Documents, ReplyState::HeaderRead));
                }
                ServerMessage::Error {
                    code,
                    sql_state,
                    message,
                } => return Err(self.fail(code, sql_state, message)),
                other => return Err(self.unexpected(&other, "reply header")),
            }
        }
    }

    /// Pulls the next record, or `None` once the stream ended. Trailing notices and the
    /// final status are absorbed on the way.
    pub fn next_row_frame(&mut self, src: &mut dyn FrameSource) -> Result<Option<RowFrame>> {
        match self.state {
            ReplyState::Pending => {
                self.read_header(src)?;
                return self.next_row_frame(src);
            }
            ReplyState::HeaderRead | ReplyState::StreamOpen => {}
            ReplyState::Drained => return Ok(None),
            ReplyState::Closed => return Err(self.closed_error()),
            ReplyState::Errored => return Err(self.failure_error()),
        }

        loop {
            match src.next_message()? {
                ServerMessage::Notice(warning) => self.warnings.push(warning),
                ServerMessage::Row(values) => {
                    let Some(Header::Rows(columns)) = &self.header else {
                        return Err(self.unexpected(&ServerMessage::Row(values), "document stream"));
                    };
                    if values.len() != columns.len() {
                        return Err(Error::Protocol(format!(
                            "reply {}: row with {} values for {} columns",
                            self.id,
                            values.len(),
                            columns.len()
                        )));
                    }
                    self.state = ReplyState::StreamOpen;
                    return Ok(Some(RowFrame::Row(values)));
                }
                ServerMessage::Document(json) => {
                    if !matches!(self.header, Some(Header::Documents)) {
                        return Err(self.unexpected(&ServerMessage::Document(json), "row stream"));
                    }
                    let document = Document::parse(&json)?;
                    self.state = ReplyState::StreamOpen;
                    return Ok(Some(RowFrame::Document(document)));
                }
                ServerMessage::FetchDone => {
                    self.read_trailer(src)?;
                    return Ok(None);
                }
                ServerMessage::StatementOk(status) => {
                    self.status = status;
                    self.state = ReplyState::Drained;
                    return Ok(None);
                }
                ServerMessage::Error {
                    code,
                    sql_state,
                    message,
                } => return Err(self.fail(code, sql_state, message)),
                other => return Err(self.unexpected(&other, "record stream")),
            }
        }
    }

    /// Reads and drops every remaining frame without decoding records.
    pub fn discard_remaining(&mut self, src: &mut dyn FrameSource) -> Result<()> {
        let id = self.id;
        let mut skipped = 0;
        self.scan(src, |message| {
            if let ServerMessage::Error { code, message, .. } = &message {
                warn!("reply {id} discarded with server error {code}: {message}");
            }
            skipped += 1;
        })?;
        trace!("reply {id}: skipped {skipped} frames");

        if self.state != ReplyState::Errored {
            self.state = ReplyState::Closed;
        }
        Ok(())
    }

    /// Reads every remaining frame into an owned buffer, undecoded. The reply keeps its
    /// state, so the buffer can later be replayed through [`Reply::next_row_frame`].
    pub fn buffer_remaining(
        &mut self,
        src: &mut dyn FrameSource,
    ) -> Result<VecDeque<ServerMessage>> {
        let mut frames = VecDeque::new();
        self.scan(src, |message| frames.push_back(message))?;
        Ok(frames)
    }

    /// Walks the frame grammar from the current state to the end of the reply.
    fn scan(
        &self,
        src: &mut dyn FrameSource,
        mut sink: impl FnMut(ServerMessage),
    ) -> Result<()> {
        let mut phase = match self.state {
            ReplyState::Pending => Phase::Header,
            ReplyState::HeaderRead | ReplyState::StreamOpen => Phase::Records,
            _ => return Ok(()),
        };

        loop {
            let message = src.next_message()?;
            let done = match (phase, &message) {
                (_, ServerMessage::Notice(_)) => false,
                (_, ServerMessage::Error { .. }) => true,
                (Phase::Header, ServerMessage::Ok(_)) => true,
                (Phase::Header, ServerMessage::ColumnMeta(_) | ServerMessage::DocumentStart) => {
                    phase = Phase::Records;
                    false
                }
                (Phase::Records, ServerMessage::Row(_) | ServerMessage::Document(_)) => false,
                (Phase::Records, ServerMessage::FetchDone) => {
                    phase = Phase::Trailer;
                    false
                }
                (Phase::Records | Phase::Trailer, ServerMessage::StatementOk(_)) => true,
                (_, other) => return Err(self.unexpected(other, "skipped reply")),
            };
            sink(message);
            if done {
                return Ok(());
            }
        }
    }

    fn read_trailer(&mut self, src: &mut dyn FrameSource) -> Result<()> {
        loop {
            match src.next_message()? {
                ServerMessage::Notice(warning) => self.warnings.push(warning),
                ServerMessage::StatementOk(status) => {
                    self.status = status;
                    self.state = ReplyState::Drained;
                    return Ok(());
                }
                ServerMessage::Error {
                    code,
                    sql_state,
                    message,
                } => return Err(self.fail(code, sql_state, message)),
                other => return Err(self.unexpected(&other, "stream trailer")),
            }
        }
    }

    fn open(&mut self, header: Header, state: ReplyState) -> Header {
        self.header = Some(header.clone());
        self.state = state;
        header
    }

    fn fail(&mut self, code: u32, sql_state: String, message: String) -> Error {
        let failure = ServerFailure {
            code,
            sql_state,
            message,
        };
        self.state = ReplyState::Errored;
        self.failure = Some(failure.clone());
        failure.into()
    }

    fn failure_error(&self) -> Error {
        match &self.failure {
            Some(failure) => failure.clone().into(),
            None => Error::Connection(format!("reply {} was lost with its session", self.id)),
        }
    }

    fn closed_error(&self) -> Error {
        Error::Usage(format!("reply {} is closed", self.id))
    }

    fn unexpected(&self, message: &ServerMessage, context: &str) -> Error {
        Error::Protocol(format!(
            "reply {}: unexpected '{}' frame in {context}",
            self.id,
            message.name()
        ))
    }
}
