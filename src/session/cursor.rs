//! Pull-based reader over one reply.
//!
//! A cursor never owns its reply. It reaches it through a [`ReplyLink`]: on the wire via the
//! session queue, or in the hand-off cell once the queue had to evict it. Records are pulled
//! one frame at a time; nothing is read ahead.
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, Weak},
};

use log::debug;

use crate::{
    error::{Error, Result},
    protocol::{Status, Warning},
};

use super::{
    SessionInner, lock,
    queue::{Evicted, Handoff},
    reply::{FrameSource, Header, Reply, ReplyId, RowFrame},
};

/// Where a reply was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Location {
    /// Head of the session queue, reading the channel.
    Wire,
    /// Evicted from the queue, reading its own buffer.
    Buffered,
}

/// Non-owning handle from a cursor to its reply.
#[derive(Debug)]
pub(crate) struct ReplyLink {
    pub id: ReplyId,
    pub session: Weak<Mutex<SessionInner>>,
    pub handoff: Arc<Handoff>,
}

impl ReplyLink {
    /// Runs `op` against the reply, wherever it currently lives.
    pub fn with_reply<T>(
        &self,
        op: impl FnOnce(&mut Reply, &mut dyn FrameSource, Location) -> Result<T>,
    ) -> Result<T> {
        let Some(session) = self.session.upgrade() else {
            let mut cell = lock(&self.handoff)?;
            return match cell.as_mut() {
                Some(Evicted { reply, frames }) => op(reply, frames, Location::Buffered),
                None => Err(Error::Connection("session has been closed".into())),
            };
        };
        let mut inner = lock(&session)?;
        inner.run(self.id, &self.handoff, op)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CursorState {
    Open,
    Exhausted,
    Closed,
}

/// Records of an evicted reply, moved out of its buffer in one step.
#[derive(Debug)]
pub(crate) struct Detached {
    pub records: VecDeque<RowFrame>,
    /// Server error that ended the stream after the records.
    pub error: Option<Error>,
}

#[derive(Debug)]
pub(crate) enum Fetched {
    Record(RowFrame),
    End,
    Detached(Detached),
}

#[derive(Debug)]
pub(crate) struct Cursor {
    link: ReplyLink,
    header: Header,
    state: CursorState,
    status: Status,
    warnings: Vec<Warning>,
}

impl Cursor {
    /// Binds a cursor to its reply, blocking until the reply header is read.
    pub fn open(link: ReplyLink) -> Result<Self> {
        let (header, status, warnings) = link.with_reply(|reply, src, _| {
            let header = reply.read_header(src)?;
            Ok((header, reply.status().clone(), reply.warnings().to_vec()))
        })?;
        let state = match header {
            Header::Ack => CursorState::Exhausted,
            _ => CursorState::Open,
        };

        Ok(Self {
            link,
            header,
            state,
            status,
            warnings,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Final status. Complete once the cursor left [`CursorState::Open`].
    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Next record, end of stream, or the whole remainder if the reply was evicted.
    pub fn fetch(&mut self) -> Result<Fetched> {
        match self.state {
            CursorState::Closed => {
                return Err(Error::Usage(format!("cursor for reply {} is closed", self.link.id)));
            }
            CursorState::Exhausted => return Ok(Fetched::End),
            CursorState::Open => {}
        }

        let fetched = self.link.with_reply(|reply, src, location| {
            let fetched = match location {
                Location::Wire => match reply.next_row_frame(src)? {
                    Some(record) => return Ok((Fetched::Record(record), None)),
                    None => Fetched::End,
                },
                Location::Buffered => Fetched::Detached(detach(reply, src)),
            };
            Ok((fetched, Some((reply.status().clone(), reply.warnings().to_vec()))))
        });

        match fetched {
            Ok((fetched, summary)) => {
                if let Some((status, warnings)) = summary {
                    self.status = status;
                    self.warnings = warnings;
                }
                self.state = match fetched {
                    Fetched::Record(_) => CursorState::Open,
                    Fetched::End => CursorState::Exhausted,
                    Fetched::Detached(_) => CursorState::Closed,
                };
                Ok(fetched)
            }
            Err(e) => {
                if matches!(e, Error::Server { .. }) {
                    self.state = CursorState::Exhausted;
                }
                Err(e)
            }
        }
    }

    /// Discards whatever the reply still holds. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        let state = self.state;
        self.state = CursorState::Closed;
        if state != CursorState::Open {
            return Ok(());
        }

        let closed = self.link.with_reply(|reply, src, location| match location {
            Location::Wire => reply.discard_remaining(src),
            Location::Buffered => Ok(()),
        });
        match closed {
            Err(e) if !e.is_fatal() && !matches!(e, Error::Usage(_)) => Err(e),
            Err(e) => {
                debug!("cursor for reply {} closed without discarding: {e}", self.link.id);
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }
}

/// Decodes every buffered record; a server error ends the stream after them.
fn detach(reply: &mut Reply, src: &mut dyn FrameSource) -> Detached {
    let mut records = VecDeque::new();
    loop {
        match reply.next_row_frame(src) {
            Ok(Some(record)) => records.push_back(record),
            Ok(None) => return Detached { records, error: None },
            Err(e) => {
                return Detached {
                    records,
                    error: Some(e),
                };
            }
        }
    }
}
