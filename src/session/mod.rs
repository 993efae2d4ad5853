//! Sessions and the reply engine behind them.
//!
//! A [`Session`] owns one physical connection and the ordered queue of replies still
//! expected on it. Requests are written immediately; their replies are read lazily, in
//! request order, by whichever result asks first.
//!
//! # Ownership
//!
//! - The session owns every reply that is still on the wire, in its queue.
//! - A result owns its cursor; the cursor holds a weak link back to the session and a
//!   hand-off cell the queue can move its reply into.
//! - When the queue has to move past a reply whose result is still alive, the reply is read
//!   into an owned buffer and handed over. The result turns it into its cache on the next
//!   fetch, so rows stay available after the cursor, or the whole session, is gone.
//!
//! # Failures
//!
//! Server errors belong to one reply. A protocol or connection error breaks the session:
//! every queued reply is aborted and every later operation fails with
//! [`Error::Connection`].
use std::{
    fmt,
    net::{TcpStream, ToSocketAddrs},
    sync::{Arc, Mutex, MutexGuard, Weak},
};

use log::{debug, info, warn};

use crate::{
    error::{Error, Result},
    protocol::{ProtocolTransport, Request, ServerMessage, StreamChannel, WireChannel},
};

mod cursor;
mod options;
mod queue;
mod reply;
mod result;

#[cfg(test)]
pub(crate) mod testing;

use cursor::{Location, ReplyLink};
use queue::{Evicted, Handoff, ReplyQueue};
use reply::{FrameSource, Reply, ReplyId};

pub use options::{DropPolicy, MissingObject, SessionOptions};
pub use result::{DocResult, ExecResult, ReplyHandle, RowResult};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| Error::Connection("session state poisoned by a panic".into()))
}

pub(crate) struct SessionInner {
    transport: ProtocolTransport<Box<dyn WireChannel + Send>>,
    queue: ReplyQueue,
    failure: Option<String>,
    closed: bool,
}

impl SessionInner {
    fn new(channel: Box<dyn WireChannel + Send>) -> Self {
        Self {
            transport: ProtocolTransport::new(channel),
            queue: ReplyQueue::default(),
            failure: None,
            closed: false,
        }
    }

    fn check_usable(&self) -> Result<()> {
        if let Some(failure) = &self.failure {
            return Err(Error::Connection(format!(
                "session is unusable after an earlier failure: {failure}"
            )));
        }
        if self.closed {
            return Err(Error::Connection("session is closed".into()));
        }
        Ok(())
    }

    /// Breaks the session on protocol and connection errors.
    fn guard<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_fatal() && self.failure.is_none() {
                warn!("session broken, aborting {} queued replies: {e}", self.queue.len());
                self.failure = Some(e.to_string());
                self.queue.abort_all();
            }
        }
        result
    }

    fn submit(&mut self, request: &Request, handoff: Weak<Handoff>) -> Result<ReplyId> {
        self.check_usable()?;
        let written = self.transport.write_request(request).map_err(Error::from);
        self.guard(written)?;
        let id = self.queue.enqueue(handoff);
        debug!("reply {id} queued for {} request", request.kind());
        Ok(id)
    }

    /// Runs `op` on reply `id`: from its hand-off cell if it was evicted, otherwise on the
    /// wire after every reply ahead of it has been drained.
    pub(crate) fn run<T>(
        &mut self,
        id: ReplyId,
        handoff: &Handoff,
        op: impl FnOnce(&mut Reply, &mut dyn FrameSource, Location) -> Result<T>,
    ) -> Result<T> {
        {
            let mut cell = lock(handoff)?;
            if let Some(Evicted { reply, frames }) = cell.as_mut() {
                return op(reply, frames, Location::Buffered);
            }
        }

        self.check_usable()?;
        let activated = self.queue.activate(id, &mut self.transport);
        if !self.guard(activated)? {
            return Err(Error::Usage(format!("reply {id} is no longer available")));
        }
        let Some(reply) = self.queue.head_mut() else {
            return Err(Error::Usage(format!("reply {id} is no longer available")));
        };

        let result = op(reply, &mut self.transport, Location::Wire);
        if reply.is_complete() {
            self.queue.retire(id);
        }
        self.guard(result)
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let result = match self.failure {
            Some(_) => Ok(()),
            None => self.shutdown(),
        };
        self.closed = true;
        result
    }

    fn shutdown(&mut self) -> Result<()> {
        let drained = self.queue.drain_all(&mut self.transport);
        self.guard(drained)?;

        let written = self
            .transport
            .write_request(&Request::Close)
            .map_err(Error::from);
        self.guard(written)?;
        let answer = self.transport.read_message().map_err(Error::from);
        match self.guard(answer)? {
            ServerMessage::Closed => {
                info!("session closed");
                Ok(())
            }
            other => {
                let e = Error::Protocol(format!("unexpected '{}' frame closing", other.name()));
                self.guard(Err(e))
            }
        }
    }
}

/// One connection and its queue of pending replies.
///
/// All reads and writes are serialized; clones are not offered. Results keep only weak links
/// to the session, so dropping the session while results are alive is allowed: the session
/// drains their replies into them before the channel is closed.
pub struct Session {
    inner: Arc<Mutex<SessionInner>>,
    options: SessionOptions,
}

impl Session {
    /// Opens a TCP connection to a server.
    pub fn connect(address: impl ToSocketAddrs, options: SessionOptions) -> Result<Self> {
        let stream = TcpStream::connect(address).map_err(|e| Error::Connection(e.to_string()))?;
        stream
            .set_read_timeout(options.read_timeout)
            .and_then(|_| stream.set_write_timeout(options.write_timeout))
            .and_then(|_| stream.set_nodelay(true))
            .map_err(|e| Error::Connection(e.to_string()))?;
        if let Ok(peer) = stream.peer_addr() {
            info!("connected to {peer}");
        }
        Ok(Self::open(StreamChannel::new(stream), options))
    }

    /// Wraps an already established channel.
    pub fn open(channel: impl WireChannel + Send + 'static, options: SessionOptions) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionInner::new(Box::new(channel)))),
            options,
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Writes a request and returns a handle to its reply. Nothing is read yet.
    pub fn submit(&self, request: Request) -> Result<ReplyHandle> {
        let handoff = Arc::new(Mutex::new(None));
        let id = lock(&self.inner)?.submit(&request, Arc::downgrade(&handoff))?;
        Ok(ReplyHandle::new(ReplyLink {
            id,
            session: Arc::downgrade(&self.inner),
            handoff,
        }))
    }

    /// Submits a request expected to be acknowledged.
    pub fn execute(&self, request: Request) -> Result<ExecResult> {
        self.submit(request)?.into_ack()
    }

    /// Submits a request answered with rows.
    pub fn query(&self, request: Request) -> Result<RowResult> {
        self.submit(request)?.into_rows()
    }

    /// Submits a request answered with documents.
    pub fn query_documents(&self, request: Request) -> Result<DocResult> {
        self.submit(request)?.into_docs()
    }

    pub fn sql(&self, text: &str) -> Result<RowResult> {
        self.query(Request::Sql {
            text: text.to_string(),
        })
    }

    pub fn ping(&self) -> Result<()> {
        self.execute(Request::Ping).map(|_| ())
    }

    /// Replies still queued on the wire.
    pub fn pending_replies(&self) -> Result<usize> {
        Ok(lock(&self.inner)?.queue.len())
    }

    pub fn is_open(&self) -> bool {
        lock(&self.inner).is_ok_and(|inner| inner.check_usable().is_ok())
    }

    /// Drains every pending reply, caching those whose results are alive, then closes the
    /// channel. Idempotent.
    pub fn close(&self) -> Result<()> {
        lock(&self.inner)?.close()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("open", &self.is_open())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        match lock(&self.inner) {
            Ok(mut inner) => {
                if let Err(e) = inner.close() {
                    warn!("failed to close session cleanly: {e}");
                }
            }
            Err(e) => warn!("failed to close session: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        protocol::Status,
        value::{Column, ColumnType, Value},
    };

    use super::{testing::ScriptedChannel, *};

    fn int_stream(values: &[i64]) -> Vec<ServerMessage> {
        testing::row_stream(
            vec![Column::new("n", ColumnType::Int)],
            values.iter().map(|v| vec![Value::Int(*v)]).collect(),
        )
    }

    fn ints(result: &mut RowResult) -> Vec<i64> {
        result
            .fetch_all()
            .unwrap()
            .into_iter()
            .map(|row| row.get(0).and_then(Value::as_i64).unwrap())
            .collect()
    }

    #[test]
    fn replies_are_observed_in_submission_order() {
        let channel = ScriptedChannel::default();
        channel.reply(int_stream(&[1, 2, 3]));
        channel.reply(int_stream(&[4, 5]));
        channel.reply(int_stream(&[6]));
        let session = Session::open(channel.clone(), SessionOptions::default());

        let first = session.submit(Request::Ping).unwrap();
        let second = session.submit(Request::Ping).unwrap();
        let third = session.submit(Request::Ping).unwrap();
        assert_eq!(session.pending_replies().unwrap(), 3);

        let mut third = third.into_rows().unwrap();
        assert_eq!(session.pending_replies().unwrap(), 1);
        let mut second = second.into_rows().unwrap();
        let mut first = first.into_rows().unwrap();

        assert_eq!(ints(&mut third), vec![6]);
        assert_eq!(ints(&mut first), vec![1, 2, 3]);
        assert_eq!(ints(&mut second), vec![4, 5]);
    }

    #[test]
    fn abandoned_result_is_skipped() {
        let channel = ScriptedChannel::default();
        channel.reply(int_stream(&[1, 2, 3]));
        channel.reply(vec![ServerMessage::Ok(Status::affected(2))]);
        let session = Session::open(channel, SessionOptions::default());

        let mut rows = session.query(Request::Ping).unwrap();
        assert!(rows.fetch_one().unwrap().is_some());
        drop(rows);

        let ack = session.execute(Request::Ping).unwrap();
        assert_eq!(ack.affected_items_count(), 2);
        assert_eq!(session.pending_replies().unwrap(), 0);
    }

    #[test]
    fn server_error_does_not_break_session() {
        let channel = ScriptedChannel::default();
        channel.reply(vec![ServerMessage::error(1049, "42000", "Unknown database 'x'")]);
        channel.reply(vec![ServerMessage::Ok(Status::default())]);
        let session = Session::open(channel, SessionOptions::default());

        let err = session.execute(Request::Ping).unwrap_err();
        assert!(err.is_server_error(1049));
        assert!(session.is_open());
        session.ping().unwrap();
    }

    #[test]
    fn connection_failure_breaks_every_reply() {
        let channel = ScriptedChannel::default();
        channel.reply(int_stream(&[1, 2, 3]));
        channel.reply(vec![ServerMessage::Ok(Status::default())]);
        channel.fail_reads_after(2);
        let session = Session::open(channel, SessionOptions::default());

        let mut rows = session.query(Request::Ping).unwrap();
        let pending = session.submit(Request::Ping).unwrap();

        assert!(rows.fetch_one().unwrap().is_some());
        assert!(matches!(rows.fetch_one(), Err(Error::Connection(_))));
        assert!(matches!(pending.into_ack(), Err(Error::Connection(_))));
        assert!(matches!(session.ping(), Err(Error::Connection(_))));
        assert!(!session.is_open());
        assert_eq!(session.pending_replies().unwrap(), 0);
    }

    #[test]
    fn protocol_error_breaks_session() {
        let channel = ScriptedChannel::default();
        channel.garbage();
        channel.reply(vec![ServerMessage::Ok(Status::default())]);
        let session = Session::open(channel, SessionOptions::default());

        assert!(matches!(session.ping(), Err(Error::Protocol(_))));
        assert!(matches!(session.ping(), Err(Error::Connection(_))));
    }

    #[test]
    fn close_is_idempotent_and_final() {
        let channel = ScriptedChannel::default();
        let session = Session::open(channel.clone(), SessionOptions::default());

        session.close().unwrap();
        session.close().unwrap();
        assert!(!session.is_open());
        assert!(matches!(session.ping(), Err(Error::Connection(_))));
        assert_eq!(channel.requests(), vec![Request::Close]);
    }

    #[test]
    fn close_caches_live_results() {
        let channel = ScriptedChannel::default();
        channel.reply(int_stream(&[1, 2, 3]));
        let session = Session::open(channel, SessionOptions::default());

        let mut rows = session.query(Request::Ping).unwrap();
        assert_eq!(ints_one(&mut rows), Some(1));
        session.close().unwrap();

        assert_eq!(ints(&mut rows), vec![2, 3]);
    }

    #[test]
    fn dropped_session_leaves_results_readable() {
        let channel = ScriptedChannel::default();
        channel.reply(int_stream(&[7, 8]));
        let session = Session::open(channel, SessionOptions::default());

        let mut rows = session.query(Request::Ping).unwrap();
        drop(session);

        assert_eq!(ints(&mut rows), vec![7, 8]);
    }

    #[test]
    fn pending_handle_outlives_session() {
        let channel = ScriptedChannel::default();
        channel.reply(vec![ServerMessage::error(1146, "42S02", "Table 's.t' doesn't exist")]);
        let session = Session::open(channel, SessionOptions::default());

        let handle = session.submit(Request::Ping).unwrap();
        drop(session);

        assert!(handle.into_ack().unwrap_err().is_server_error(1146));
    }

    fn ints_one(result: &mut RowResult) -> Option<i64> {
        result
            .fetch_one()
            .unwrap()
            .and_then(|row| row.get(0).and_then(Value::as_i64))
    }
}
