//! User-facing results.
//!
//! A result wraps a cursor and fetches lazily. If the reply under it is moved off the wire
//! before the result is done with it, the result adopts every remaining record as its own
//! cache on the next fetch and never touches the cursor again.
use std::{collections::VecDeque, sync::Arc};

use log::debug;

use crate::{
    error::{Error, Result},
    protocol::{Status, Warning},
    value::{Column, Document, Row},
};

use super::{
    cursor::{Cursor, Detached, Fetched, ReplyLink},
    reply::{Header, RowFrame},
};

/// Handle to a reply that has not been read yet.
///
/// Handles may be opened in any order: opening one drains every earlier reply first.
#[must_use]
#[derive(Debug)]
pub struct ReplyHandle {
    link: ReplyLink,
}

impl ReplyHandle {
    pub(crate) fn new(link: ReplyLink) -> Self {
        Self { link }
    }

    /// Position of the request in its session.
    pub fn id(&self) -> u64 {
        self.link.id
    }

    #[cfg(test)]
    pub(crate) fn into_link(self) -> ReplyLink {
        self.link
    }

    /// Waits for the acknowledgement. Records of a stream reply are skipped.
    pub fn into_ack(self) -> Result<ExecResult> {
        let mut cursor = Cursor::open(self.link)?;
        loop {
            match cursor.fetch()? {
                Fetched::Record(_) => continue,
                Fetched::End => break,
                Fetched::Detached(Detached { error: Some(e), .. }) => return Err(e),
                Fetched::Detached(_) => break,
            }
        }
        Ok(ExecResult {
            status: cursor.status().clone(),
            warnings: cursor.warnings().to_vec(),
        })
    }

    /// Opens the reply as a row stream. An acknowledgement opens as a result without data.
    pub fn into_rows(self) -> Result<RowResult> {
        let mut cursor = Cursor::open(self.link)?;
        let columns: Arc<[Column]> = match cursor.header().clone() {
            Header::Rows(columns) => columns,
            Header::Ack => Arc::from(Vec::new()),
            Header::Documents => {
                cursor.close()?;
                return Err(Error::Usage("reply carries documents, not rows".into()));
            }
        };
        Ok(RowResult(Records::new(cursor, columns)))
    }

    /// Opens the reply as a document stream.
    pub fn into_docs(self) -> Result<DocResult> {
        let mut cursor = Cursor::open(self.link)?;
        if matches!(cursor.header(), Header::Rows(_)) {
            cursor.close()?;
            return Err(Error::Usage("reply carries rows, not documents".into()));
        }
        Ok(DocResult(Records::new(cursor, Arc::from(Vec::new()))))
    }
}

/// Result of a request that only acknowledges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    status: Status,
    warnings: Vec<Warning>,
}

impl ExecResult {
    pub fn affected_items_count(&self) -> u64 {
        self.status.affected_items
    }

    pub fn last_insert_id(&self) -> Option<u64> {
        self.status.last_insert_id
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

trait Record: Sized {
    fn from_frame(frame: RowFrame, columns: &Arc<[Column]>) -> Result<Self>;
}

impl Record for Row {
    fn from_frame(frame: RowFrame, columns: &Arc<[Column]>) -> Result<Self> {
        match frame {
            RowFrame::Row(values) => Ok(Row::new(Arc::clone(columns), values)),
            RowFrame::Document(_) => Err(Error::Protocol("document in a row stream".into())),
        }
    }
}

impl Record for Document {
    fn from_frame(frame: RowFrame, _: &Arc<[Column]>) -> Result<Self> {
        match frame {
            RowFrame::Document(document) => Ok(document),
            RowFrame::Row(_) => Err(Error::Protocol("row in a document stream".into())),
        }
    }
}

/// Lazy record fetching with a cache fallback, shared by row and document results.
#[derive(Debug)]
struct Records<T> {
    cursor: Cursor,
    columns: Arc<[Column]>,
    cache: Option<VecDeque<T>>,
    /// Raised once the cache runs dry.
    deferred: Option<Error>,
    closed: bool,
}

impl<T: Record> Records<T> {
    fn new(cursor: Cursor, columns: Arc<[Column]>) -> Self {
        Self {
            cursor,
            columns,
            cache: None,
            deferred: None,
            closed: false,
        }
    }

    fn fetch_one(&mut self) -> Result<Option<T>> {
        self.check_open()?;
        if self.cache.is_none() {
            match self.cursor.fetch()? {
                Fetched::Record(frame) => return T::from_frame(frame, &self.columns).map(Some),
                Fetched::End => return Ok(None),
                Fetched::Detached(detached) => self.adopt(detached)?,
            }
        }

        match self.cache.as_mut().and_then(VecDeque::pop_front) {
            Some(record) => Ok(Some(record)),
            None => self.deferred.take().map_or(Ok(None), Err),
        }
    }

    /// Moves the records of an evicted reply into the cache.
    fn adopt(&mut self, detached: Detached) -> Result<()> {
        let records = detached
            .records
            .into_iter()
            .map(|frame| T::from_frame(frame, &self.columns))
            .collect::<Result<VecDeque<_>>>()?;
        debug!("result cached {} records of an evicted reply", records.len());
        self.cache = Some(records);
        self.deferred = detached.error;
        Ok(())
    }

    /// Pulls everything the cursor still has into the cache.
    fn buffer(&mut self) -> Result<&mut VecDeque<T>> {
        self.check_open()?;
        if self.cache.is_none() {
            let mut records = VecDeque::new();
            loop {
                match self.cursor.fetch() {
                    Ok(Fetched::Record(frame)) => {
                        records.push_back(T::from_frame(frame, &self.columns)?)
                    }
                    Ok(Fetched::End) => break,
                    Ok(Fetched::Detached(detached)) => {
                        for frame in detached.records {
                            records.push_back(T::from_frame(frame, &self.columns)?);
                        }
                        self.deferred = detached.error;
                        break;
                    }
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        self.deferred = Some(e);
                        break;
                    }
                }
            }
            self.cache = Some(records);
        }
        Ok(self.cache.get_or_insert_with(VecDeque::new))
    }

    fn fetch_all(&mut self) -> Result<Vec<T>> {
        let records = self.buffer()?.drain(..).collect();
        match self.deferred.take() {
            Some(e) => Err(e),
            None => Ok(records),
        }
    }

    fn count_remaining(&mut self) -> Result<usize> {
        Ok(self.buffer()?.len())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.cache = None;
        self.cursor.close()
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Usage("result is closed".into()));
        }
        Ok(())
    }
}

/// Rows of a query, fetched lazily.
///
/// Column metadata is fixed when the result is opened. Status and warnings are complete
/// once every row was fetched.
#[derive(Debug)]
pub struct RowResult(Records<Row>);

impl RowResult {
    pub fn columns(&self) -> &[Column] {
        &self.0.columns
    }

    pub fn column_count(&self) -> usize {
        self.0.columns.len()
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.0.columns.get(index)
    }

    /// Whether the reply was a row stream rather than a plain acknowledgement.
    pub fn has_data(&self) -> bool {
        !matches!(self.0.cursor.header(), Header::Ack)
    }

    pub fn fetch_one(&mut self) -> Result<Option<Row>> {
        self.0.fetch_one()
    }

    pub fn fetch_all(&mut self) -> Result<Vec<Row>> {
        self.0.fetch_all()
    }

    /// Number of rows not fetched yet. Reads and caches all of them.
    pub fn count_remaining(&mut self) -> Result<usize> {
        self.0.count_remaining()
    }

    pub fn affected_items_count(&self) -> u64 {
        self.0.cursor.status().affected_items
    }

    pub fn last_insert_id(&self) -> Option<u64> {
        self.0.cursor.status().last_insert_id
    }

    pub fn warnings(&self) -> &[Warning] {
        self.0.cursor.warnings()
    }

    pub fn warning_count(&self) -> usize {
        self.0.cursor.warnings().len()
    }

    /// Discards unread rows. Idempotent; later fetches fail.
    pub fn close(&mut self) -> Result<()> {
        self.0.close()
    }
}

impl Iterator for RowResult {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.fetch_one().transpose()
    }
}

/// Documents of a find, fetched lazily.
#[derive(Debug)]
pub struct DocResult(Records<Document>);

impl DocResult {
    pub fn fetch_one(&mut self) -> Result<Option<Document>> {
        self.0.fetch_one()
    }

    pub fn fetch_all(&mut self) -> Result<Vec<Document>> {
        self.0.fetch_all()
    }

    pub fn count_remaining(&mut self) -> Result<usize> {
        self.0.count_remaining()
    }

    /// Whether the reply was a document stream rather than a plain acknowledgement.
    pub fn has_data(&self) -> bool {
        !matches!(self.0.cursor.header(), Header::Ack)
    }

    pub fn affected_items_count(&self) -> u64 {
        self.0.cursor.status().affected_items
    }

    pub fn last_insert_id(&self) -> Option<u64> {
        self.0.cursor.status().last_insert_id
    }

    pub fn warnings(&self) -> &[Warning] {
        self.0.cursor.warnings()
    }

    pub fn warning_count(&self) -> usize {
        self.0.cursor.warnings().len()
    }

    pub fn close(&mut self) -> Result<()> {
        self.0.close()
    }
}

impl Iterator for DocResult {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        self.fetch_one().transpose()
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        protocol::{Request, ServerMessage},
        session::{Session, SessionOptions, testing},
        value::{ColumnType, Value},
    };

    use super::*;

    fn columns() -> Vec<Column> {
        vec![
            Column::new("c0", ColumnType::Json),
            Column::new("c1", ColumnType::Int),
        ]
    }

    fn rows(n: i64) -> Vec<ServerMessage> {
        testing::row_stream(
            columns(),
            (1..=n)
                .map(|i| vec![Value::Json(format!("{{\"r\": {i}}}")), Value::Int(i)])
                .collect(),
        )
    }

    fn session(replies: Vec<Vec<ServerMessage>>) -> Session {
        let channel = testing::ScriptedChannel::default();
        for reply in replies {
            channel.reply(reply);
        }
        Session::open(channel, SessionOptions::default())
    }

    fn c1(row: Option<Row>) -> Option<i64> {
        row.and_then(|r| r.get(1).and_then(Value::as_i64))
    }

    #[test]
    fn cache_on_forced_close() {
        let session = session(vec![
            rows(3),
            vec![ServerMessage::Ok(Default::default())],
        ]);

        let mut result = session.query(Request::Ping).unwrap();
        let r1 = result.fetch_one().unwrap();
        session.execute(Request::Ping).unwrap();

        assert_eq!(c1(r1), Some(1));
        assert_eq!(c1(result.fetch_one().unwrap()), Some(2));
        assert_eq!(c1(result.fetch_one().unwrap()), Some(3));
        assert_eq!(result.fetch_one().unwrap(), None);
        assert_eq!(result.fetch_one().unwrap(), None);
    }

    #[test]
    fn metadata_survives_fetch_and_cache() {
        let session = session(vec![rows(2), vec![ServerMessage::Ok(Default::default())]]);

        let mut result = session.query(Request::Ping).unwrap();
        let before = result.columns().to_vec();
        result.fetch_one().unwrap();
        assert_eq!(result.columns(), before.as_slice());

        session.ping().unwrap();
        result.fetch_one().unwrap();
        assert_eq!(result.columns(), before.as_slice());
        assert_eq!(result.column(1).map(|c| c.name.as_str()), Some("c1"));
        assert_eq!(result.column_count(), 2);
    }

    #[test]
    fn close_is_idempotent() {
        let session = session(vec![rows(3), vec![ServerMessage::Ok(Default::default())]]);

        let mut result = session.query(Request::Ping).unwrap();
        result.fetch_one().unwrap();
        result.close().unwrap();
        result.close().unwrap();
        assert!(matches!(result.fetch_one(), Err(Error::Usage(_))));

        assert_eq!(session.pending_replies().unwrap(), 0);
        session.ping().unwrap();
    }

    #[test]
    fn count_caches_remaining_rows() {
        let session = session(vec![rows(4)]);

        let mut result = session.query(Request::Ping).unwrap();
        result.fetch_one().unwrap();
        assert_eq!(result.count_remaining().unwrap(), 3);
        assert_eq!(session.pending_replies().unwrap(), 0);
        assert_eq!(result.affected_items_count(), 4);

        let rest: Vec<i64> = result
            .by_ref()
            .map(|row| row.unwrap().get(1).and_then(Value::as_i64).unwrap())
            .collect();
        assert_eq!(rest, vec![2, 3, 4]);
        assert_eq!(result.count_remaining().unwrap(), 0);
    }

    #[test]
    fn ack_opens_as_empty_row_result() {
        let session = session(vec![vec![
            ServerMessage::notice(1287, "deprecated syntax"),
            ServerMessage::Ok(Status::affected(5)),
        ]]);

        let mut result = session.query(Request::Ping).unwrap();
        assert!(!result.has_data());
        assert_eq!(result.column_count(), 0);
        assert_eq!(result.affected_items_count(), 5);
        assert_eq!(result.warning_count(), 1);
        assert_eq!(result.fetch_one().unwrap(), None);
    }

    #[test]
    fn server_error_after_cached_rows() {
        let mut failing = rows(2);
        failing.truncate(3);
        failing.push(ServerMessage::error(1317, "70100", "interrupted"));
        let session = session(vec![failing, vec![ServerMessage::Ok(Default::default())]]);

        let mut result = session.query(Request::Ping).unwrap();
        session.ping().unwrap();

        assert_eq!(c1(result.fetch_one().unwrap()), Some(1));
        assert_eq!(c1(result.fetch_one().unwrap()), Some(2));
        assert!(result.fetch_one().unwrap_err().is_server_error(1317));
        assert_eq!(result.fetch_one().unwrap(), None);
    }

    #[test]
    fn documents_stream() {
        let mut frames = testing::document_stream(&[
            r#"{"_id": "1", "name": "New Guy!"}"#,
            r#"{"_id": "2", "name": "Old Guy"}"#,
        ]);
        frames.insert(2, ServerMessage::notice(1287, "deprecated syntax"));
        if let Some(ServerMessage::StatementOk(status)) = frames.last_mut() {
            *status = Status::affected(2);
        }
        let session = session(vec![frames]);

        let mut docs = session.query_documents(Request::Ping).unwrap();
        assert!(docs.has_data());
        let first = docs.fetch_one().unwrap().unwrap();
        assert_eq!(first.id(), Some("1"));
        let rest = docs.fetch_all().unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].get("name").and_then(|v| v.as_str()), Some("Old Guy"));

        assert_eq!(docs.affected_items_count(), 2);
        assert_eq!(docs.last_insert_id(), None);
        assert_eq!(docs.warning_count(), 1);
        assert_eq!(docs.warnings()[0].code, 1287);
    }

    #[test]
    fn ack_opens_as_empty_doc_result() {
        let session = session(vec![vec![ServerMessage::Ok(Status::affected(1))]]);

        let mut docs = session.query_documents(Request::Ping).unwrap();
        assert!(!docs.has_data());
        assert_eq!(docs.affected_items_count(), 1);
        assert_eq!(docs.warning_count(), 0);
        assert_eq!(docs.fetch_one().unwrap(), None);
    }

    #[test]
    fn count_surfaces_connection_loss() {
        let channel = testing::ScriptedChannel::default();
        channel.reply(rows(5));
        channel.fail_reads_after(3);
        let session = Session::open(channel, SessionOptions::default());

        let mut result = session.query(Request::Ping).unwrap();
        assert!(matches!(result.count_remaining(), Err(Error::Connection(_))));
        assert!(!session.is_open());
        assert!(matches!(result.fetch_one(), Err(Error::Connection(_))));
        assert!(matches!(result.fetch_all(), Err(Error::Connection(_))));
    }

    #[test]
    fn kind_mismatch_is_usage_error() {
        let session = session(vec![
            testing::document_stream(&[r#"{"_id": "1"}"#]),
            rows(1),
            vec![ServerMessage::Ok(Default::default())],
        ]);

        assert!(matches!(session.query(Request::Ping), Err(Error::Usage(_))));
        assert!(matches!(
            session.query_documents(Request::Ping),
            Err(Error::Usage(_))
        ));
        session.ping().unwrap();
    }

    #[test]
    fn into_ack_skips_rows() {
        let session = session(vec![rows(3)]);

        let ack = session.execute(Request::Ping).unwrap();
        assert_eq!(ack.affected_items_count(), 3);
        assert_eq!(ack.warning_count(), 0);
        assert_eq!(session.pending_replies().unwrap(), 0);
    }
}
