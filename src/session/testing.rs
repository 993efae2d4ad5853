//! Scripted channel for driving sessions in tests.
use std::{
    collections::VecDeque,
    io,
    sync::{Arc, Mutex},
};

use crate::{
    protocol::{Request, ServerMessage, Status, WireChannel, decode, encode},
    value::{Column, Value},
};

#[derive(Debug, Default)]
struct Script {
    replies: VecDeque<Vec<Vec<u8>>>,
    pending: VecDeque<Vec<u8>>,
    requests: Vec<Request>,
    reads_left: Option<usize>,
}

/// Answers each written request with the next scripted reply.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptedChannel {
    script: Arc<Mutex<Script>>,
}

impl ScriptedChannel {
    pub fn reply(&self, messages: Vec<ServerMessage>) {
        let frames = messages.iter().map(|m| encode(m).unwrap()).collect();
        self.script.lock().unwrap().replies.push_back(frames);
    }

    /// Scripts a reply frame that does not decode.
    pub fn garbage(&self) {
        let frames = vec![vec![0xff; 4]];
        self.script.lock().unwrap().replies.push_back(frames);
    }

    /// Every read after the next `reads` fails like a reset connection.
    pub fn fail_reads_after(&self, reads: usize) {
        self.script.lock().unwrap().reads_left = Some(reads);
    }

    pub fn requests(&self) -> Vec<Request> {
        self.script.lock().unwrap().requests.clone()
    }
}

impl WireChannel for ScriptedChannel {
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        let request: Request = decode(frame).map_err(|e| io::Error::other(e.to_string()))?;
        let mut script = self.script.lock().unwrap();
        let frames = match request {
            Request::Close => vec![encode(&ServerMessage::Closed).unwrap()],
            _ => script.replies.pop_front().unwrap_or_default(),
        };
        script.pending.extend(frames);
        script.requests.push(request);
        Ok(())
    }

    fn read_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut script = self.script.lock().unwrap();
        if let Some(left) = script.reads_left.as_mut() {
            if *left == 0 {
                return Err(io::ErrorKind::ConnectionReset.into());
            }
            *left -= 1;
        }
        Ok(script.pending.pop_front())
    }
}

/// Frames of a complete row stream.
pub(crate) fn row_stream(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Vec<ServerMessage> {
    let count = rows.len() as u64;
    let mut frames = vec![ServerMessage::ColumnMeta(columns)];
    frames.extend(rows.into_iter().map(ServerMessage::Row));
    frames.push(ServerMessage::FetchDone);
    frames.push(ServerMessage::StatementOk(Status::affected(count)));
    frames
}

/// Frames of a complete document stream.
pub(crate) fn document_stream(documents: &[&str]) -> Vec<ServerMessage> {
    let mut frames = vec![ServerMessage::DocumentStart];
    frames.extend(documents.iter().map(|d| ServerMessage::Document(d.to_string())));
    frames.push(ServerMessage::FetchDone);
    frames.push(ServerMessage::StatementOk(Status::default()));
    frames
}
