use std::io;

use bincode::{
    Decode, Encode,
    config::{BigEndian, Configuration, Fixint},
    decode_from_slice, encode_to_vec,
};
use thiserror::Error;

use super::{Request, ServerMessage, WireChannel};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to encode message: {0}")]
    Serialize(#[from] bincode::error::EncodeError),
    #[error("failed to decode message: {0}")]
    Deserialize(#[from] bincode::error::DecodeError),
    #[error("transport IO error: {0}")]
    Io(#[from] io::Error),
    #[error("channel closed")]
    Closed,
    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),
}

pub(crate) fn wire_config() -> Configuration<BigEndian, Fixint> {
    bincode::config::standard()
        .with_big_endian()
        .with_fixed_int_encoding()
}

/// Encodes one message into the payload of a single frame.
pub fn encode<T: Encode>(message: &T) -> Result<Vec<u8>, TransportError> {
    Ok(encode_to_vec(message, wire_config())?)
}

/// Decodes one message from a frame. The frame must hold exactly one message.
pub fn decode<T: Decode<()>>(frame: &[u8]) -> Result<T, TransportError> {
    let (message, read) = decode_from_slice(frame, wire_config())?;
    if read != frame.len() {
        return Err(TransportError::TrailingBytes(frame.len() - read));
    }
    Ok(message)
}

/// Typed messages over a [`WireChannel`], one message per frame.
pub struct ProtocolTransport<C: WireChannel> {
    channel: C,
}

impl<C: WireChannel> ProtocolTransport<C> {
    pub fn new(channel: C) -> Self {
        Self { channel }
    }

    pub fn write_request(&mut self, request: &Request) -> Result<(), TransportError> {
        let frame = encode(request)?;
        self.channel.write_frame(&frame)?;
        Ok(())
    }

    /// Next request, or `None` when the client hung up.
    pub fn read_request(&mut self) -> Result<Option<Request>, TransportError> {
        match self.channel.read_frame()? {
            Some(frame) => Ok(Some(decode(&frame)?)),
            None => Ok(None),
        }
    }

    pub fn write_message(&mut self, message: &ServerMessage) -> Result<(), TransportError> {
        let frame = encode(message)?;
        self.channel.write_frame(&frame)?;
        Ok(())
    }

    pub fn read_message(&mut self) -> Result<ServerMessage, TransportError> {
        let frame = self.channel.read_frame()?.ok_or(TransportError::Closed)?;
        decode(&frame)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Seek, SeekFrom};

    use crate::{
        protocol::{StreamChannel, response::Status},
        value::{Column, ColumnType, Value},
    };

    use super::*;

    fn loopback() -> ProtocolTransport<StreamChannel<Cursor<Vec<u8>>>> {
        ProtocolTransport::new(StreamChannel::new(Cursor::new(Vec::new())))
    }

    fn rewind(transport: &mut ProtocolTransport<StreamChannel<Cursor<Vec<u8>>>>) {
        transport.channel.get_mut().seek(SeekFrom::Start(0)).unwrap();
    }

    #[test]
    fn read_write_request() {
        let mut transport = loopback();
        transport.write_request(&Request::Ping).unwrap();
        rewind(&mut transport);

        assert_eq!(transport.read_request().unwrap(), Some(Request::Ping));
        assert_eq!(transport.read_request().unwrap(), None);
    }

    #[test]
    fn read_write_reply_frames() {
        let mut transport = loopback();
        let frames = vec![
            ServerMessage::ColumnMeta(vec![Column::new("c1", ColumnType::Int)]),
            ServerMessage::Row(vec![Value::Int(7)]),
            ServerMessage::FetchDone,
            ServerMessage::StatementOk(Status::affected(0)),
        ];
        for frame in &frames {
            transport.write_message(frame).unwrap();
        }
        rewind(&mut transport);

        for frame in frames {
            assert_eq!(transport.read_message().unwrap(), frame);
        }
        assert!(matches!(transport.read_message(), Err(TransportError::Closed)));
    }

    #[test]
    fn garbage_frame_fails_to_decode() {
        let result: Result<ServerMessage, _> = decode(&[0xff, 0xff, 0xff, 0xff]);
        assert!(matches!(result, Err(TransportError::Deserialize(_))));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut frame = encode(&ServerMessage::FetchDone).unwrap();
        frame.push(0);
        let result: Result<ServerMessage, _> = decode(&frame);
        assert!(matches!(result, Err(TransportError::TrailingBytes(1))));
    }
}
