use std::io::{self, ErrorKind, Read, Write};

/// Largest frame accepted in either direction.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const LEN_PREFIX_SIZE: usize = size_of::<u32>();

/// Blocking source and sink of delimited byte frames.
///
/// `read_frame` returns `Ok(None)` when the peer closed the channel on a frame boundary.
pub trait WireChannel {
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()>;
    fn read_frame(&mut self) -> io::Result<Option<Vec<u8>>>;
}

impl<W: WireChannel + ?Sized> WireChannel for Box<W> {
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        (**self).write_frame(frame)
    }

    fn read_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
        (**self).read_frame()
    }
}

/// Frames over any byte stream with a big-endian `u32` length prefix.
#[derive(Debug)]
pub struct StreamChannel<T: Read + Write> {
    stream: T,
}

impl<T: Read + Write> StreamChannel<T> {
    pub fn new(stream: T) -> Self {
        Self { stream }
    }

    pub fn get_ref(&self) -> &T {
        &self.stream
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.stream
    }

    pub fn into_inner(self) -> T {
        self.stream
    }
}

impl<T: Read + Write> WireChannel for StreamChannel<T> {
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        if frame.len() > MAX_FRAME_LEN {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("frame of {} bytes exceeds {MAX_FRAME_LEN}", frame.len()),
            ));
        }
        let len = frame.len() as u32;
        self.stream.write_all(&len.to_be_bytes())?;
        self.stream.write_all(frame)?;
        self.stream.flush()
    }

    fn read_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut prefix = [0; LEN_PREFIX_SIZE];
        let mut filled = 0;
        while filled < LEN_PREFIX_SIZE {
            match self.stream.read(&mut prefix[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => return Err(ErrorKind::UnexpectedEof.into()),
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        let len = u32::from_be_bytes(prefix) as usize;
        if len > MAX_FRAME_LEN {
            return Err(io::Error::new(
                ErrorKind::InvalidData,
                format!("incoming frame of {len} bytes exceeds {MAX_FRAME_LEN}"),
            ));
        }
        let mut frame = vec![0; len];
        self.stream.read_exact(&mut frame)?;
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Seek, SeekFrom};

    use super::*;

    #[test]
    fn frames_keep_their_boundaries() {
        let mut channel = StreamChannel::new(Cursor::new(Vec::new()));
        channel.write_frame(b"first").unwrap();
        channel.write_frame(b"").unwrap();
        channel.write_frame(b"third").unwrap();

        channel.stream.seek(SeekFrom::Start(0)).unwrap();
        assert_eq!(channel.read_frame().unwrap(), Some(b"first".to_vec()));
        assert_eq!(channel.read_frame().unwrap(), Some(Vec::new()));
        assert_eq!(channel.read_frame().unwrap(), Some(b"third".to_vec()));
        assert_eq!(channel.read_frame().unwrap(), None);
    }

    #[test]
    fn truncated_prefix_is_an_error() {
        let mut channel = StreamChannel::new(Cursor::new(vec![0, 0]));
        let err = channel.read_frame().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let len = (MAX_FRAME_LEN as u32 + 1).to_be_bytes();
        let mut channel = StreamChannel::new(Cursor::new(len.to_vec()));
        let err = channel.read_frame().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }
}
