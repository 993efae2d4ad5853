use std::{
    collections::VecDeque,
    io,
    sync::{Arc, Mutex, PoisonError},
};

use crate::protocol::{Catalog, Request, TransportError, WireChannel, decode, encode};

/// In-process channel answering requests from a shared [`Catalog`].
///
/// Reply frames are queued when the request is written and read back one by one, just as
/// they would arrive over a socket.
#[derive(Debug, Clone)]
pub struct LoopbackChannel {
    catalog: Arc<Mutex<Catalog>>,
    pending: VecDeque<Vec<u8>>,
}

impl LoopbackChannel {
    pub fn new(catalog: Arc<Mutex<Catalog>>) -> Self {
        Self {
            catalog,
            pending: VecDeque::new(),
        }
    }

    /// A channel over a catalog of its own.
    pub fn standalone() -> Self {
        Self::new(Arc::new(Mutex::new(Catalog::new())))
    }

    pub fn catalog(&self) -> &Arc<Mutex<Catalog>> {
        &self.catalog
    }
}

impl WireChannel for LoopbackChannel {
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        let request: Request = decode(frame).map_err(invalid)?;
        let reply = self
            .catalog
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handle(request);
        for message in &reply {
            self.pending.push_back(encode(message).map_err(invalid)?);
        }
        Ok(())
    }

    fn read_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
        Ok(self.pending.pop_front())
    }
}

fn invalid(e: TransportError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e.to_string())
}
