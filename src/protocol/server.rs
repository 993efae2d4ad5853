use std::{
    io,
    net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs},
    sync::{Arc, Mutex, PoisonError},
};

use log::{debug, info, warn};

use crate::protocol::{
    Catalog, ProtocolTransport, Request, ServerMessage, StreamChannel, ThreadPool, TransportError,
};

/// TCP front end for a shared [`Catalog`]. Each connection is served by one pool worker.
pub struct CatalogServer {
    listener: TcpListener,
    catalog: Arc<Mutex<Catalog>>,
    pool: ThreadPool,
}

impl CatalogServer {
    pub fn bind(address: impl ToSocketAddrs, workers: usize) -> io::Result<Self> {
        Ok(Self {
            listener: TcpListener::bind(address)?,
            catalog: Arc::new(Mutex::new(Catalog::new())),
            pool: ThreadPool::new(workers),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn catalog(&self) -> Arc<Mutex<Catalog>> {
        Arc::clone(&self.catalog)
    }

    /// Accepts connections until the listener fails.
    pub fn listen(self) -> io::Result<()> {
        info!(
            "listening at {} with {} workers",
            self.local_addr()?,
            self.pool.size()
        );

        for stream in self.listener.incoming() {
            match stream {
                Ok(stream) => {
                    let catalog = Arc::clone(&self.catalog);
                    self.pool.execute(move || {
                        let peer = stream.peer_addr().ok();
                        if let Err(e) = handle_connection(stream, catalog) {
                            warn!("connection {peer:?} failed: {e}");
                        }
                    });
                }
                Err(e) => warn!("broken connection: {e:?}"),
            }
        }
        Ok(())
    }
}

fn handle_connection(
    stream: TcpStream,
    catalog: Arc<Mutex<Catalog>>,
) -> Result<(), TransportError> {
    stream.set_nodelay(true)?;
    let peer = stream.peer_addr()?;
    info!("accepted connection from {peer}");
    let mut transport = ProtocolTransport::new(StreamChannel::new(stream));

    loop {
        let Some(request) = transport.read_request()? else {
            info!("{peer} hung up");
            return Ok(());
        };
        debug!("{peer} sent {} request", request.kind());

        if request == Request::Close {
            transport.write_message(&ServerMessage::Closed)?;
            info!("{peer} closed its session");
            return Ok(());
        }

        let reply = catalog
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handle(request);
        for message in &reply {
            transport.write_message(message)?;
        }
    }
}
