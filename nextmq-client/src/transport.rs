//! Socket pumps. The reader thread fills the inbound ring, the writer thread drains the outbound
//! ring the channels encode their frames into.
use crate::config::WaitingKind;
use crate::error::RingError;
use crate::ring::RingBuffer;
use log::{debug, error};
use parking_lot::Mutex;
use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// A blocking byte stream the client can run on.
pub trait Transport: Read + Write + Send + 'static {
    /// A second handle of the same stream, the reader and the writer thread get one each.
    fn try_clone_transport(&self) -> io::Result<Self>
    where
        Self: Sized;

    /// Shuts down both directions, a blocked read returns after that.
    fn shutdown_transport(&self) -> io::Result<()>;
}

impl Transport for TcpStream {
    fn try_clone_transport(&self) -> io::Result<Self> {
        self.try_clone()
    }

    fn shutdown_transport(&self) -> io::Result<()> {
        self.shutdown(Shutdown::Both)
    }
}

#[cfg(unix)]
impl Transport for std::os::unix::net::UnixStream {
    fn try_clone_transport(&self) -> io::Result<Self> {
        self.try_clone()
    }

    fn shutdown_transport(&self) -> io::Result<()> {
        self.shutdown(Shutdown::Both)
    }
}

/// Outbound ring of the connection. Channels encode their frames and copy them in, the writer
/// thread drains it into the socket.
pub(crate) struct Outbound {
    ring: RingBuffer,
    /// The ring has a single producer, the channels take turns.
    producer: Mutex<()>,
    timeout: Duration,
    cancel: CancellationToken,
}

impl fmt::Debug for Outbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Outbound").field("ring", &self.ring).finish()
    }
}

impl Outbound {
    pub(crate) fn new(capacity: usize, waiting: WaitingKind, timeout: Duration, cancel: CancellationToken) -> Self {
        Self {
            ring: RingBuffer::new(capacity, waiting),
            producer: Mutex::new(()),
            timeout,
            cancel,
        }
    }

    /// Copies a frame sequence into the ring, waiting for space until the timeout passes or the
    /// connection is cancelled.
    pub(crate) fn send(&self, bytes: &[u8]) -> Result<(), RingError> {
        let _producer = self.producer.lock();
        let start = self.ring.write_position();
        let deadline = Instant::now() + self.timeout;

        let result = self.ring.write_all(bytes, Some(deadline), &self.cancel);

        if result.is_err() && self.ring.write_position() != start {
            error!("Outbound frames are cut after {} bytes", self.ring.write_position() - start);

            // the server cannot parse the rest of the stream
            self.cancel.cancel();
        }

        result
    }

    /// The writer stops after the frames already in the ring are written.
    pub(crate) fn close(&self) {
        self.ring.close();
    }

    /// Writes the ring into `dst` until the ring is closed and empty. Returns the number of bytes
    /// written.
    pub(crate) fn drain_into<W: Write>(&self, dst: &mut W) -> io::Result<u64> {
        // the remaining frames are written even after cancellation, only closing stops the drain
        let never = CancellationToken::new();
        let mut total = 0u64;

        loop {
            match self.ring.wait_for_read(1, None, &never) {
                Ok(_) => {}
                Err(RingError::Closed) => return Ok(total),
                Err(e) => return Err(io::Error::new(io::ErrorKind::Other, e)),
            }

            let (position, available) = self.ring.reserve_for_read(self.ring.capacity(), None);

            {
                // SAFETY: committed and pinned by the read cursor until commit_read
                let src = unsafe { self.ring.read_slice(position, available) };

                dst.write_all(src)?;
            }

            self.ring.commit_read(available);
            total += available as u64;

            if self.ring.readable_len() == 0 {
                dst.flush()?;
            }
        }
    }
}

pub(crate) fn spawn_reader<T: Transport>(
    mut socket: T,
    ring: Arc<RingBuffer>,
    cancel: CancellationToken,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new().name("nextmq-reader".into()).spawn(move || {
        match ring.fill_from(&mut socket, &cancel) {
            Ok(total) => debug!("Socket reader stopped after {} bytes", total),
            Err(e) => error!("Socket read error {:?}", e),
        }

        ring.close();
    })
}

pub(crate) fn spawn_writer<T: Transport>(
    mut socket: T,
    outbound: Arc<Outbound>,
    cancel: CancellationToken,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new().name("nextmq-writer".into()).spawn(move || {
        match outbound.drain_into(&mut socket) {
            Ok(total) => debug!("Socket writer stopped after {} bytes", total),
            Err(e) => {
                error!("Socket write error {:?}", e);
                cancel.cancel();
            }
        }

        outbound.close();

        if let Err(e) = socket.shutdown_transport() {
            debug!("Shutdown of transport {:?}", e);
        }
    })
}
