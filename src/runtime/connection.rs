//! Per-connection state for the event loop.
//!
//! Each connection owns its socket, the partial-frame carry, the handshake
//! session and a queue of encoded frames waiting to be written. Write
//! interest is only registered with the poller while that queue is
//! non-empty.

use crate::protocols::chat::{encode_into, FrameDecoder, Session};
use bytes::{Buf, BytesMut};
use mio::net::TcpStream;
use mio::{Interest, Registry, Token};
use std::io::{self, Read, Write};
use std::net::SocketAddr;

/// Frames decoded by one readable event.
#[derive(Debug, Default)]
pub(crate) struct ReadBatch {
    pub frames: Vec<String>,
    /// The peer closed its side of the stream.
    pub eof: bool,
}

/// A single accepted client connection.
pub(crate) struct ChatConnection {
    stream: TcpStream,
    token: Token,
    peer: SocketAddr,
    decoder: FrameDecoder,
    pub session: Session,
    outbound: BytesMut,
    max_pending_output: usize,
    /// Whether the stream is currently registered for WRITABLE.
    write_armed: bool,
}

impl ChatConnection {
    pub(crate) fn new(
        stream: TcpStream,
        token: Token,
        peer: SocketAddr,
        max_frame_size: usize,
        max_pending_output: usize,
    ) -> Self {
        Self {
            stream,
            token,
            peer,
            decoder: FrameDecoder::new(max_frame_size),
            session: Session::new(),
            outbound: BytesMut::new(),
            max_pending_output,
            write_armed: false,
        }
    }

    pub(crate) fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub(crate) fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    pub(crate) fn has_pending_output(&self) -> bool {
        !self.outbound.is_empty()
    }

    /// Logged out and every queued byte delivered.
    pub(crate) fn is_finished(&self) -> bool {
        self.session.is_logging_out() && !self.has_pending_output()
    }

    /// Read everything currently available and decode it.
    ///
    /// Reads until the socket would block, as readiness is edge-triggered.
    pub(crate) fn read_frames(&mut self, scratch: &mut [u8]) -> io::Result<ReadBatch> {
        let mut batch = ReadBatch::default();
        loop {
            match self.stream.read(scratch) {
                Ok(0) => {
                    batch.eof = true;
                    break;
                }
                Ok(n) => {
                    let frames = self.decoder.decode(&scratch[..n])?;
                    batch.frames.extend(frames);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(batch)
    }

    /// Queue one frame and try to write it out immediately.
    pub(crate) fn send(&mut self, text: &str, registry: &Registry) -> io::Result<()> {
        encode_into(text, &mut self.outbound);
        self.flush(registry)
    }

    /// Write as much queued output as the socket accepts.
    pub(crate) fn flush(&mut self, registry: &Registry) -> io::Result<()> {
        while !self.outbound.is_empty() {
            match self.stream.write(&self.outbound) {
                Ok(0) => {
                    return Err(io::Error::new(io::ErrorKind::WriteZero, "write returned 0"));
                }
                Ok(n) => self.outbound.advance(n),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        if self.outbound.len() > self.max_pending_output {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!(
                    "peer is not reading: {} bytes pending (limit {})",
                    self.outbound.len(),
                    self.max_pending_output
                ),
            ));
        }

        self.update_interest(registry)
    }

    /// One non-blocking flush attempt, ignoring failures.
    pub(crate) fn flush_best_effort(&mut self) {
        while !self.outbound.is_empty() {
            match self.stream.write(&self.outbound) {
                Ok(0) | Err(_) => break,
                Ok(n) => self.outbound.advance(n),
            }
        }
    }

    fn update_interest(&mut self, registry: &Registry) -> io::Result<()> {
        let want_write = !self.outbound.is_empty();
        if want_write == self.write_armed {
            return Ok(());
        }

        let interest = if want_write {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        };
        registry.reregister(&mut self.stream, self.token, interest)?;
        self.write_armed = want_write;
        Ok(())
    }
}
