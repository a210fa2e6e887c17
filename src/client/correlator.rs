//! Synchronous request/reply turns over a non-blocking connection.
//!
//! The correlator owns one client socket and a private `mio::Poll` watching
//! only that socket. A turn writes one frame, blocks on readiness (with an
//! optional deadline), then performs a single read-and-decode pass.

use crate::error::ClientError;
use crate::protocols::chat::{encode, FrameDecoder};
use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token};
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

const CONNECTION: Token = Token(0);
const READ_CHUNK: usize = 4 * 1024;

pub(crate) struct Correlator {
    stream: TcpStream,
    poll: Poll,
    events: Events,
    decoder: FrameDecoder,
    scratch: Vec<u8>,
    /// The server closed its side.
    closed: bool,
}

impl Correlator {
    /// Connect with a timeout and switch the socket to non-blocking mode.
    pub(crate) fn connect(
        addr: SocketAddr,
        timeout: Duration,
        max_frame_size: usize,
    ) -> io::Result<Self> {
        let stream = std::net::TcpStream::connect_timeout(&addr, timeout)?;
        stream.set_nodelay(true)?;
        stream.set_nonblocking(true)?;

        let mut stream = TcpStream::from_std(stream);
        let poll = Poll::new()?;
        poll.registry()
            .register(&mut stream, CONNECTION, Interest::READABLE)?;

        Ok(Self {
            stream,
            poll,
            events: Events::with_capacity(8),
            decoder: FrameDecoder::new(max_frame_size),
            scratch: vec![0u8; READ_CHUNK],
            closed: false,
        })
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    /// Send `command` and collect the frames of the next readable turn.
    pub(crate) fn request(
        &mut self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<Vec<String>, ClientError> {
        self.send(command)?;
        self.receive(timeout)
    }

    /// Write one frame, waiting for writability if the socket is full.
    pub(crate) fn send(&mut self, command: &str) -> Result<(), ClientError> {
        if self.closed {
            return Err(ClientError::Disconnected);
        }

        let frame = encode(command);
        let mut written = 0;
        while written < frame.len() {
            match self.stream.write(&frame[written..]) {
                Ok(0) => {
                    return Err(io::Error::new(io::ErrorKind::WriteZero, "write returned 0").into())
                }
                Ok(n) => written += n,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => self.wait_writable()?,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Wait for readability, then read and decode what is available.
    ///
    /// `None` waits indefinitely. An elapsed timeout returns no frames.
    pub(crate) fn receive(&mut self, timeout: Option<Duration>) -> Result<Vec<String>, ClientError> {
        if self.closed {
            return Err(ClientError::Disconnected);
        }
        if !self.wait_readable(timeout)? {
            return Ok(Vec::new());
        }

        let mut frames = Vec::new();
        loop {
            match self.stream.read(&mut self.scratch) {
                Ok(0) => {
                    self.closed = true;
                    break;
                }
                Ok(n) => frames.extend(self.decoder.decode(&self.scratch[..n])?),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.closed = true;
                    return Err(e.into());
                }
            }
        }
        Ok(frames)
    }

    /// Returns `false` if the deadline passed first.
    fn wait_readable(&mut self, timeout: Option<Duration>) -> io::Result<bool> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let remaining = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(false);
                    }
                    Some(deadline - now)
                }
                None => None,
            };

            match self.poll.poll(&mut self.events, remaining) {
                Ok(()) => {}
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }

            let ready = self.events.iter().any(|event| {
                event.token() == CONNECTION
                    && (event.is_readable() || event.is_read_closed() || event.is_error())
            });
            if ready {
                return Ok(true);
            }
        }
    }

    fn wait_writable(&mut self) -> io::Result<()> {
        self.poll.registry().reregister(
            &mut self.stream,
            CONNECTION,
            Interest::READABLE | Interest::WRITABLE,
        )?;

        let result = loop {
            match self.poll.poll(&mut self.events, None) {
                Ok(()) => {}
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => break Err(e),
            }
            if self.events.iter().any(|event| event.is_writable()) {
                break Ok(());
            }
        };

        self.poll
            .registry()
            .reregister(&mut self.stream, CONNECTION, Interest::READABLE)?;
        result
    }

    pub(crate) fn shutdown(&mut self) {
        let _ = self.poll.registry().deregister(&mut self.stream);
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
        self.closed = true;
    }
}
