//! mio event loop implementation.
//!
//! Readiness-based model: poll tells us when sockets are ready, then we
//! perform non-blocking read/write syscalls. One thread owns the listener,
//! a waker used for shutdown, and every accepted connection.
//!
//! Frames are dispatched to the connection's handshake [`Session`] in
//! arrival order and the resulting [`Effect`] is applied before the next
//! frame is looked at, so broadcasts and log appends are serialized in
//! decode order across all connections.
//!
//! [`Session`]: crate::protocols::chat::Session

use crate::protocols::chat::{command, Effect};
use crate::runtime::connection::ChatConnection;
use crate::runtime::registry::{ConnectionId, ConnectionRegistry};
use crate::server_log::{LogEntry, LogEvent, LogSink};
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};
use slab::Slab;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

pub(crate) const LISTENER_TOKEN: Token = Token(usize::MAX);
pub(crate) const WAKER_TOKEN: Token = Token(usize::MAX - 1);

/// Sizing and protection limits of the loop.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Limits {
    pub max_connections: usize,
    pub event_capacity: usize,
    pub read_buffer_size: usize,
    pub max_frame_size: usize,
    pub max_pending_output: usize,
}

pub(crate) struct EventLoop {
    poll: Poll,
    listener: TcpListener,
    connections: Slab<ChatConnection>,
    registry: ConnectionRegistry,
    sink: Arc<dyn LogSink>,
    shutdown: Arc<AtomicBool>,
    limits: Limits,
    scratch: Vec<u8>,
}

impl EventLoop {
    pub(crate) fn new(
        poll: Poll,
        listener: TcpListener,
        registry: ConnectionRegistry,
        sink: Arc<dyn LogSink>,
        shutdown: Arc<AtomicBool>,
        limits: Limits,
    ) -> Self {
        Self {
            poll,
            listener,
            connections: Slab::with_capacity(limits.max_connections),
            registry,
            sink,
            shutdown,
            scratch: vec![0u8; limits.read_buffer_size],
            limits,
        }
    }

    /// Run until shutdown is requested or the poller fails.
    pub(crate) fn run(mut self) -> io::Result<()> {
        let mut events = Events::with_capacity(self.limits.event_capacity);

        info!(
            max_connections = self.limits.max_connections,
            max_frame_size = self.limits.max_frame_size,
            "Event loop started"
        );

        loop {
            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                error!(error = %e, "Poll failed");
                self.close_all();
                return Err(e);
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER_TOKEN => self.accept_connections(),
                    WAKER_TOKEN => trace!("Woken"),
                    Token(conn_id) => {
                        if let Err(e) = self.handle_connection_event(conn_id, event) {
                            self.teardown(conn_id, &e);
                        }
                    }
                }
            }

            if self.shutdown.load(Ordering::Acquire) {
                self.close_all();
                info!("Event loop stopped");
                return Ok(());
            }
        }
    }

    fn accept_connections(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, peer)) => {
                    if self.connections.len() >= self.limits.max_connections {
                        warn!(peer = %peer, "Connection limit reached, rejecting");
                        continue;
                    }
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
                    }

                    let entry = self.connections.vacant_entry();
                    let conn_id = entry.key();
                    let token = Token(conn_id);
                    if let Err(e) =
                        self.poll
                            .registry()
                            .register(&mut stream, token, Interest::READABLE)
                    {
                        warn!(peer = %peer, error = %e, "Failed to register connection");
                        continue;
                    }

                    entry.insert(ChatConnection::new(
                        stream,
                        token,
                        peer,
                        self.limits.max_frame_size,
                        self.limits.max_pending_output,
                    ));
                    debug!(conn_id, peer = %peer, "Accepted connection");
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(ref e) if is_connection_error(e) => {
                    debug!(error = %e, "Pending connection failed before accept");
                    continue;
                }
                Err(e) => {
                    // Out of descriptors or memory: re-arm so the backlog is
                    // reported again on the next poll.
                    warn!(error = %e, "Accept error");
                    if let Err(e) = self.poll.registry().reregister(
                        &mut self.listener,
                        LISTENER_TOKEN,
                        Interest::READABLE,
                    ) {
                        error!(error = %e, "Failed to re-arm listener");
                    }
                    break;
                }
            }
        }
    }

    fn handle_connection_event(
        &mut self,
        conn_id: ConnectionId,
        event: &mio::event::Event,
    ) -> io::Result<()> {
        if !self.connections.contains(conn_id) {
            return Ok(());
        }

        if event.is_readable() || event.is_read_closed() || event.is_error() {
            self.handle_readable(conn_id)?;
        }

        // The connection may have logged out or failed while reading.
        if !self.connections.contains(conn_id) {
            return Ok(());
        }

        if event.is_writable() {
            let conn = self.connections.get_mut(conn_id).ok_or_else(not_found)?;
            conn.flush(self.poll.registry())?;
        }

        self.settle(conn_id);
        Ok(())
    }

    fn handle_readable(&mut self, conn_id: ConnectionId) -> io::Result<()> {
        let conn = self.connections.get_mut(conn_id).ok_or_else(not_found)?;
        let batch = conn.read_frames(&mut self.scratch)?;

        for frame in &batch.frames {
            self.dispatch(conn_id, frame)?;
            if !self.connections.contains(conn_id) {
                return Ok(());
            }
        }

        if batch.eof {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by peer",
            ));
        }
        Ok(())
    }

    /// Run one frame through the handshake and apply its effect.
    fn dispatch(&mut self, conn_id: ConnectionId, frame: &str) -> io::Result<()> {
        let conn = self.connections.get_mut(conn_id).ok_or_else(not_found)?;
        let effect = conn.session.on_frame(frame);
        trace!(conn_id, ?effect, "Frame handled");

        match effect {
            Effect::Challenge { reply } => {
                let conn = self.connections.get_mut(conn_id).ok_or_else(not_found)?;
                conn.send(&reply, self.poll.registry())?;
            }
            Effect::LoggedIn { id } => {
                self.registry.register(conn_id, &id);
                self.sink.append(LogEntry::now(&id, LogEvent::LoggedIn));
                self.broadcast(conn_id, &command::joined(&id));
                info!(conn_id, identity = %id, "Logged in");
            }
            Effect::Chat { id, text } => {
                self.sink
                    .append(LogEntry::now(&id, LogEvent::Message(text.clone())));
                self.broadcast(conn_id, &command::relayed(&id, &text));
            }
            Effect::LoggedOut { id, reply } => {
                self.broadcast(conn_id, &command::left(&id));
                self.sink.append(LogEntry::now(&id, LogEvent::LoggedOut));
                self.registry.deregister(conn_id);
                info!(conn_id, identity = %id, "Logged out");
                let conn = self.connections.get_mut(conn_id).ok_or_else(not_found)?;
                conn.send(&reply, self.poll.registry())?;
            }
            Effect::Dropped(anomaly) => {
                debug!(conn_id, ?anomaly, "Frame dropped");
            }
        }
        Ok(())
    }

    /// Deliver `line` to every registered connection except `sender`.
    ///
    /// Recipients that fail are torn down after the fan-out completes.
    fn broadcast(&mut self, sender: ConnectionId, line: &str) {
        let mut failed = Vec::new();

        for conn_id in self.registry.handles() {
            if conn_id == sender {
                continue;
            }
            let Some(conn) = self.connections.get_mut(conn_id) else {
                continue;
            };
            if let Err(e) = conn.send(line, self.poll.registry()) {
                failed.push((conn_id, e));
            }
        }

        for (conn_id, e) in failed {
            self.teardown(conn_id, &e);
        }
    }

    /// Close a connection that has finished logging out.
    fn settle(&mut self, conn_id: ConnectionId) {
        if self
            .connections
            .get(conn_id)
            .is_some_and(ChatConnection::is_finished)
        {
            self.close_connection(conn_id);
        }
    }

    /// Drop a connection after an I/O error or protocol violation.
    fn teardown(&mut self, conn_id: ConnectionId, reason: &io::Error) {
        match self.registry.identity(conn_id) {
            Some(id) => warn!(conn_id, identity = %id, error = %reason, "Dropping connection"),
            None => debug!(conn_id, error = %reason, "Dropping connection"),
        }
        self.close_connection(conn_id);
    }

    fn close_connection(&mut self, conn_id: ConnectionId) {
        self.registry.deregister(conn_id);
        if let Some(mut conn) = self.connections.try_remove(conn_id) {
            let _ = self.poll.registry().deregister(conn.stream_mut());
            conn.session.close();
            debug!(conn_id, peer = %conn.peer(), "Connection closed");
        }
    }

    /// Log every participant out and close every connection.
    fn close_all(&mut self) {
        for (conn_id, id) in self.registry.entries() {
            // A failed recipient may already have been torn down.
            if !self.registry.contains(conn_id) {
                continue;
            }
            self.registry.deregister(conn_id);
            self.sink.append(LogEntry::now(&id, LogEvent::LoggedOut));
            self.broadcast(conn_id, &command::left(&id));
            if let Some(conn) = self.connections.get_mut(conn_id) {
                let _ = conn.send(&command::logout_confirm(&id), self.poll.registry());
            }
        }

        let remaining: Vec<ConnectionId> = self.connections.iter().map(|(id, _)| id).collect();
        for conn_id in remaining {
            if let Some(conn) = self.connections.get_mut(conn_id) {
                conn.flush_best_effort();
            }
            self.close_connection(conn_id);
        }

        let _ = self.poll.registry().deregister(&mut self.listener);
    }
}

fn not_found() -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, "connection not found")
}

/// Accept failures that concern one queued connection, not the listener.
fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset
    )
}
