//! Server runtime.
//!
//! A single mio event loop (epoll on Linux, kqueue on macOS) serves every
//! chat connection:
//! - `connection`: per-connection socket, carry buffer and output queue
//! - `registry`: authenticated connections, shared with other threads
//! - `event_loop`: accept/read/write dispatch and broadcast fan-out
//!
//! [`start`] binds the listener before returning, so a returned
//! [`ServerHandle`] means clients can connect.

mod connection;
mod event_loop;
mod registry;

pub use registry::{ConnectionId, ConnectionRegistry};

use crate::config::Config;
use crate::error::ServerError;
use crate::server_log::LogSink;
use event_loop::{EventLoop, Limits, LISTENER_TOKEN, WAKER_TOKEN};
use mio::net::TcpListener;
use mio::{Interest, Poll, Waker};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{error, info, warn};

/// Bind the listener and start the event loop thread.
pub fn start(config: &Config, sink: Arc<dyn LogSink>) -> Result<ServerHandle, ServerError> {
    let addr = resolve(&config.host, config.port)?;

    let listener = create_listener(addr).map_err(|source| ServerError::Bind { addr, source })?;
    let local_addr = listener.local_addr()?;
    let mut listener = TcpListener::from_std(listener);

    let poll = Poll::new()?;
    poll.registry()
        .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;
    let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN)?);

    let registry = ConnectionRegistry::new();
    let shutdown = Arc::new(AtomicBool::new(false));
    let limits = Limits {
        max_connections: config.max_connections,
        event_capacity: config.event_capacity,
        read_buffer_size: config.read_buffer_size,
        max_frame_size: config.max_frame_size,
        max_pending_output: config.max_pending_output,
    };
    let event_loop = EventLoop::new(
        poll,
        listener,
        registry.clone(),
        sink,
        Arc::clone(&shutdown),
        limits,
    );

    let (done_tx, done_rx) = mpsc::channel();
    let thread = thread::Builder::new()
        .name("chat-reactor".to_string())
        .spawn(move || {
            let result = event_loop.run();
            if let Err(e) = &result {
                error!(error = %e, "Event loop failed");
            }
            let _ = done_tx.send(result);
        })?;

    info!(addr = %local_addr, "Chat server listening");

    Ok(ServerHandle {
        local_addr,
        registry,
        shutdown,
        waker,
        done: done_rx,
        thread: Some(thread),
        grace: config.shutdown_grace,
    })
}

/// Control handle for a running server.
///
/// Dropping the handle stops the server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    registry: ConnectionRegistry,
    shutdown: Arc<AtomicBool>,
    waker: Arc<Waker>,
    done: mpsc::Receiver<io::Result<()>>,
    thread: Option<JoinHandle<()>>,
    grace: Duration,
}

impl ServerHandle {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Live view of the authenticated connections.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the event loop.
    ///
    /// Wakes the loop, which logs out and closes every connection before
    /// exiting. Waits at most the configured grace period; a loop that has
    /// not finished by then is detached. Calling `stop` again is a no-op.
    pub fn stop(&mut self) -> Result<(), ServerError> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };

        self.shutdown.store(true, Ordering::Release);
        if let Err(e) = self.waker.wake() {
            warn!(error = %e, "Failed to wake event loop");
        }

        match self.done.recv_timeout(self.grace) {
            Ok(result) => {
                let _ = thread.join();
                info!(addr = %self.local_addr, "Chat server stopped");
                result.map_err(ServerError::EventLoop)
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!(grace = ?self.grace, "Event loop did not stop in time, detaching");
                Err(ServerError::ShutdownTimeout)
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                // The loop thread panicked before reporting.
                let _ = thread.join();
                error!(addr = %self.local_addr, "Event loop panicked");
                Err(ServerError::EventLoop(io::Error::other("event loop panicked")))
            }
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr, ServerError> {
    (host, port)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| ServerError::InvalidAddress(format!("{host}:{port}")))
}

/// Create a non-blocking TCP listener with SO_REUSEADDR.
fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;

    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server_log::ServerLog;

    fn local_config() -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..Config::default()
        }
    }

    #[test]
    fn test_start_reports_bound_port() {
        let mut server = start(&local_config(), Arc::new(ServerLog::new())).unwrap();
        assert_ne!(server.local_addr().port(), 0);
        assert!(server.is_running());
        assert!(server.registry().is_empty());

        server.stop().unwrap();
        assert!(!server.is_running());
        server.stop().unwrap();
    }

    #[test]
    fn test_bind_conflict_is_fatal() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let config = Config {
            port: taken.local_addr().unwrap().port(),
            ..local_config()
        };

        match start(&config, Arc::new(ServerLog::new())) {
            Err(ServerError::Bind { addr, .. }) => assert_eq!(addr.port(), config.port),
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("bind should have failed"),
        }
    }

    #[test]
    fn test_stop_reports_dead_event_loop() {
        let poll = Poll::new().unwrap();
        let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN).unwrap());
        let (done_tx, done_rx) = mpsc::channel::<io::Result<()>>();
        let thread = thread::spawn(move || {
            let _done = done_tx;
            panic!("reactor died");
        });

        let mut server = ServerHandle {
            local_addr: "127.0.0.1:7878".parse().unwrap(),
            registry: ConnectionRegistry::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
            waker,
            done: done_rx,
            thread: Some(thread),
            grace: Duration::from_secs(5),
        };

        assert!(matches!(server.stop(), Err(ServerError::EventLoop(_))));
        assert!(!server.is_running());
    }

    #[test]
    fn test_unresolvable_host() {
        let config = Config {
            host: "definitely not a host".to_string(),
            ..local_config()
        };
        assert!(matches!(
            start(&config, Arc::new(ServerLog::new())),
            Err(ServerError::InvalidAddress(_))
        ));
    }
}
