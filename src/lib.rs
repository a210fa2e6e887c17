//! chatline: a single-channel text chat service
//!
//! Clients log in with a three-step handshake, then every line they send is
//! relayed to all other logged-in participants.
//!
//! Components:
//! - Frame codec and handshake state machine (`protocols::chat`)
//! - Single-threaded mio event loop with broadcast fan-out (`runtime`)
//! - Blocking client with request/reply correlation (`client`)
//! - Timestamped server log (`server_log`)
//! - Configuration via CLI arguments or TOML file (`config`)

pub mod client;
pub mod config;
pub mod error;
pub mod protocols;
pub mod runtime;
pub mod server_log;

pub use client::{ChatClient, ClientOptions};
pub use config::Config;
pub use error::{ClientError, ConfigError, FrameError, ServerError};
pub use runtime::{start, ConnectionRegistry, ServerHandle};
pub use server_log::{LogEntry, LogEvent, LogSink, ServerLog, TracingSink};
