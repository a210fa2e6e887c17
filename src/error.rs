//! Error types shared by the server runtime, the client and configuration.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Framing violations detected while decoding a byte stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// A frame, or an unterminated tail, grew past the configured bound.
    #[error("frame of {len} bytes exceeds the {limit} byte limit")]
    TooLarge { len: usize, limit: usize },

    /// A complete frame was not valid UTF-8.
    #[error("frame is not valid UTF-8")]
    InvalidUtf8,
}

impl From<FrameError> for io::Error {
    fn from(err: FrameError) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, err)
    }
}

/// Errors surfaced by [`crate::runtime::start`] and [`crate::runtime::ServerHandle`].
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("cannot resolve listen address '{0}'")]
    InvalidAddress(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("server I/O error: {0}")]
    Io(#[from] io::Error),

    /// The event loop stopped because its poll instance failed.
    #[error("event loop failed: {0}")]
    EventLoop(#[source] io::Error),

    #[error("event loop did not stop within the shutdown grace period")]
    ShutdownTimeout,
}

/// Errors surfaced by [`crate::client::ChatClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid identity '{0}': must be non-empty, without whitespace and not 'RST'")]
    InvalidIdentity(String),

    #[error("cannot resolve server address '{0}'")]
    InvalidAddress(String),

    #[error("could not connect after {attempts} attempts")]
    ConnectFailed { attempts: u32 },

    #[error("client is not connected")]
    NotConnected,

    #[error("server closed the connection")]
    Disconnected,

    #[error("logout was not confirmed after {attempts} attempts")]
    LogoutUnconfirmed { attempts: u32 },

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("client I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", .path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config file '{}': {source}", .path.display())]
    TomlParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
