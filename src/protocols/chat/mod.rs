//! Chat protocol implementation.
//!
//! A line-oriented text protocol with a three-step login handshake:
//! - `codec`: delimiter framing over a byte stream
//! - `command`: frame shapes and identity rules
//! - `handler`: per-connection handshake state machine
//!
//! ## Protocol Format
//!
//! ```text
//! Client: SYN alice      Server: SYN alice ACK
//! Client: ACK alice      Server (to others): alice logged in
//! Client: hello          Server (to others): alice: hello
//! Client: SYN RST alice  Server: SYN RST alice ACK
//!                        Server (to others): alice logged out
//! ```
//!
//! Each frame is terminated by [`codec::DELIMITER`].

pub mod codec;
pub mod command;
pub mod handler;

pub use codec::{encode, encode_into, FrameDecoder, DEFAULT_MAX_FRAME_SIZE, DELIMITER};
pub use command::{is_valid_identity, Reply, Request};
pub use handler::{Anomaly, Effect, HandshakeState, Session};
