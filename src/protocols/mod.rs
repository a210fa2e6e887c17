//! Protocol implementations.
//!
//! Each protocol has a parser module used by the runtime event loop and
//! by the client.
//!
//! - `chat`: single-channel chat with a SYN/ACK login handshake

pub mod chat;
