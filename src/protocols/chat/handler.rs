//! Server-side handshake state machine.
//!
//! A [`Session`] is attached to every accepted connection. It performs no
//! I/O: each decoded frame is turned into exactly one [`Effect`], and the
//! event loop carries the effect out (replies, registry updates, broadcasts
//! and log entries).

use super::command::{self, Request};

/// Handshake progress of one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeState {
    /// Accepted, no login request yet.
    New,
    /// `SYN <id>` answered; waiting for the exact `expected` confirmation.
    AwaitingAck { id: String, expected: String },
    /// Logged in. `confirmation` is kept to drop retransmitted `ACK`s.
    Authenticated { id: String, confirmation: String },
    /// Logout confirmed; the connection closes once the reply is flushed.
    LoggingOut { id: String },
    Closed,
}

/// Why a frame had no effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anomaly {
    /// Anything but `SYN <id>` before login.
    NotLoggedIn,
    /// Anything but the expected `ACK <id>` or a fresh `SYN <id>` mid-handshake.
    UnexpectedConfirmation,
    /// A second copy of the login confirmation.
    DuplicateConfirmation,
    /// `SYN RST <id>` naming another participant.
    ForeignLogout,
    EmptyMessage,
    /// Frames arriving after logout.
    Closing,
}

/// What the event loop must do in response to one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Send the login challenge back to this connection.
    Challenge { reply: String },
    /// Register the identity, announce it and log the login.
    LoggedIn { id: String },
    /// Relay `text` from `id` to everyone else and log it.
    Chat { id: String, text: String },
    /// Announce and log the logout, deregister, send `reply`, then close.
    LoggedOut { id: String, reply: String },
    Dropped(Anomaly),
}

#[derive(Debug)]
pub struct Session {
    state: HandshakeState,
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: HandshakeState::New,
        }
    }

    pub fn state(&self) -> &HandshakeState {
        &self.state
    }

    /// Identity committed by a completed login.
    pub fn identity(&self) -> Option<&str> {
        match &self.state {
            HandshakeState::Authenticated { id, .. } | HandshakeState::LoggingOut { id } => {
                Some(id)
            }
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, HandshakeState::Authenticated { .. })
    }

    pub fn is_logging_out(&self) -> bool {
        matches!(self.state, HandshakeState::LoggingOut { .. })
    }

    /// Advance the handshake with one complete frame.
    pub fn on_frame(&mut self, frame: &str) -> Effect {
        match &self.state {
            HandshakeState::New => match Request::parse(frame) {
                Request::Login(id) => self.challenge(id),
                _ => Effect::Dropped(Anomaly::NotLoggedIn),
            },
            HandshakeState::AwaitingAck { id, expected } => {
                if frame == expected {
                    let id = id.clone();
                    self.state = HandshakeState::Authenticated {
                        id: id.clone(),
                        confirmation: frame.to_string(),
                    };
                    Effect::LoggedIn { id }
                } else if let Request::Login(id) = Request::parse(frame) {
                    self.challenge(id)
                } else {
                    Effect::Dropped(Anomaly::UnexpectedConfirmation)
                }
            }
            HandshakeState::Authenticated { id, confirmation } => {
                if frame == confirmation {
                    return Effect::Dropped(Anomaly::DuplicateConfirmation);
                }
                match Request::parse(frame) {
                    Request::Logout(target) if target == id => {
                        let id = id.clone();
                        let reply = command::logout_confirm(&id);
                        self.state = HandshakeState::LoggingOut { id: id.clone() };
                        Effect::LoggedOut { id, reply }
                    }
                    Request::Logout(_) => Effect::Dropped(Anomaly::ForeignLogout),
                    _ if frame.is_empty() => Effect::Dropped(Anomaly::EmptyMessage),
                    _ => Effect::Chat {
                        id: id.clone(),
                        text: frame.to_string(),
                    },
                }
            }
            HandshakeState::LoggingOut { .. } | HandshakeState::Closed => {
                Effect::Dropped(Anomaly::Closing)
            }
        }
    }

    /// Move to `Closed`, returning the identity if one had been committed.
    pub fn close(&mut self) -> Option<String> {
        match std::mem::replace(&mut self.state, HandshakeState::Closed) {
            HandshakeState::Authenticated { id, .. } | HandshakeState::LoggingOut { id } => {
                Some(id)
            }
            _ => None,
        }
    }

    fn challenge(&mut self, id: &str) -> Effect {
        self.state = HandshakeState::AwaitingAck {
            id: id.to_string(),
            expected: command::login_confirm(id),
        };
        Effect::Challenge {
            reply: command::login_challenge(id),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
