//! Command vocabulary of the chat protocol.
//!
//! ```text
//! C->S  SYN <id>            login request
//! S->C  SYN <id> ACK        login challenge
//! C->S  ACK <id>            login confirmation
//! C->S  SYN RST <id>        logout request
//! S->C  SYN RST <id> ACK    logout confirmation
//! S->C  <id> logged in      join notification
//! S->C  <id> logged out     leave notification
//! C->S  <text>              chat message
//! S->C  <id>: <text>        relayed chat message
//! ```
//!
//! Fields are separated by a single space. Identities are opaque tokens
//! without whitespace.

const SYN: &str = "SYN";
const ACK: &str = "ACK";
const RST: &str = "RST";

/// A frame received by the server, classified by shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    /// `SYN <id>`
    Login(&'a str),
    /// `ACK <id>`
    Confirm(&'a str),
    /// `SYN RST <id>`
    Logout(&'a str),
    /// Anything else.
    Text(&'a str),
}

impl<'a> Request<'a> {
    pub fn parse(frame: &'a str) -> Self {
        let parts: Vec<&str> = frame.split(' ').collect();
        match parts.as_slice() {
            [SYN, RST, id] if is_valid_identity(id) => Request::Logout(*id),
            [SYN, id] if is_valid_identity(id) => Request::Login(*id),
            [ACK, id] if is_valid_identity(id) => Request::Confirm(*id),
            _ => Request::Text(frame),
        }
    }
}

/// A frame received by a client, classified against its own identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `SYN <id> ACK` for this client.
    LoginAccepted,
    /// `SYN RST <id> ACK` for this client.
    LogoutConfirmed,
    /// Everything that belongs in the chat transcript.
    Chat(String),
}

impl Reply {
    pub fn classify(frame: String, identity: &str) -> Self {
        if frame == login_challenge(identity) {
            Reply::LoginAccepted
        } else if frame == logout_confirm(identity) {
            Reply::LogoutConfirmed
        } else {
            Reply::Chat(frame)
        }
    }

    pub fn is_control(&self) -> bool {
        !matches!(self, Reply::Chat(_))
    }
}

/// Whether `id` can be carried in a handshake frame.
pub fn is_valid_identity(id: &str) -> bool {
    !id.is_empty() && id != RST && !id.chars().any(char::is_whitespace)
}

pub fn login_request(id: &str) -> String {
    format!("{SYN} {id}")
}

pub fn login_challenge(id: &str) -> String {
    format!("{SYN} {id} {ACK}")
}

pub fn login_confirm(id: &str) -> String {
    format!("{ACK} {id}")
}

pub fn logout_request(id: &str) -> String {
    format!("{SYN} {RST} {id}")
}

pub fn logout_confirm(id: &str) -> String {
    format!("{SYN} {RST} {id} {ACK}")
}

pub fn joined(id: &str) -> String {
    format!("{id} logged in")
}

pub fn left(id: &str) -> String {
    format!("{id} logged out")
}

pub fn relayed(id: &str, text: &str) -> String {
    format!("{id}: {text}")
}
