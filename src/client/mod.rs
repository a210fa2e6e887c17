//! Chat client.
//!
//! [`ChatClient`] performs the login handshake, sends chat lines, polls for
//! relayed traffic and logs out. Every frame received that is not a
//! handshake reply for this client is appended to its transcript.
//!
//! A client is one session on one connection and is not meant to be shared
//! between threads.

mod correlator;

use crate::error::ClientError;
use crate::protocols::chat::{command, is_valid_identity, Reply, DEFAULT_MAX_FRAME_SIZE};
use correlator::Correlator;
use std::net::{SocketAddr, ToSocketAddrs};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Connection and retry tuning for [`ChatClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub connect_timeout: Duration,
    /// Connection attempts made by `login` before giving up.
    pub login_attempts: u32,
    /// Confirmation rounds waited for by `logout` before giving up.
    pub logout_attempts: u32,
    /// Pause between failed attempts.
    pub retry_backoff: Duration,
    /// How long one handshake turn waits for the server's reply.
    pub reply_timeout: Duration,
    pub max_frame_size: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(1),
            login_attempts: 20,
            logout_attempts: 20,
            retry_backoff: Duration::from_millis(50),
            reply_timeout: Duration::from_secs(1),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

pub struct ChatClient {
    host: String,
    port: u16,
    id: String,
    options: ClientOptions,
    link: Option<Correlator>,
    transcript: String,
}

impl ChatClient {
    pub fn new(host: &str, port: u16, id: &str) -> Result<Self, ClientError> {
        Self::with_options(host, port, id, ClientOptions::default())
    }

    pub fn with_options(
        host: &str,
        port: u16,
        id: &str,
        options: ClientOptions,
    ) -> Result<Self, ClientError> {
        if !is_valid_identity(id) {
            return Err(ClientError::InvalidIdentity(id.to_string()));
        }
        Ok(Self {
            host: host.to_string(),
            port,
            id: id.to_string(),
            options,
            link: None,
            transcript: format!("=== {id} chat view\n"),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Everything received so far, one line per chat frame.
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    pub fn is_connected(&self) -> bool {
        self.link.as_ref().is_some_and(|link| !link.is_closed())
    }

    /// Connect and complete the `SYN`/`SYN ACK`/`ACK` handshake.
    ///
    /// Each failed attempt releases its connection and backs off. Once the
    /// attempt ceiling is hit a failure line is added to the transcript and
    /// the client stays closed.
    pub fn login(&mut self) -> Result<(), ClientError> {
        self.close();
        let addr = self.resolve()?;
        let attempts = self.options.login_attempts;

        for attempt in 1..=attempts {
            match Correlator::connect(
                addr,
                self.options.connect_timeout,
                self.options.max_frame_size,
            ) {
                Ok(link) => {
                    self.link = Some(link);
                    match self.handshake() {
                        Ok(true) => {
                            info!(identity = %self.id, server = %addr, "Logged in");
                            return Ok(());
                        }
                        Ok(false) => debug!(attempt, "Login not acknowledged"),
                        Err(e) => debug!(attempt, error = %e, "Login attempt failed"),
                    }
                    self.close();
                }
                Err(e) => debug!(attempt, server = %addr, error = %e, "Connect failed"),
            }

            if attempt < attempts {
                thread::sleep(self.options.retry_backoff);
            }
        }

        warn!(identity = %self.id, server = %addr, attempts, "Server unreachable, giving up");
        self.transcript
            .push_str(&format!("*** {} could not reach the server at {addr}\n", self.id));
        Err(ClientError::ConnectFailed { attempts })
    }

    /// Send `SYN RST <id>` and wait for the confirmation.
    ///
    /// The request is re-sent only after a round that received nothing.
    /// The connection is closed locally in every outcome.
    pub fn logout(&mut self) -> Result<(), ClientError> {
        if self.link.is_none() {
            return Err(ClientError::NotConnected);
        }

        let request = command::logout_request(&self.id);
        let attempts = self.options.logout_attempts;
        let timeout = Some(self.options.reply_timeout);
        let mut resend = true;

        for attempt in 1..=attempts {
            let turn = if resend {
                self.exchange(&request, timeout)
            } else {
                self.receive(timeout)
            };

            match turn {
                Ok(replies) if replies.contains(&Reply::LogoutConfirmed) => {
                    info!(identity = %self.id, "Logged out");
                    self.close();
                    return Ok(());
                }
                Ok(replies) => {
                    debug!(attempt, "Logout not confirmed yet");
                    resend = replies.is_empty();
                }
                Err(e) => {
                    debug!(attempt, error = %e, "Logout interrupted");
                    break;
                }
            }

            if resend && attempt < attempts {
                thread::sleep(self.options.retry_backoff);
            }
        }

        warn!(identity = %self.id, "Server did not confirm logout, closing anyway");
        self.close();
        Err(ClientError::LogoutUnconfirmed { attempts })
    }

    /// Send a chat line. Nothing is awaited.
    pub fn send_message(&mut self, text: &str) -> Result<(), ClientError> {
        let link = self.link.as_mut().ok_or(ClientError::NotConnected)?;
        link.send(text)
    }

    /// Send an arbitrary command and wait for the next batch of frames.
    ///
    /// A `None` or zero timeout waits until data arrives or the connection
    /// closes.
    pub fn request(
        &mut self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<Vec<Reply>, ClientError> {
        self.exchange(command, non_zero(timeout))
    }

    /// Wait up to `wait` for relayed traffic and add it to the transcript.
    ///
    /// Returns the number of transcript lines added. A `None` or zero wait
    /// blocks until something arrives.
    pub fn poll_chat(&mut self, wait: Option<Duration>) -> Result<usize, ClientError> {
        let replies = self.receive(non_zero(wait))?;
        Ok(replies.iter().filter(|reply| !reply.is_control()).count())
    }

    /// Drop the connection without talking to the server.
    pub fn close(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.shutdown();
        }
    }

    fn handshake(&mut self) -> Result<bool, ClientError> {
        let replies = self.exchange(
            &command::login_request(&self.id),
            Some(self.options.reply_timeout),
        )?;
        if !replies.contains(&Reply::LoginAccepted) {
            return Ok(false);
        }

        let link = self.link.as_mut().ok_or(ClientError::NotConnected)?;
        link.send(&command::login_confirm(&self.id))?;
        Ok(true)
    }

    fn exchange(
        &mut self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<Vec<Reply>, ClientError> {
        let link = self.link.as_mut().ok_or(ClientError::NotConnected)?;
        let frames = link.request(command, timeout)?;
        Ok(self.absorb(frames))
    }

    fn receive(&mut self, timeout: Option<Duration>) -> Result<Vec<Reply>, ClientError> {
        let link = self.link.as_mut().ok_or(ClientError::NotConnected)?;
        let frames = link.receive(timeout)?;
        Ok(self.absorb(frames))
    }

    /// Classify frames, appending chat frames to the transcript.
    fn absorb(&mut self, frames: Vec<String>) -> Vec<Reply> {
        frames
            .into_iter()
            .map(|frame| {
                let reply = Reply::classify(frame, &self.id);
                if let Reply::Chat(line) = &reply {
                    self.transcript.push_str(line);
                    self.transcript.push('\n');
                }
                reply
            })
            .collect()
    }

    fn resolve(&self) -> Result<SocketAddr, ClientError> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| ClientError::InvalidAddress(format!("{}:{}", self.host, self.port)))
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        self.close();
    }
}

fn non_zero(timeout: Option<Duration>) -> Option<Duration> {
    timeout.filter(|t| !t.is_zero())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_identity() {
        assert!(matches!(
            ChatClient::new("127.0.0.1", 1, "two words"),
            Err(ClientError::InvalidIdentity(_))
        ));
        assert!(matches!(
            ChatClient::new("127.0.0.1", 1, "RST"),
            Err(ClientError::InvalidIdentity(_))
        ));
    }

    #[test]
    fn test_transcript_header() {
        let client = ChatClient::new("127.0.0.1", 1, "alice").unwrap();
        assert_eq!(client.transcript(), "=== alice chat view\n");
        assert!(!client.is_connected());
    }

    #[test]
    fn test_operations_need_connection() {
        let mut client = ChatClient::new("127.0.0.1", 1, "alice").unwrap();
        assert!(matches!(
            client.send_message("hi"),
            Err(ClientError::NotConnected)
        ));
        assert!(matches!(client.logout(), Err(ClientError::NotConnected)));
        assert!(matches!(
            client.poll_chat(Some(Duration::from_millis(1))),
            Err(ClientError::NotConnected)
        ));
    }

    #[test]
    fn test_absorb_filters_control_frames() {
        let mut client = ChatClient::new("127.0.0.1", 1, "alice").unwrap();
        let replies = client.absorb(vec![
            "SYN alice ACK".to_string(),
            "bob logged in".to_string(),
            "bob: hi".to_string(),
            "SYN RST alice ACK".to_string(),
        ]);

        assert_eq!(replies.len(), 4);
        assert_eq!(replies[0], Reply::LoginAccepted);
        assert_eq!(replies[3], Reply::LogoutConfirmed);
        assert_eq!(
            client.transcript(),
            "=== alice chat view\nbob logged in\nbob: hi\n"
        );
    }

    #[test]
    fn test_non_zero() {
        assert_eq!(non_zero(Some(Duration::ZERO)), None);
        assert_eq!(non_zero(None), None);
        assert_eq!(
            non_zero(Some(Duration::from_millis(5))),
            Some(Duration::from_millis(5))
        );
    }
}
