//! Command words exchanged between `pingd` clients and the server.
//!
//! Each request is the raw UTF-8 bytes of one command word sent in a single
//! write, and each reply is the raw bytes of one word. There is no length
//! prefix and no terminator: whatever a single read returns is compared
//! against the known words verbatim.


use std::fmt;

pub const PING: &str = "ping";
pub const STOP: &str = "stop";
pub const PONG: &str = "pong";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Liveness probe, answered with `pong`
    Ping,
    /// Close the listener; no reply
    Stop,
    /// Anything else, logged and ignored
    Unknown(String),
}

impl Command {
    pub fn parse(text: &str) -> Self {
        match text {
            PING => Command::Ping,
            STOP => Command::Stop,
            other => Command::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Command::Ping => PING,
            Command::Stop => STOP,
            Command::Unknown(text) => text.as_str(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.as_str().as_bytes()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interpret one read's worth of bytes as text
pub fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
