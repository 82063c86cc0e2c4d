//! Socket pattern types.
//!
//! Each [`SocketType`] has a fixed [`PatternRole`] that decides whether it may
//! send, receive, or both, and a compatibility relation checked when two
//! sockets are joined.

use std::fmt;
use std::str::FromStr;

/// Socket pattern types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SocketType {
    /// PAIR socket for exclusive bidirectional communication
    Pair = 0,

    /// REQ socket for synchronous request-reply client
    Req = 3,

    /// REP socket for synchronous request-reply server
    Rep = 4,

    /// PULL socket for receiving messages from pushers
    Pull = 7,

    /// PUSH socket for sending messages to pullers
    Push = 8,
}

/// Direction of message flow a socket type allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternRole {
    /// May only send (PUSH)
    Source,
    /// May only receive (PULL)
    Sink,
    /// May send and receive (PAIR, REQ, REP)
    Bidirectional,
}

impl SocketType {
    /// Legacy name for [`SocketType::Pull`].
    pub const UPSTREAM: SocketType = SocketType::Pull;

    /// Legacy name for [`SocketType::Push`].
    pub const DOWNSTREAM: SocketType = SocketType::Push;

    /// Get the socket type as a string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pair => "PAIR",
            Self::Req => "REQ",
            Self::Rep => "REP",
            Self::Pull => "PULL",
            Self::Push => "PUSH",
        }
    }

    /// Direction of message flow for this pattern.
    pub const fn role(&self) -> PatternRole {
        match self {
            Self::Push => PatternRole::Source,
            Self::Pull => PatternRole::Sink,
            Self::Pair | Self::Req | Self::Rep => PatternRole::Bidirectional,
        }
    }

    /// True if `send` is part of this pattern.
    pub const fn can_send(&self) -> bool {
        !matches!(self.role(), PatternRole::Sink)
    }

    /// True if `recv` is part of this pattern.
    pub const fn can_recv(&self) -> bool {
        !matches!(self.role(), PatternRole::Source)
    }

    /// True if the pattern allows at most one attached peer.
    pub const fn is_exclusive(&self) -> bool {
        matches!(self, Self::Pair)
    }

    /// Check if this socket type is compatible with the given peer type.
    pub fn is_compatible(&self, peer: SocketType) -> bool {
        matches!(
            (self, peer),
            (Self::Pair, Self::Pair)
                | (Self::Req, Self::Rep)
                | (Self::Rep, Self::Req)
                | (Self::Push, Self::Pull)
                | (Self::Pull, Self::Push)
        )
    }
}

impl fmt::Display for SocketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SocketType {
    type Err = crate::error::TetherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PAIR" => Ok(Self::Pair),
            "REQ" => Ok(Self::Req),
            "REP" => Ok(Self::Rep),
            "PULL" | "UPSTREAM" => Ok(Self::Pull),
            "PUSH" | "DOWNSTREAM" => Ok(Self::Push),
            other => Err(crate::error::TetherError::invalid_argument(format!(
                "unknown socket type: {other}"
            ))),
        }
    }
}
