//! Tether error types.
//!
//! Every fallible operation in the workspace reports a [`TetherError`].

use crate::endpoint::{Endpoint, EndpointError};
use crate::socket_type::SocketType;
use crate::state::TransitionError;
use std::time::Duration;
use thiserror::Error;

/// Main error type for Tether operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TetherError {
    /// Address string could not be parsed
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(#[from] EndpointError),

    /// Event filter is empty or carries unknown bits
    #[error("Invalid event mask: {0:#x}")]
    InvalidEventMask(u32),

    /// Rejected option or argument value
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Another live socket already listens on this address
    #[error("Address already in use: {0}")]
    AddressInUse(Endpoint),

    /// `unbind` on an address the socket does not listen on
    #[error("Endpoint not bound: {0}")]
    NotBound(Endpoint),

    /// `disconnect` on an address the socket never connected to
    #[error("Endpoint not connected: {0}")]
    NotConnected(Endpoint),

    /// Operation is not part of the socket's pattern (e.g. `recv` on PUSH)
    #[error("{op} is not supported by {socket_type} sockets")]
    Unsupported {
        socket_type: SocketType,
        op: &'static str,
    },

    /// Pattern sequencing violated (e.g. REQ `send` twice without `recv`)
    #[error("Operation not valid in current state: {0}")]
    InvalidState(&'static str),

    /// State machine rejected a trigger
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Non-blocking operation could not complete immediately
    #[error("Operation would block")]
    WouldBlock,

    /// Blocking operation exceeded its configured timeout
    #[error("Operation timed out after {0:?}")]
    TimedOut(Duration),

    /// Socket closed
    #[error("Socket closed")]
    SocketClosed,

    /// Monitor closed
    #[error("Monitor closed")]
    MonitorClosed,

    /// Owning context was terminated
    #[error("Context terminated")]
    ContextTerminated,

    /// Context refused to create another socket
    #[error("Too many sockets (max: {max})")]
    TooManySockets { max: usize },

    /// Background reactor could not be started or reached
    #[error("Reactor unavailable: {0}")]
    Reactor(String),
}

/// Result type alias for Tether operations
pub type Result<T> = std::result::Result<T, TetherError>;

impl TetherError {
    /// Create an invalid argument error with a message
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Check if retrying the same operation later can succeed
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::WouldBlock | Self::TimedOut(_) | Self::AddressInUse(_)
        )
    }

    /// Check if this error reports a closed resource
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(
            self,
            Self::SocketClosed | Self::MonitorClosed | Self::ContextTerminated
        )
    }
}
