//! Connection lifecycle state machine.
//!
//! Pure transition table: no I/O, no clocks. A [`Lifecycle`] tracks one
//! attachment of a socket (a bound address or a connected address) and maps
//! every accepted [`Trigger`] to exactly one [`EventKind`]. The runtime emits
//! that event to monitors while it still holds the socket lock, which keeps
//! state and event stream in lockstep.
//!
//! ```text
//! bind:     Init ──Bind──▶ Listening ──Accept──▶ Accepted ──PeerLost(0)──▶ Disconnected
//!                                         ▲                                    │
//!                                         └──────────────Accept────────────────┘
//!
//! connect:  Init ──Connect──▶ ConnectDelayed ──HandshakeOk──▶ Connected
//!                                ▲      │                        │
//!                       RetryFired      AttemptFailed          PeerLost
//!                                │      ▼                        ▼
//!                               Retrying ◀──RetryScheduled── Disconnected
//!
//! any non-closed state ──Close──▶ Closed
//! ```

use crate::monitor::EventKind;
use std::fmt;

/// Which side of a connection an attachment plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Passive side: `bind`
    Bind,
    /// Active side: `connect`
    Connect,
}

/// Lifecycle state of one attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Created, nothing attempted yet
    Init,
    /// Bound and waiting for peers (bind only)
    Listening,
    /// Connection attempt in flight (connect only)
    ConnectDelayed,
    /// Handshake completed (connect only)
    Connected,
    /// At least one peer attached (bind only)
    Accepted,
    /// Peer lost
    Disconnected,
    /// Waiting for the retry timer (connect only)
    Retrying,
    /// Terminal
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Init => "INIT",
            Self::Listening => "LISTENING",
            Self::ConnectDelayed => "CONNECT_DELAYED",
            Self::Connected => "CONNECTED",
            Self::Accepted => "ACCEPTED",
            Self::Disconnected => "DISCONNECTED",
            Self::Retrying => "RETRYING",
            Self::Closed => "CLOSED",
        };
        f.write_str(s)
    }
}

/// Input to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// Address registered successfully
    Bind,
    /// Address registration refused
    BindFailed,
    /// Inbound peer attached
    Accept,
    /// Inbound peer rejected
    AcceptFailed,
    /// `connect` called
    Connect,
    /// Outbound handshake succeeded
    HandshakeOk,
    /// Outbound attempt found no usable peer
    AttemptFailed,
    /// A peer went away; `remaining` peers are still attached
    PeerLost { remaining: usize },
    /// Retry timer armed after a disconnect
    RetryScheduled,
    /// Retry timer expired
    RetryFired,
    /// Releasing the attachment failed
    CloseFailed,
    /// Explicit close
    Close,
}

/// A trigger that the current state does not accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{role:?} attachment in state {state} cannot handle {trigger:?}")]
pub struct TransitionError {
    pub role: Role,
    pub state: ConnectionState,
    pub trigger: Trigger,
}

/// State machine for one attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifecycle {
    role: Role,
    state: ConnectionState,
}

impl Lifecycle {
    /// Fresh lifecycle in `Init`.
    pub const fn new(role: Role) -> Self {
        Self {
            role,
            state: ConnectionState::Init,
        }
    }

    #[inline]
    pub const fn role(&self) -> Role {
        self.role
    }

    #[inline]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    #[inline]
    pub const fn is_closed(&self) -> bool {
        matches!(self.state, ConnectionState::Closed)
    }

    /// Compute the next state and the event it emits, without applying it.
    pub fn peek(
        &self,
        trigger: Trigger,
    ) -> Result<(ConnectionState, EventKind), TransitionError> {
        use ConnectionState as S;
        use Trigger as T;

        let next = match (self.role, self.state, trigger) {
            (_, S::Closed, _) => None,
            (_, _, T::Close) => Some((S::Closed, EventKind::Closed)),
            (_, state, T::CloseFailed) => Some((state, EventKind::CloseFailed)),

            (Role::Bind, S::Init, T::Bind) => Some((S::Listening, EventKind::Listening)),
            (Role::Bind, S::Init, T::BindFailed) => Some((S::Init, EventKind::BindFailed)),
            (Role::Bind, S::Listening | S::Accepted | S::Disconnected, T::Accept) => {
                Some((S::Accepted, EventKind::Accepted))
            }
            (Role::Bind, state @ (S::Listening | S::Accepted | S::Disconnected), T::AcceptFailed) => {
                Some((state, EventKind::AcceptFailed))
            }
            (Role::Bind, S::Accepted, T::PeerLost { remaining: 0 }) => {
                Some((S::Disconnected, EventKind::Disconnected))
            }
            (Role::Bind, S::Accepted, T::PeerLost { .. }) => {
                Some((S::Accepted, EventKind::Disconnected))
            }

            (Role::Connect, S::Init, T::Connect) => {
                Some((S::ConnectDelayed, EventKind::ConnectDelayed))
            }
            (Role::Connect, S::ConnectDelayed, T::HandshakeOk) => {
                Some((S::Connected, EventKind::Connected))
            }
            (Role::Connect, S::ConnectDelayed, T::AttemptFailed) => {
                Some((S::Retrying, EventKind::ConnectRetried))
            }
            (Role::Connect, S::Connected, T::PeerLost { .. }) => {
                Some((S::Disconnected, EventKind::Disconnected))
            }
            (Role::Connect, S::Disconnected, T::RetryScheduled) => {
                Some((S::Retrying, EventKind::ConnectRetried))
            }
            (Role::Connect, S::Retrying, T::RetryFired) => {
                Some((S::ConnectDelayed, EventKind::ConnectDelayed))
            }

            _ => None,
        };

        match next {
            Some(pair) => Ok(pair),
            None => Err(TransitionError {
                role: self.role,
                state: self.state,
                trigger,
            }),
        }
    }

    /// Apply `trigger`, returning the event kind to emit.
    ///
    /// On error the state is left untouched.
    pub fn apply(&mut self, trigger: Trigger) -> Result<EventKind, TransitionError> {
        let (next, event) = self.peek(trigger)?;
        tracing::trace!(
            "[STATE] {:?} {} --{:?}--> {} ({})",
            self.role,
            self.state,
            trigger,
            next,
            event
        );
        self.state = next;
        Ok(event)
    }
}
