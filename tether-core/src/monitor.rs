//! Socket event monitoring types.
//!
//! Lifecycle events emitted by the connection state machine, and the bitmask
//! used by monitors to subscribe to a subset of them. Numeric values match the
//! classic monitor event codes so masks built from raw integers keep working.

use crate::endpoint::Endpoint;
use crate::error::{Result, TetherError};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::time::Duration;

/// Kind of a socket lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum EventKind {
    /// Connect-side handshake completed.
    Connected = 0x0001,
    /// Connect-side attempt is in progress.
    ConnectDelayed = 0x0002,
    /// Connect-side retry has been scheduled.
    ConnectRetried = 0x0004,
    /// Bind-side socket is listening.
    Listening = 0x0008,
    /// Bind attempt failed.
    BindFailed = 0x0010,
    /// Bind-side socket accepted a peer.
    Accepted = 0x0020,
    /// Bind-side socket rejected a peer.
    AcceptFailed = 0x0040,
    /// Socket closed. Always the last event a monitor receives.
    Closed = 0x0080,
    /// Releasing an attachment failed.
    CloseFailed = 0x0100,
    /// A peer went away.
    Disconnected = 0x0200,
}

impl EventKind {
    /// Every kind, in bit order.
    pub const ALL: [EventKind; 10] = [
        Self::Connected,
        Self::ConnectDelayed,
        Self::ConnectRetried,
        Self::Listening,
        Self::BindFailed,
        Self::Accepted,
        Self::AcceptFailed,
        Self::Closed,
        Self::CloseFailed,
        Self::Disconnected,
    ];

    /// Bit value of this kind.
    #[inline]
    pub const fn bit(self) -> u32 {
        self as u32
    }

    /// Upper-case name, e.g. `CONNECT_DELAYED`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "CONNECTED",
            Self::ConnectDelayed => "CONNECT_DELAYED",
            Self::ConnectRetried => "CONNECT_RETRIED",
            Self::Listening => "LISTENING",
            Self::BindFailed => "BIND_FAILED",
            Self::Accepted => "ACCEPTED",
            Self::AcceptFailed => "ACCEPT_FAILED",
            Self::Closed => "CLOSED",
            Self::CloseFailed => "CLOSE_FAILED",
            Self::Disconnected => "DISCONNECTED",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of event kinds a monitor subscribes to.
///
/// # Examples
///
/// ```
/// use tether_core::monitor::{EventKind, EventMask};
///
/// let mask = EventKind::Accepted | EventKind::Closed;
/// assert!(mask.contains(EventKind::Closed));
/// assert!(!mask.contains(EventKind::Listening));
/// assert_eq!(mask.bits(), 0x00a0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventMask(u32);

impl EventMask {
    /// Every event kind.
    pub const ALL: EventMask = EventMask(0x03ff);

    /// Build a mask from raw bits.
    ///
    /// Rejects the empty mask and any bit outside the ten known kinds.
    pub fn from_bits(bits: u32) -> Result<Self> {
        if bits == 0 || bits & !Self::ALL.0 != 0 {
            return Err(TetherError::InvalidEventMask(bits));
        }
        Ok(Self(bits))
    }

    /// Mask containing a single kind.
    pub const fn only(kind: EventKind) -> Self {
        Self(kind.bit())
    }

    /// Raw bits.
    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True if `kind` passes this filter.
    #[inline]
    pub const fn contains(self, kind: EventKind) -> bool {
        self.0 & kind.bit() != 0
    }

    /// Kinds in this mask, in bit order.
    pub fn kinds(self) -> impl Iterator<Item = EventKind> {
        EventKind::ALL.into_iter().filter(move |k| self.contains(*k))
    }
}

impl Default for EventMask {
    fn default() -> Self {
        Self::ALL
    }
}

impl From<EventKind> for EventMask {
    fn from(kind: EventKind) -> Self {
        Self::only(kind)
    }
}

impl BitOr for EventKind {
    type Output = EventMask;

    fn bitor(self, rhs: EventKind) -> EventMask {
        EventMask(self.bit() | rhs.bit())
    }
}

impl BitOr<EventKind> for EventMask {
    type Output = EventMask;

    fn bitor(self, rhs: EventKind) -> EventMask {
        EventMask(self.0 | rhs.bit())
    }
}

impl BitOr for EventMask {
    type Output = EventMask;

    fn bitor(self, rhs: EventMask) -> EventMask {
        EventMask(self.0 | rhs.0)
    }
}

impl BitOrAssign<EventKind> for EventMask {
    fn bitor_assign(&mut self, rhs: EventKind) {
        self.0 |= rhs.bit();
    }
}

/// Extra data attached to an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventDetail {
    /// Nothing beyond kind and endpoint.
    None,
    /// Delay before the next connection attempt (`CONNECT_RETRIED`).
    Interval(Duration),
    /// Human-readable failure reason (`*_FAILED`).
    Reason(String),
}

/// A socket lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketEvent {
    kind: EventKind,
    endpoint: Option<Endpoint>,
    detail: EventDetail,
}

impl SocketEvent {
    /// Event with no detail.
    pub fn new(kind: EventKind, endpoint: Option<Endpoint>) -> Self {
        Self {
            kind,
            endpoint,
            detail: EventDetail::None,
        }
    }

    /// Attach a detail payload.
    #[must_use]
    pub fn with_detail(mut self, detail: EventDetail) -> Self {
        self.detail = detail;
        self
    }

    /// Event kind.
    #[inline]
    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    /// Address the event refers to, if any.
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    /// Detail payload.
    pub fn detail(&self) -> &EventDetail {
        &self.detail
    }

    /// Retry delay carried by `CONNECT_RETRIED`.
    pub fn interval(&self) -> Option<Duration> {
        match self.detail {
            EventDetail::Interval(d) => Some(d),
            _ => None,
        }
    }

    /// Failure reason carried by `*_FAILED` events.
    pub fn reason(&self) -> Option<&str> {
        match &self.detail {
            EventDetail::Reason(r) => Some(r),
            _ => None,
        }
    }
}

impl fmt::Display for SocketEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(ep) = &self.endpoint {
            write!(f, " {ep}")?;
        }
        match &self.detail {
            EventDetail::None => Ok(()),
            EventDetail::Interval(d) => write!(f, " (retry in {d:?})"),
            EventDetail::Reason(r) => write!(f, ": {r}"),
        }
    }
}
