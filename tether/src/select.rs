//! Readiness multiplexer.
//!
//! [`select`] waits on any mix of sockets and monitors and reports which of
//! them are ready, without consuming anything. An item reported readable
//! yields on the next non-blocking receive (as long as nobody else receives
//! from it in between); an item reported writable accepts the next
//! non-blocking send.
//!
//! ```rust,no_run
//! use tether::prelude::*;
//! use std::time::Duration;
//!
//! # fn main() -> tether::Result<()> {
//! let ctx = Context::new()?;
//! let pull = ctx.socket(SocketType::Pull)?;
//! let monitor = pull.monitor_all()?;
//! pull.bind("tcp://127.0.0.1:9000")?;
//!
//! let items = [PollItem::readable(&pull), PollItem::readable(&monitor)];
//! let ready = select(&items, Some(Duration::from_millis(100)))?;
//! if ready.is_readable(1) {
//!     println!("event: {:?}", monitor.try_recv()?);
//! }
//! # Ok(())
//! # }
//! ```

use crate::monitor::Monitor;
use crate::readiness::{deadline_after, Readiness};
use crate::socket::Socket;
use smallvec::SmallVec;
use std::ops::BitOr;
use std::sync::Arc;
use std::time::Duration;
use tether_core::error::{Result, TetherError};
use tracing::trace;

/// Something `select` can wait on.
#[derive(Debug, Clone, Copy)]
pub enum Source<'a> {
    Socket(&'a Socket),
    Monitor(&'a Monitor),
}

impl<'a> From<&'a Socket> for Source<'a> {
    fn from(socket: &'a Socket) -> Self {
        Source::Socket(socket)
    }
}

impl<'a> From<&'a Monitor> for Source<'a> {
    fn from(monitor: &'a Monitor) -> Self {
        Source::Monitor(monitor)
    }
}

impl Source<'_> {
    fn readiness(&self) -> &Arc<Readiness> {
        match self {
            Source::Socket(socket) => socket.core().readiness(),
            Source::Monitor(monitor) => monitor.channel().readiness(),
        }
    }
}

/// Conditions an item is polled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interest(u8);

impl Interest {
    pub const READABLE: Interest = Interest(0b01);
    pub const WRITABLE: Interest = Interest(0b10);
    pub const BOTH: Interest = Interest(0b11);

    #[inline]
    pub const fn contains(self, other: Interest) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Interest {
    type Output = Interest;

    fn bitor(self, rhs: Interest) -> Interest {
        Interest(self.0 | rhs.0)
    }
}

/// One entry of a `select` call.
#[derive(Debug, Clone, Copy)]
pub struct PollItem<'a> {
    pub source: Source<'a>,
    pub interest: Interest,
}

impl<'a> PollItem<'a> {
    pub fn new(source: impl Into<Source<'a>>, interest: Interest) -> Self {
        Self {
            source: source.into(),
            interest,
        }
    }

    pub fn readable(source: impl Into<Source<'a>>) -> Self {
        Self::new(source, Interest::READABLE)
    }

    pub fn writable(source: impl Into<Source<'a>>) -> Self {
        Self::new(source, Interest::WRITABLE)
    }
}

/// Result of a `select` call: indices into the item slice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub readable: SmallVec<[usize; 8]>,
    pub writable: SmallVec<[usize; 8]>,
    /// Closed sockets or monitors, sealed monitors with nothing left, and
    /// sockets whose context was terminated.
    pub errored: SmallVec<[usize; 8]>,
}

impl Selection {
    /// True when nothing is ready (the call timed out).
    pub fn is_empty(&self) -> bool {
        self.readable.is_empty() && self.writable.is_empty() && self.errored.is_empty()
    }

    pub fn is_readable(&self, index: usize) -> bool {
        self.readable.contains(&index)
    }

    pub fn is_writable(&self, index: usize) -> bool {
        self.writable.contains(&index)
    }

    pub fn is_errored(&self, index: usize) -> bool {
        self.errored.contains(&index)
    }
}

fn scan(items: &[PollItem<'_>]) -> Selection {
    let mut selection = Selection::default();
    for (index, item) in items.iter().enumerate() {
        let (readable, writable, errored) = match item.source {
            Source::Socket(socket) => {
                let state = socket.core().poll();
                (state.readable, state.writable, state.errored)
            }
            Source::Monitor(monitor) => {
                let (readable, errored) = monitor.channel().poll();
                (readable, false, errored)
            }
        };
        if errored {
            selection.errored.push(index);
            continue;
        }
        if readable && item.interest.contains(Interest::READABLE) {
            selection.readable.push(index);
        }
        if writable && item.interest.contains(Interest::WRITABLE) {
            selection.writable.push(index);
        }
    }
    selection
}

/// Unregisters the select wake-up channel from every source on drop.
struct Watch<'s> {
    registrations: SmallVec<[(&'s Arc<Readiness>, u64); 8]>,
}

impl Drop for Watch<'_> {
    fn drop(&mut self) {
        for (readiness, id) in self.registrations.drain(..) {
            readiness.unwatch(id);
        }
    }
}

/// Wait until at least one item is ready or `timeout` expires.
///
/// `None` waits forever and `Some(Duration::ZERO)` only checks. On timeout an
/// empty [`Selection`] is returned. Fails with `InvalidArgument` when `items`
/// is empty.
pub fn select(items: &[PollItem<'_>], timeout: Option<Duration>) -> Result<Selection> {
    if items.is_empty() {
        return Err(TetherError::invalid_argument("select needs at least one item"));
    }
    let deadline = timeout.and_then(deadline_after);

    // Register before the first scan so no notification can slip in between.
    let (tx, rx) = flume::bounded(1);
    let _watch = Watch {
        registrations: items
            .iter()
            .map(|item| {
                let readiness = item.source.readiness();
                (readiness, readiness.watch(tx.clone()))
            })
            .collect(),
    };

    loop {
        let selection = scan(items);
        if !selection.is_empty() {
            trace!(
                "[SELECT] ready: r={:?} w={:?} e={:?}",
                selection.readable,
                selection.writable,
                selection.errored
            );
            return Ok(selection);
        }
        match deadline {
            None => {
                // `tx` is still alive, so this only returns on a wake-up.
                let _ = rx.recv();
            }
            Some(deadline) => {
                if rx.recv_deadline(deadline).is_err() {
                    return Ok(scan(items));
                }
            }
        }
    }
}
