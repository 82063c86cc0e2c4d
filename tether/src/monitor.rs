//! Socket lifecycle monitors.
//!
//! A [`Monitor`] is a read-only view of one socket's lifecycle. Each monitor
//! owns its own [`EventChannel`]: the socket appends every event that passes
//! the monitor's [`EventMask`] while it still holds its state lock, so the
//! queue order is the transition order.
//!
//! Once `CLOSED` has been appended the channel is sealed. Buffered events stay
//! readable after the socket is gone; after the last one every receive fails
//! with [`TetherError::SocketClosed`].

use crate::readiness::{deadline_after, Readiness};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tether_core::error::{Result, TetherError};
use tether_core::monitor::{EventKind, EventMask, SocketEvent};
use tracing::trace;

#[derive(Debug, Default)]
struct ChannelState {
    queue: VecDeque<SocketEvent>,
    sealed: bool,
    closed: bool,
}

/// Per-monitor event queue shared between a socket and its monitor handle.
#[derive(Debug)]
pub(crate) struct EventChannel {
    mask: EventMask,
    state: Mutex<ChannelState>,
    readiness: Arc<Readiness>,
}

impl EventChannel {
    pub(crate) fn new(mask: EventMask) -> Self {
        Self {
            mask,
            state: Mutex::new(ChannelState::default()),
            readiness: Arc::new(Readiness::new()),
        }
    }

    /// Append `event` if it passes the filter.
    ///
    /// `CLOSED` seals the channel whether or not it passes the filter.
    pub(crate) fn append(&self, event: &SocketEvent) {
        let mut state = self.state.lock();
        if state.closed || state.sealed {
            return;
        }
        let kind = event.kind();
        let accepted = self.mask.contains(kind);
        if accepted {
            state.queue.push_back(event.clone());
        }
        if kind == EventKind::Closed {
            state.sealed = true;
        }
        drop(state);

        if accepted || kind == EventKind::Closed {
            self.readiness.notify();
        }
    }

    pub(crate) fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        state.queue.clear();
        drop(state);
        self.readiness.notify();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub(crate) fn readiness(&self) -> &Arc<Readiness> {
        &self.readiness
    }

    /// Pop the next event without blocking.
    fn pop(&self) -> Result<Option<SocketEvent>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TetherError::MonitorClosed);
        }
        match state.queue.pop_front() {
            Some(event) => Ok(Some(event)),
            None if state.sealed => Err(TetherError::SocketClosed),
            None => Ok(None),
        }
    }

    /// `(readable, errored)` as seen by `select`.
    pub(crate) fn poll(&self) -> (bool, bool) {
        let state = self.state.lock();
        if state.closed {
            return (false, true);
        }
        let readable = !state.queue.is_empty();
        (readable, !readable && state.sealed)
    }
}

/// Handle for receiving one socket's lifecycle events.
///
/// Created by [`Socket::monitor`](crate::Socket::monitor). Dropping the handle
/// closes it.
///
/// # Example
///
/// ```rust,no_run
/// use tether::prelude::*;
///
/// # fn main() -> tether::Result<()> {
/// let ctx = Context::new()?;
/// let pull = ctx.socket(SocketType::Pull)?;
/// let monitor = pull.monitor_all()?;
///
/// pull.bind("tcp://127.0.0.1:9000")?;
/// pull.close()?;
///
/// assert_eq!(monitor.recv()?.kind(), EventKind::Listening);
/// assert_eq!(monitor.recv()?.kind(), EventKind::Closed);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Monitor {
    channel: Arc<EventChannel>,
}

impl Monitor {
    pub(crate) fn new(channel: Arc<EventChannel>) -> Self {
        Self { channel }
    }

    /// Event kinds this monitor receives.
    pub fn filter(&self) -> EventMask {
        self.channel.mask
    }

    /// Receive the next event, blocking until one arrives.
    ///
    /// Fails with `MonitorClosed` once the monitor is closed (including from
    /// another thread while this call is blocked) and with `SocketClosed` once
    /// every event up to and including `CLOSED` has been received.
    pub fn recv(&self) -> Result<SocketEvent> {
        loop {
            let seen = self.channel.readiness.generation();
            if let Some(event) = self.channel.pop()? {
                return Ok(event);
            }
            self.channel.readiness.wait_past(seen, None);
        }
    }

    /// Receive the next event if one is queued.
    pub fn try_recv(&self) -> Result<Option<SocketEvent>> {
        self.channel.pop()
    }

    /// Receive the next event, waiting at most `timeout`.
    ///
    /// Returns `Ok(None)` when the timeout expires first.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<SocketEvent>> {
        let deadline = deadline_after(timeout);
        loop {
            let seen = self.channel.readiness.generation();
            if let Some(event) = self.channel.pop()? {
                return Ok(Some(event));
            }
            if !self.channel.readiness.wait_past(seen, deadline) {
                return self.channel.pop();
            }
        }
    }

    /// Close the monitor.
    ///
    /// Buffered events are discarded and the socket stops feeding this
    /// monitor. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        trace!("[MONITOR] closing (filter {:#x})", self.channel.mask.bits());
        self.channel.close();
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }

    pub(crate) fn channel(&self) -> &Arc<EventChannel> {
        &self.channel
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.channel.close();
    }
}
