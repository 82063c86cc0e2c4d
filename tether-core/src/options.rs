//! Socket configuration options
//!
//! Per-socket knobs in the spirit of libzmq's socket options: blocking
//! behaviour, high-water marks and the reconnect schedule.

use crate::error::{Result, TetherError};
use std::time::Duration;

/// Socket configuration options.
///
/// # Examples
///
/// ```
/// use tether_core::options::SocketOptions;
/// use std::time::Duration;
///
/// let opts = SocketOptions::default()
///     .with_recv_timeout(Duration::from_secs(5))
///     .with_send_hwm(100);
/// assert!(opts.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketOptions {
    /// Receive timeout (ZMQ_RCVTIMEO)
    ///
    /// - `None`: Block indefinitely (default)
    /// - `Some(Duration::ZERO)`: Non-blocking, fail with `WouldBlock`
    /// - `Some(duration)`: Wait up to duration, then fail with `TimedOut`
    pub recv_timeout: Option<Duration>,

    /// Send timeout (ZMQ_SNDTIMEO)
    ///
    /// Applies when every eligible pipe is at its high-water mark.
    /// - `None`: Block indefinitely (default)
    /// - `Some(Duration::ZERO)`: Fail fast with `WouldBlock`
    /// - `Some(duration)`: Wait up to duration, then fail with `TimedOut`
    pub send_timeout: Option<Duration>,

    /// Reconnect interval (ZMQ_RECONNECT_IVL)
    ///
    /// Delay before the first retry after an attempt fails or a peer is lost.
    /// - Default: 100ms
    pub reconnect_ivl: Duration,

    /// Maximum reconnect interval (ZMQ_RECONNECT_IVL_MAX)
    ///
    /// - Default: 0 (no backoff, always use `reconnect_ivl`)
    /// - When > 0: Doubles `reconnect_ivl` per failed attempt up to this value
    pub reconnect_ivl_max: Duration,

    /// High water mark for receiving (ZMQ_RCVHWM)
    ///
    /// Maximum number of messages queued towards this socket per peer.
    /// - Default: 1000 messages
    /// - 0: unbounded
    pub recv_hwm: usize,

    /// High water mark for sending (ZMQ_SNDHWM)
    ///
    /// Maximum number of messages queued from this socket per peer.
    /// - Default: 1000 messages
    /// - 0: unbounded
    pub send_hwm: usize,

    /// Relaxed REQ mode (ZMQ_REQ_RELAXED)
    ///
    /// - `false` (default): `send` twice without `recv` is an error
    /// - `true`: a new request abandons the outstanding one
    pub req_relaxed: bool,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            recv_timeout: None, // Block indefinitely
            send_timeout: None, // Block indefinitely
            reconnect_ivl: Duration::from_millis(100),
            reconnect_ivl_max: Duration::ZERO, // No backoff
            recv_hwm: 1000,
            send_hwm: 1000,
            req_relaxed: false,
        }
    }
}

impl SocketOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = Some(timeout);
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }

    pub fn with_reconnect_ivl(mut self, ivl: Duration) -> Self {
        self.reconnect_ivl = ivl;
        self
    }

    pub fn with_reconnect_ivl_max(mut self, max: Duration) -> Self {
        self.reconnect_ivl_max = max;
        self
    }

    pub fn with_recv_hwm(mut self, hwm: usize) -> Self {
        self.recv_hwm = hwm;
        self
    }

    pub fn with_send_hwm(mut self, hwm: usize) -> Self {
        self.send_hwm = hwm;
        self
    }

    pub fn with_req_relaxed(mut self, enabled: bool) -> Self {
        self.req_relaxed = enabled;
        self
    }

    /// Reject combinations that cannot produce a sane schedule.
    pub fn validate(&self) -> Result<()> {
        if self.reconnect_ivl.is_zero() {
            return Err(TetherError::invalid_argument(
                "reconnect_ivl must be greater than zero",
            ));
        }
        if !self.reconnect_ivl_max.is_zero() && self.reconnect_ivl_max < self.reconnect_ivl {
            return Err(TetherError::invalid_argument(format!(
                "reconnect_ivl_max ({:?}) is below reconnect_ivl ({:?})",
                self.reconnect_ivl_max, self.reconnect_ivl
            )));
        }
        Ok(())
    }

    /// Capacity of a pipe written under `send_hwm` and read under `peer_recv_hwm`.
    ///
    /// Zero on either side means unbounded.
    pub fn pipe_hwm(send_hwm: usize, peer_recv_hwm: usize) -> usize {
        if send_hwm == 0 || peer_recv_hwm == 0 {
            0
        } else {
            send_hwm.saturating_add(peer_recv_hwm)
        }
    }
}
