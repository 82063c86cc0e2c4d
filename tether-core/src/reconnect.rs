//! Reconnection schedule with optional exponential backoff.
//!
//! The runtime keeps one [`ReconnectState`] per connected address. Every
//! failed attempt or lost peer asks it for the next delay; a completed
//! handshake resets it.

use crate::options::SocketOptions;
use std::time::Duration;

/// Doubling stops after this many attempts; the cap takes over long before.
const MAX_DOUBLINGS: u32 = 16;

/// Backoff schedule for one connected address.
///
/// ```rust
/// use tether_core::reconnect::ReconnectState;
/// use tether_core::options::SocketOptions;
/// use std::time::Duration;
///
/// let options = SocketOptions::default()
///     .with_reconnect_ivl(Duration::from_millis(5))
///     .with_reconnect_ivl_max(Duration::from_millis(20));
/// let mut schedule = ReconnectState::new(&options);
///
/// let delays: Vec<_> = (0..4).map(|_| schedule.next_delay()).collect();
/// assert_eq!(delays, [5, 10, 20, 20].map(Duration::from_millis));
/// ```
#[derive(Debug, Clone)]
pub struct ReconnectState {
    ivl: Duration,
    /// Zero keeps every delay at `ivl`.
    ivl_max: Duration,
    attempt: u32,
}

impl ReconnectState {
    pub const fn new(options: &SocketOptions) -> Self {
        Self {
            ivl: options.reconnect_ivl,
            ivl_max: options.reconnect_ivl_max,
            attempt: 0,
        }
    }

    /// Delay before the next attempt; advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current_interval();
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Back to the base interval after a completed handshake.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Delay the next call to [`next_delay`](Self::next_delay) will return.
    #[must_use]
    pub fn current_interval(&self) -> Duration {
        if self.ivl_max.is_zero() {
            return self.ivl;
        }
        self.ivl
            .saturating_mul(1_u32 << self.attempt.min(MAX_DOUBLINGS))
            .min(self.ivl_max)
    }
}
