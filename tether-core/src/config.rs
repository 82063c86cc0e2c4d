//! Context configuration
//!
//! Process-wide settings applied when a [`Context`](../../tether/struct.Context.html)
//! is created. Per-socket settings live in [`SocketOptions`].

use crate::error::{Result, TetherError};
use crate::options::SocketOptions;

/// Default upper bound on live sockets per context (ZMQ_MAX_SOCKETS).
pub const DEFAULT_MAX_SOCKETS: usize = 1023;

/// Default name of the background reactor thread.
pub const DEFAULT_REACTOR_THREAD_NAME: &str = "tether-reactor";

/// Context configuration.
///
/// # Examples
///
/// ```
/// use tether_core::config::ContextConfig;
/// use tether_core::options::SocketOptions;
/// use std::time::Duration;
///
/// let config = ContextConfig::default()
///     .with_max_sockets(64)
///     .with_socket_defaults(
///         SocketOptions::default().with_reconnect_ivl(Duration::from_millis(20)),
///     );
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextConfig {
    /// Maximum number of open sockets; creating one more fails.
    pub max_sockets: usize,

    /// Options every new socket starts from.
    pub socket_defaults: SocketOptions,

    /// Name given to the reactor thread (shows up in debuggers and traces).
    pub reactor_thread_name: String,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_sockets: DEFAULT_MAX_SOCKETS,
            socket_defaults: SocketOptions::default(),
            reactor_thread_name: DEFAULT_REACTOR_THREAD_NAME.to_string(),
        }
    }
}

impl ContextConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_sockets(mut self, max: usize) -> Self {
        self.max_sockets = max;
        self
    }

    pub fn with_socket_defaults(mut self, options: SocketOptions) -> Self {
        self.socket_defaults = options;
        self
    }

    pub fn with_reactor_thread_name(mut self, name: impl Into<String>) -> Self {
        self.reactor_thread_name = name.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_sockets == 0 {
            return Err(TetherError::invalid_argument("max_sockets must be at least 1"));
        }
        if self.reactor_thread_name.is_empty() {
            return Err(TetherError::invalid_argument(
                "reactor_thread_name cannot be empty",
            ));
        }
        self.socket_defaults.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let config = ContextConfig::default();
        assert_eq!(config.max_sockets, 1023);
        assert_eq!(config.reactor_thread_name, "tether-reactor");
        assert_eq!(config.socket_defaults, SocketOptions::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        assert!(ContextConfig::new().with_max_sockets(0).validate().is_err());
        assert!(ContextConfig::new()
            .with_reactor_thread_name("")
            .validate()
            .is_err());

        let bad_defaults = SocketOptions::new().with_reconnect_ivl(Duration::ZERO);
        assert!(ContextConfig::new()
            .with_socket_defaults(bad_defaults)
            .validate()
            .is_err());
    }
}
