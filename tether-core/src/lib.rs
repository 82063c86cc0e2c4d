//! Tether Core
//!
//! Sans-IO building blocks shared by the runtime crate:
//! - Address parsing (`endpoint`)
//! - Error types (`error`)
//! - Lifecycle event kinds, filters and values (`monitor`)
//! - Connection state machine (`state`)
//! - Socket and context configuration (`options`, `config`)
//! - Reconnect backoff schedule (`reconnect`)
//! - Socket pattern types (`socket_type`)

#![deny(unsafe_code)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::match_same_arms)]

pub mod config;
pub mod endpoint;
pub mod error;
pub mod monitor;
pub mod options;
pub mod reconnect;
pub mod socket_type;
pub mod state;

// Optional: a small prelude to make downstream crates ergonomic.
pub mod prelude {
    pub use crate::config::ContextConfig;
    pub use crate::endpoint::Endpoint;
    pub use crate::error::{Result, TetherError};
    pub use crate::monitor::{EventDetail, EventKind, EventMask, SocketEvent};
    pub use crate::options::SocketOptions;
    pub use crate::reconnect::ReconnectState;
    pub use crate::socket_type::{PatternRole, SocketType};
    pub use crate::state::{ConnectionState, Lifecycle, Role, Trigger};
}
