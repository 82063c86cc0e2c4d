//! # Tether
//!
//! In-process socket-pattern messaging with connection lifecycle monitoring
//! and a readiness multiplexer.
//!
//! ## Architecture
//!
//! - **`tether-core`**: addresses, errors, event kinds and masks, the
//!   connection state machine, options and backoff (sans-IO)
//! - **`tether`**: context, reactor thread, sockets, monitors and `select`
//!   (this crate)
//!
//! Addresses (`tcp://`, `ipc://`, `inproc://`) are opaque keys in the
//! context's registry: a socket connecting to an address reaches whichever
//! socket of the same context is bound there. No bytes leave the process.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tether::prelude::*;
//!
//! # fn main() -> tether::Result<()> {
//! let ctx = Context::new()?;
//!
//! let inbound = ctx.socket(SocketType::Pull)?;
//! let monitor = inbound.monitor(EventKind::Accepted | EventKind::Closed)?;
//! inbound.bind("tcp://127.0.0.1:9000")?;
//!
//! let outbound = ctx.socket(SocketType::Push)?;
//! outbound.connect("tcp://127.0.0.1:9000")?;
//! outbound.send("hello world!")?;
//!
//! assert_eq!(inbound.recv()?, Bytes::from_static(b"hello world!"));
//! assert_eq!(monitor.recv()?.kind(), EventKind::Accepted);
//!
//! inbound.close()?;
//! assert_eq!(monitor.recv()?.kind(), EventKind::Closed);
//! # Ok(())
//! # }
//! ```
//!
//! ## Lifecycle events
//!
//! Bind side: `LISTENING → ACCEPTED → DISCONNECTED → ACCEPTED … → CLOSED`.
//! Connect side: `CONNECT_DELAYED → CONNECTED → DISCONNECTED →
//! CONNECT_RETRIED → CONNECT_DELAYED → … → CLOSED`. `CLOSED` is always the
//! last event a monitor receives.
#![warn(clippy::all)]

pub mod context;
pub mod dev_tracing;
pub mod monitor;
mod pattern;
mod pipe;
mod reactor;
mod readiness;
pub mod select;
pub mod socket;

// Re-export core types
pub use bytes::Bytes;
pub use context::Context;
pub use monitor::Monitor;
pub use select::{select, Interest, PollItem, Selection, Source};
pub use socket::{Attachment, Socket};
pub use tether_core::config::ContextConfig;
pub use tether_core::endpoint::Endpoint;
pub use tether_core::error::{Result, TetherError};
pub use tether_core::monitor::{EventDetail, EventKind, EventMask, SocketEvent};
pub use tether_core::options::SocketOptions;
pub use tether_core::socket_type::SocketType;
pub use tether_core::state::{ConnectionState, Role};

/// Everything needed for typical use.
pub mod prelude {
    pub use crate::{
        select, Bytes, Context, ContextConfig, EventKind, EventMask, Interest, Monitor, PollItem,
        Result, Selection, Socket, SocketEvent, SocketOptions, SocketType, TetherError,
    };
}
