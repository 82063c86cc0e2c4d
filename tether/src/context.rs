//! Context: process-wide owner of sockets, addresses and the reactor.
//!
//! A [`Context`] is explicit state created by the application, never a
//! global. It holds:
//! - the address registry mapping each bound [`Endpoint`] to its socket
//! - the table of live sockets (for `terminate` and `socket_count`)
//! - the reactor thread that runs connection attempts and retry timers
//!
//! Sockets keep the shared part alive, so a socket handle may outlive every
//! `Context` clone; once the last clone is dropped (or [`Context::terminate`]
//! is called) every socket is closed and further operations on it fail with
//! [`TetherError::ContextTerminated`].

use crate::reactor::{Command, Job, Reactor};
use crate::socket::{Socket, SocketCore};
use dashmap::DashMap;
use flume::Sender;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use tether_core::config::ContextConfig;
use tether_core::endpoint::Endpoint;
use tether_core::error::{Result, TetherError};
use tether_core::options::SocketOptions;
use tether_core::socket_type::SocketType;
use tracing::{debug, warn};

/// State shared by the context handle, its sockets and nothing else.
#[derive(Debug)]
pub(crate) struct Shared {
    pub config: ContextConfig,
    /// Bound addresses. Entries whose socket is closed or gone are stale and
    /// may be replaced by the next `bind`.
    pub registry: DashMap<Endpoint, Weak<SocketCore>>,
    sockets: DashMap<u64, Weak<SocketCore>>,
    next_id: AtomicU64,
    terminated: AtomicBool,
    commands: Sender<Command>,
}

impl Shared {
    pub(crate) fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// Fail with `ContextTerminated` once teardown has started.
    pub(crate) fn check_alive(&self) -> Result<()> {
        if self.is_terminated() {
            Err(TetherError::ContextTerminated)
        } else {
            Ok(())
        }
    }

    pub(crate) fn schedule(&self, job: Job) -> Result<()> {
        self.commands
            .send(Command::Schedule(job))
            .map_err(|_| TetherError::ContextTerminated)
    }

    pub(crate) fn forget_socket(&self, id: u64) {
        self.sockets.remove(&id);
    }
}

#[derive(Debug)]
struct ContextInner {
    shared: Arc<Shared>,
    reactor: Mutex<Option<JoinHandle<()>>>,
}

impl ContextInner {
    fn terminate(&self) {
        if self.shared.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("[CONTEXT] terminating ({} live sockets)", self.shared.sockets.len());

        let live: Vec<Arc<SocketCore>> = self
            .shared
            .sockets
            .iter()
            .filter_map(|entry| entry.value().upgrade())
            .collect();
        for socket in live {
            socket.close_for_teardown();
        }
        self.shared.sockets.clear();
        self.shared.registry.clear();

        if self.shared.commands.send(Command::Shutdown).is_err() {
            warn!("[CONTEXT] reactor already stopped");
        }
        if let Some(handle) = self.reactor.lock().take() {
            if handle.join().is_err() {
                warn!("[CONTEXT] reactor thread panicked");
            }
        }
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Factory and owner of sockets.
///
/// Cloning is cheap; all clones refer to the same context.
///
/// # Example
///
/// ```rust,no_run
/// use tether::prelude::*;
/// use bytes::Bytes;
///
/// # fn main() -> tether::Result<()> {
/// let ctx = Context::new()?;
/// let pull = ctx.socket(SocketType::Pull)?;
/// let push = ctx.socket(SocketType::Push)?;
///
/// pull.bind("inproc://pipeline")?;
/// push.connect("inproc://pipeline")?;
///
/// push.send(Bytes::from_static(b"hello"))?;
/// assert_eq!(pull.recv()?, Bytes::from_static(b"hello"));
///
/// ctx.terminate();
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    /// Create a context with default configuration.
    pub fn new() -> Result<Self> {
        Self::with_config(ContextConfig::default())
    }

    /// Create a context with custom configuration.
    pub fn with_config(config: ContextConfig) -> Result<Self> {
        config.validate()?;
        let (commands, handle) = Reactor::spawn(&config.reactor_thread_name)
            .map_err(|e| TetherError::Reactor(e.to_string()))?;

        debug!(
            "[CONTEXT] created (max_sockets={}, reactor={})",
            config.max_sockets, config.reactor_thread_name
        );

        Ok(Self {
            inner: Arc::new(ContextInner {
                shared: Arc::new(Shared {
                    config,
                    registry: DashMap::new(),
                    sockets: DashMap::new(),
                    next_id: AtomicU64::new(1),
                    terminated: AtomicBool::new(false),
                    commands,
                }),
                reactor: Mutex::new(Some(handle)),
            }),
        })
    }

    /// Create a socket using the context's default socket options.
    pub fn socket(&self, socket_type: SocketType) -> Result<Socket> {
        let options = self.inner.shared.config.socket_defaults.clone();
        self.socket_with_options(socket_type, options)
    }

    /// Create a socket with explicit options.
    pub fn socket_with_options(
        &self,
        socket_type: SocketType,
        options: SocketOptions,
    ) -> Result<Socket> {
        let shared = &self.inner.shared;
        shared.check_alive()?;
        options.validate()?;

        let max = shared.config.max_sockets;
        if shared.sockets.len() >= max {
            return Err(TetherError::TooManySockets { max });
        }

        let core = SocketCore::new(Arc::clone(shared), socket_type, options);
        shared.sockets.insert(core.id(), Arc::downgrade(&core));
        // terminate() may have swept the table between the check and the insert.
        if shared.is_terminated() {
            core.close_for_teardown();
            return Err(TetherError::ContextTerminated);
        }
        Ok(Socket::new(core))
    }

    /// Close every socket and stop the reactor.
    ///
    /// Idempotent. Blocked calls on this context's sockets and monitors wake
    /// up; every later socket operation fails with `ContextTerminated`.
    pub fn terminate(&self) {
        self.inner.terminate();
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.shared.is_terminated()
    }

    /// Number of sockets created by this context and not yet closed.
    pub fn socket_count(&self) -> usize {
        self.inner.shared.sockets.len()
    }

    pub fn config(&self) -> &ContextConfig {
        &self.inner.shared.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_count_and_limit() {
        let ctx = Context::with_config(ContextConfig::default().with_max_sockets(2)).unwrap();
        let a = ctx.socket(SocketType::Push).unwrap();
        let _b = ctx.socket(SocketType::Pull).unwrap();
        assert_eq!(ctx.socket_count(), 2);

        assert_eq!(
            ctx.socket(SocketType::Pair).unwrap_err(),
            TetherError::TooManySockets { max: 2 }
        );

        a.close().unwrap();
        assert_eq!(ctx.socket_count(), 1);
        assert!(ctx.socket(SocketType::Pair).is_ok());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = Context::with_config(ContextConfig::default().with_max_sockets(0)).unwrap_err();
        assert!(matches!(err, TetherError::InvalidArgument(_)));
    }

    #[test]
    fn test_terminate_is_idempotent() {
        let ctx = Context::new().unwrap();
        let other = ctx.clone();
        ctx.terminate();
        other.terminate();
        assert!(other.is_terminated());
        assert_eq!(
            ctx.socket(SocketType::Req).unwrap_err(),
            TetherError::ContextTerminated
        );
    }

    #[test]
    fn test_socket_defaults_come_from_config() {
        let defaults = SocketOptions::default().with_send_hwm(7);
        let ctx =
            Context::with_config(ContextConfig::default().with_socket_defaults(defaults)).unwrap();
        let socket = ctx.socket(SocketType::Push).unwrap();
        assert_eq!(socket.options().send_hwm, 7);
    }
}
