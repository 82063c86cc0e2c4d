//! Readiness signalling.
//!
//! Every socket and every monitor owns one [`Readiness`]. Anything that may
//! change what a non-blocking call on that source would return (a message
//! pushed or popped, a peer attached or lost, an event appended, a close)
//! calls [`Readiness::notify`].
//!
//! Two kinds of waiters are supported:
//! - blocking calls snapshot [`generation`](Readiness::generation) before
//!   checking their condition and then [`wait_past`](Readiness::wait_past)
//!   that snapshot, so a notification between check and wait is never lost;
//! - `select` registers a flume sender with [`watch`](Readiness::watch) and
//!   sleeps on the shared receiver.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Instant `timeout` from now, or `None` when that lies beyond what
/// `Instant` can represent (treated as "no deadline").
#[inline]
pub(crate) fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

#[derive(Debug, Default)]
struct Signal {
    generation: u64,
    next_watch: u64,
    watchers: Vec<(u64, flume::Sender<()>)>,
}

#[derive(Debug, Default)]
pub(crate) struct Readiness {
    signal: Mutex<Signal>,
    cond: Condvar,
}

impl Readiness {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Wake every blocked caller and every registered watcher.
    pub(crate) fn notify(&self) {
        let mut signal = self.signal.lock();
        signal.generation = signal.generation.wrapping_add(1);
        for (_, tx) in &signal.watchers {
            // Bounded(1): a full channel already carries a pending wake-up.
            let _ = tx.try_send(());
        }
        drop(signal);
        self.cond.notify_all();
    }

    #[inline]
    pub(crate) fn generation(&self) -> u64 {
        self.signal.lock().generation
    }

    /// Block until the generation moves past `seen` or `deadline` passes.
    ///
    /// Returns `false` on timeout.
    pub(crate) fn wait_past(&self, seen: u64, deadline: Option<Instant>) -> bool {
        let mut signal = self.signal.lock();
        while signal.generation == seen {
            match deadline {
                None => self.cond.wait(&mut signal),
                Some(deadline) => {
                    if self.cond.wait_until(&mut signal, deadline).timed_out() {
                        return signal.generation != seen;
                    }
                }
            }
        }
        true
    }

    /// Register a watcher; returns the id to pass to [`unwatch`](Self::unwatch).
    pub(crate) fn watch(&self, tx: flume::Sender<()>) -> u64 {
        let mut signal = self.signal.lock();
        let id = signal.next_watch;
        signal.next_watch += 1;
        signal.watchers.push((id, tx));
        id
    }

    pub(crate) fn unwatch(&self, id: u64) {
        self.signal.lock().watchers.retain(|(w, _)| *w != id);
    }
}
