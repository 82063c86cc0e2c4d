//! Background reactor.
//!
//! One thread per [`Context`](crate::Context) runs every connection attempt
//! and every reconnect timer. Sockets hand it [`Job`]s over a flume channel;
//! the reactor keeps them in a deadline-ordered heap and fires each one by
//! calling back into the socket that scheduled it.
//!
//! Jobs hold only a weak reference to their socket, so a job outliving its
//! socket is dropped silently. Each job also carries the attachment epoch it
//! was scheduled for; the socket ignores jobs whose epoch is stale.

use crate::socket::SocketCore;
use flume::{Receiver, RecvTimeoutError, Sender};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::io;
use std::sync::Weak;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tether_core::endpoint::Endpoint;
use tracing::{debug, trace};

/// A connection attempt due at `due`.
#[derive(Debug)]
pub(crate) struct Job {
    pub due: Instant,
    pub socket: Weak<SocketCore>,
    pub endpoint: Endpoint,
    pub epoch: u64,
}

#[derive(Debug)]
pub(crate) enum Command {
    Schedule(Job),
    Shutdown,
}

struct Timer {
    seq: u64,
    job: Job,
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Timer {}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timer {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: earliest deadline first, then scheduling order.
        other
            .job
            .due
            .cmp(&self.job.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

pub(crate) struct Reactor {
    commands: Receiver<Command>,
    timers: BinaryHeap<Timer>,
    next_seq: u64,
}

impl Reactor {
    /// Start the reactor thread.
    pub(crate) fn spawn(name: &str) -> io::Result<(Sender<Command>, JoinHandle<()>)> {
        let (tx, rx) = flume::unbounded();
        let reactor = Self {
            commands: rx,
            timers: BinaryHeap::new(),
            next_seq: 0,
        };
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || reactor.run())?;
        Ok((tx, handle))
    }

    fn run(mut self) {
        debug!("[REACTOR] started");
        loop {
            self.fire_due();

            let command = match self.timers.peek() {
                Some(next) => match self.commands.recv_deadline(next.job.due) {
                    Ok(command) => command,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                None => match self.commands.recv() {
                    Ok(command) => command,
                    Err(_) => break,
                },
            };

            match command {
                Command::Schedule(job) => self.push(job),
                Command::Shutdown => break,
            }
        }
        debug!("[REACTOR] stopped ({} pending timers dropped)", self.timers.len());
    }

    fn push(&mut self, job: Job) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.timers.push(Timer { seq, job });
    }

    fn fire_due(&mut self) {
        let now = Instant::now();
        while self.timers.peek().is_some_and(|t| t.job.due <= now) {
            let Some(Timer { job, .. }) = self.timers.pop() else {
                break;
            };
            match job.socket.upgrade() {
                Some(socket) => socket.attempt(&job.endpoint, job.epoch),
                None => trace!("[REACTOR] dropping job for {}: socket gone", job.endpoint),
            }
        }
    }
}
