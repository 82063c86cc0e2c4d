//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::time::{Duration, Instant};
use tether::prelude::*;

/// Upper bound for anything a test waits on.
pub const PATIENCE: Duration = Duration::from_secs(5);

/// Context with fast reconnects and bounded blocking calls, so a broken
/// build fails instead of hanging.
pub fn context() -> Context {
    tether::dev_tracing::init_tracing();
    let defaults = SocketOptions::default()
        .with_reconnect_ivl(Duration::from_millis(10))
        .with_recv_timeout(PATIENCE)
        .with_send_timeout(PATIENCE);
    Context::with_config(ContextConfig::default().with_socket_defaults(defaults))
        .expect("context should start")
}

pub fn next_event(monitor: &Monitor) -> SocketEvent {
    monitor
        .recv_timeout(PATIENCE)
        .expect("monitor should be open")
        .expect("event should arrive in time")
}

pub fn next_kind(monitor: &Monitor) -> EventKind {
    next_event(monitor).kind()
}

pub fn expect_events(monitor: &Monitor, expected: &[EventKind]) {
    for (i, kind) in expected.iter().enumerate() {
        assert_eq!(next_kind(monitor), *kind, "event #{i}");
    }
}

/// After `DISCONNECTED`: one or more retry rounds, then `CONNECTED`.
pub fn expect_reconnect(monitor: &Monitor) {
    assert_eq!(next_kind(monitor), EventKind::ConnectRetried);
    loop {
        assert_eq!(next_kind(monitor), EventKind::ConnectDelayed);
        match next_kind(monitor) {
            EventKind::Connected => return,
            EventKind::ConnectRetried => continue,
            other => panic!("unexpected {other} while reconnecting"),
        }
    }
}

/// Skip events until `kind` shows up; returns the skipped ones.
pub fn events_until(monitor: &Monitor, kind: EventKind) -> Vec<EventKind> {
    let mut skipped = Vec::new();
    loop {
        let next = next_kind(monitor);
        if next == kind {
            return skipped;
        }
        skipped.push(next);
    }
}

pub fn wait_for(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + PATIENCE;
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(2));
    }
}

/// Block until `socket` has a peer on every attachment.
pub fn wait_connected(socket: &Socket) {
    wait_for(|| {
        let states = socket.connection_states();
        !states.is_empty() && states.iter().all(|a| a.peers > 0)
    });
}
