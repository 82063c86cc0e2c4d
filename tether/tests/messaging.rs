//! Messaging Pattern Integration Tests
//!
//! PUSH/PULL pipelines, PAIR exclusivity, reconnection with queued messages
//! and address management.

mod common;

use common::*;
use std::time::Duration;
use tether::prelude::*;

const ADDR: &str = "tcp://127.0.0.1:9000";

/// Messages flow from PUSH to PULL
#[test]
fn test_push_pull_basic() {
    let ctx = context();
    let inbound = ctx.socket(SocketType::Pull).unwrap();
    inbound.bind(ADDR).unwrap();

    let outbound = ctx.socket(SocketType::Push).unwrap();
    outbound.connect(ADDR).unwrap();

    outbound.send("hello world!").unwrap();
    assert_eq!(inbound.recv().unwrap(), Bytes::from_static(b"hello world!"));

    outbound.close().unwrap();
    inbound.close().unwrap();
}

/// Legacy UPSTREAM/DOWNSTREAM names behave like PULL/PUSH
#[test]
fn test_upstream_downstream_aliases() {
    let ctx = context();
    let inbound = ctx.socket(SocketType::UPSTREAM).unwrap();
    inbound.bind(ADDR).unwrap();

    let outbound = ctx.socket(SocketType::DOWNSTREAM).unwrap();
    outbound.connect(ADDR).unwrap();

    outbound.send("hello world!").unwrap();
    assert_eq!(inbound.recv().unwrap(), Bytes::from_static(b"hello world!"));
    assert_eq!(inbound.socket_type(), SocketType::Pull);
}

/// A connector reattaches by itself when the binder is recreated
#[test]
fn test_reconnect_to_broken_socket() {
    let ctx = context();
    let inbound = ctx.socket(SocketType::Pull).unwrap();
    inbound.bind(ADDR).unwrap();

    let outbound = ctx.socket(SocketType::Push).unwrap();
    outbound.connect(ADDR).unwrap();

    outbound.send("hello world!").unwrap();
    assert_eq!(inbound.recv().unwrap(), Bytes::from_static(b"hello world!"));

    inbound.close().unwrap();
    let inbound = ctx.socket(SocketType::Pull).unwrap();
    inbound.bind(ADDR).unwrap();

    // Queued while reconnecting, delivered once the new binder is reached.
    outbound.send("I'm back!").unwrap();
    assert_eq!(inbound.recv().unwrap(), Bytes::from_static(b"I'm back!"));

    outbound.close().unwrap();
    inbound.close().unwrap();
}

/// Messages sent before any listener exists are delivered after it binds
#[test]
fn test_send_before_bind_is_queued() {
    let ctx = context();
    let outbound = ctx.socket(SocketType::Push).unwrap();
    outbound.connect("inproc://late-listener").unwrap();
    for i in 0..3u8 {
        outbound.send(vec![i]).unwrap();
    }

    std::thread::sleep(Duration::from_millis(30));
    let inbound = ctx.socket(SocketType::Pull).unwrap();
    inbound.bind("inproc://late-listener").unwrap();

    for i in 0..3u8 {
        assert_eq!(inbound.recv().unwrap(), Bytes::from(vec![i]));
    }
}

/// A binder drains what a connector left behind after it closed
#[test]
fn test_pull_drains_after_pusher_closes() {
    let ctx = context();
    let inbound = ctx.socket(SocketType::Pull).unwrap();
    inbound.bind(ADDR).unwrap();

    let outbound = ctx.socket(SocketType::Push).unwrap();
    outbound.connect(ADDR).unwrap();
    wait_connected(&outbound);

    for s in ["one", "two", "three"] {
        outbound.send(s).unwrap();
    }
    outbound.close().unwrap();

    for s in ["one", "two", "three"] {
        assert_eq!(inbound.recv().unwrap(), Bytes::from(s));
    }
    assert_eq!(inbound.try_recv(), Ok(None));
}

/// PUSH distributes round-robin across connected pullers
#[test]
fn test_push_round_robin() {
    let ctx = context();
    let push = ctx.socket(SocketType::Push).unwrap();
    push.bind(ADDR).unwrap();

    let a = ctx.socket(SocketType::Pull).unwrap();
    let b = ctx.socket(SocketType::Pull).unwrap();
    a.connect(ADDR).unwrap();
    b.connect(ADDR).unwrap();
    wait_connected(&a);
    wait_connected(&b);

    for i in 0..4u8 {
        push.send(vec![i]).unwrap();
    }

    let mut got_a = vec![a.recv().unwrap(), a.recv().unwrap()];
    let mut got_b = vec![b.recv().unwrap(), b.recv().unwrap()];
    assert_eq!(a.try_recv(), Ok(None));
    assert_eq!(b.try_recv(), Ok(None));

    got_a.append(&mut got_b);
    got_a.sort();
    assert_eq!(
        got_a,
        (0..4u8).map(|i| Bytes::from(vec![i])).collect::<Vec<_>>()
    );
}

/// PULL fair-queues across several pushers
#[test]
fn test_pull_fair_queue() {
    let ctx = context();
    let pull = ctx.socket(SocketType::Pull).unwrap();
    pull.bind(ADDR).unwrap();

    let a = ctx.socket(SocketType::Push).unwrap();
    let b = ctx.socket(SocketType::Push).unwrap();
    a.connect(ADDR).unwrap();
    b.connect(ADDR).unwrap();
    wait_connected(&a);
    wait_connected(&b);

    for _ in 0..3 {
        a.send("a").unwrap();
    }
    b.send("b").unwrap();

    // Three receives must have visited both pushers.
    let first: Vec<Bytes> = (0..3).map(|_| pull.recv().unwrap()).collect();
    assert!(first.contains(&Bytes::from_static(b"b")));
    assert_eq!(pull.recv().unwrap(), Bytes::from_static(b"a"));
}

/// PAIR accepts a single peer; a second one is refused with ACCEPT_FAILED
#[test]
fn test_pair_is_exclusive() {
    let ctx = context();
    let server = ctx.socket(SocketType::Pair).unwrap();
    let monitor = server.monitor_all().unwrap();
    server.bind("inproc://pair").unwrap();

    let first = ctx.socket(SocketType::Pair).unwrap();
    first.connect("inproc://pair").unwrap();
    expect_events(&monitor, &[EventKind::Listening, EventKind::Accepted]);

    let second = ctx.socket(SocketType::Pair).unwrap();
    second.connect("inproc://pair").unwrap();
    assert_eq!(next_kind(&monitor), EventKind::AcceptFailed);

    first.send("ping").unwrap();
    assert_eq!(server.recv().unwrap(), Bytes::from_static(b"ping"));
    server.send("pong").unwrap();
    assert_eq!(first.recv().unwrap(), Bytes::from_static(b"pong"));

    // Once the first peer leaves, the second one gets in on its next retry.
    first.close().unwrap();
    assert_eq!(
        events_until(&monitor, EventKind::Accepted)
            .into_iter()
            .filter(|k| *k != EventKind::AcceptFailed)
            .collect::<Vec<_>>(),
        vec![EventKind::Disconnected]
    );
    second.send("hi").unwrap();
    assert_eq!(server.recv().unwrap(), Bytes::from_static(b"hi"));
}

/// Operations outside a pattern's direction are rejected
#[test]
fn test_unsupported_operations() {
    let ctx = context();
    let push = ctx.socket(SocketType::Push).unwrap();
    let pull = ctx.socket(SocketType::Pull).unwrap();

    assert_eq!(
        push.recv(),
        Err(TetherError::Unsupported {
            socket_type: SocketType::Push,
            op: "recv"
        })
    );
    assert_eq!(
        pull.send("x"),
        Err(TetherError::Unsupported {
            socket_type: SocketType::Pull,
            op: "send"
        })
    );
}

/// Binding an address already held by a live socket fails
#[test]
fn test_address_in_use() {
    let ctx = context();
    let a = ctx.socket(SocketType::Pull).unwrap();
    let b = ctx.socket(SocketType::Pull).unwrap();
    a.bind(ADDR).unwrap();
    assert!(matches!(b.bind(ADDR), Err(TetherError::AddressInUse(_))));

    // Separate contexts have separate address spaces.
    let other = context();
    let c = other.socket(SocketType::Pull).unwrap();
    c.bind(ADDR).unwrap();
}

/// Invalid addresses fail synchronously
#[test]
fn test_invalid_addresses() {
    let ctx = context();
    let socket = ctx.socket(SocketType::Pull).unwrap();
    for bad in ["", "tcp://127.0.0.1", "udp://127.0.0.1:9000", "inproc://"] {
        assert!(
            matches!(socket.bind(bad), Err(TetherError::InvalidEndpoint(_))),
            "{bad:?} should be rejected"
        );
    }
    assert_eq!(socket.last_endpoint(), None);
}

/// `disconnect` stops delivery and the retry loop
#[test]
fn test_disconnect() {
    let ctx = context();
    let inbound = ctx.socket(SocketType::Pull).unwrap();
    let monitor_inbound = inbound.monitor_all().unwrap();
    inbound.bind(ADDR).unwrap();

    let outbound = ctx.socket(SocketType::Push).unwrap();
    let monitor_outbound = outbound.monitor_all().unwrap();
    outbound.connect(ADDR).unwrap();
    wait_connected(&outbound);

    outbound.disconnect(ADDR).unwrap();
    expect_events(
        &monitor_outbound,
        &[
            EventKind::ConnectDelayed,
            EventKind::Connected,
            EventKind::Disconnected,
        ],
    );
    expect_events(
        &monitor_inbound,
        &[
            EventKind::Listening,
            EventKind::Accepted,
            EventKind::Disconnected,
        ],
    );

    assert!(outbound.connection_states().is_empty());
    assert_eq!(outbound.try_send("lost"), Err(TetherError::WouldBlock));

    // No retries follow a disconnect.
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(monitor_outbound.try_recv(), Ok(None));

    // The address can be connected again.
    outbound.connect(ADDR).unwrap();
    outbound.send("again").unwrap();
    assert_eq!(inbound.recv().unwrap(), Bytes::from_static(b"again"));
}

/// Introspection reflects bound and connected addresses
#[test]
fn test_introspection() {
    let ctx = context();
    let socket = ctx.socket(SocketType::Pair).unwrap();
    socket.bind("inproc://a").unwrap();
    socket.connect("inproc://b").unwrap();

    assert_eq!(
        socket.last_endpoint().map(|e| e.to_string()).as_deref(),
        Some("inproc://b")
    );

    let states = socket.connection_states();
    assert_eq!(states.len(), 2);
    assert_eq!(states[0].endpoint.to_string(), "inproc://a");
    assert_eq!(states[0].role, tether::Role::Bind);
    assert_eq!(states[0].state, tether::ConnectionState::Listening);
    assert_eq!(states[1].role, tether::Role::Connect);
    assert_eq!(states[1].peers, 0);
    assert!(socket.connect("inproc://b").is_err());
}
