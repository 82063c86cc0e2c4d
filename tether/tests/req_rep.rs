//! REQ/REP Integration Tests
//!
//! Lockstep request/reply, relaxed REQ, and reply routing across several
//! requesters.

mod common;

use common::*;
use std::time::Duration;
use tether::prelude::*;

const ADDR: &str = "tcp://127.0.0.1:5555";

/// One request, one reply
#[test]
fn test_echo() {
    let ctx = context();
    let rep = ctx.socket(SocketType::Rep).unwrap();
    rep.bind(ADDR).unwrap();
    let req = ctx.socket(SocketType::Req).unwrap();
    req.connect(ADDR).unwrap();

    for round in 0..3u8 {
        req.send(vec![round]).unwrap();
        let request = rep.recv().unwrap();
        assert_eq!(request, Bytes::from(vec![round]));
        rep.send(request).unwrap();
        assert_eq!(req.recv().unwrap(), Bytes::from(vec![round]));
    }
}

/// Strict REQ and REP reject out-of-order calls
#[test]
fn test_strict_alternation() {
    let ctx = context();
    let rep = ctx.socket(SocketType::Rep).unwrap();
    rep.bind(ADDR).unwrap();
    let req = ctx.socket(SocketType::Req).unwrap();
    req.connect(ADDR).unwrap();

    assert!(matches!(req.recv(), Err(TetherError::InvalidState(_))));
    assert!(matches!(rep.send("early"), Err(TetherError::InvalidState(_))));

    req.send("ping").unwrap();
    assert!(matches!(req.send("again"), Err(TetherError::InvalidState(_))));

    assert_eq!(rep.recv().unwrap(), Bytes::from_static(b"ping"));
    assert!(matches!(rep.recv(), Err(TetherError::InvalidState(_))));
    rep.send("pong").unwrap();
    assert_eq!(req.recv().unwrap(), Bytes::from_static(b"pong"));

    // Back to the start of the cycle.
    req.send("ping").unwrap();
}

/// Relaxed REQ abandons the outstanding request and only accepts the reply
/// to the newest one
#[test]
fn test_relaxed_req() {
    let ctx = context();
    let req = ctx
        .socket_with_options(
            SocketType::Req,
            ctx.config().socket_defaults.clone().with_req_relaxed(true),
        )
        .unwrap();
    req.bind(ADDR).unwrap();

    let a = ctx.socket(SocketType::Rep).unwrap();
    let b = ctx.socket(SocketType::Rep).unwrap();
    a.connect(ADDR).unwrap();
    b.connect(ADDR).unwrap();
    wait_connected(&a);
    wait_connected(&b);

    req.send("first").unwrap();
    req.send("second").unwrap();

    // One request landed on each replier.
    let (stale, fresh) = if a.recv().unwrap() == Bytes::from_static(b"first") {
        assert_eq!(b.recv().unwrap(), Bytes::from_static(b"second"));
        (a, b)
    } else {
        assert_eq!(b.recv().unwrap(), Bytes::from_static(b"first"));
        (b, a)
    };

    stale.send("reply to first").unwrap();
    std::thread::sleep(Duration::from_millis(10));
    assert_eq!(req.try_recv(), Ok(None));

    fresh.send("reply to second").unwrap();
    assert_eq!(req.recv().unwrap(), Bytes::from_static(b"reply to second"));
}

/// Each reply goes back to the requester that asked
#[test]
fn test_replies_follow_requesters() {
    let ctx = context();
    let rep = ctx.socket(SocketType::Rep).unwrap();
    rep.bind(ADDR).unwrap();

    let requesters: Vec<Socket> = (0..3)
        .map(|_| {
            let req = ctx.socket(SocketType::Req).unwrap();
            req.connect(ADDR).unwrap();
            req
        })
        .collect();
    for (i, req) in requesters.iter().enumerate() {
        req.send(format!("request {i}")).unwrap();
    }

    for _ in 0..requesters.len() {
        let request = rep.recv().unwrap();
        let mut reply = request.to_vec();
        reply.extend_from_slice(b" done");
        rep.send(reply).unwrap();
    }

    for (i, req) in requesters.iter().enumerate() {
        assert_eq!(
            req.recv().unwrap(),
            Bytes::from(format!("request {i} done"))
        );
    }
}

/// A reply to a requester that went away is dropped, and REP moves on
#[test]
fn test_reply_to_vanished_requester() {
    let ctx = context();
    let rep = ctx.socket(SocketType::Rep).unwrap();
    rep.bind(ADDR).unwrap();

    let gone = ctx.socket(SocketType::Req).unwrap();
    gone.connect(ADDR).unwrap();
    gone.send("hello?").unwrap();
    assert_eq!(rep.recv().unwrap(), Bytes::from_static(b"hello?"));
    gone.close().unwrap();

    rep.send("too late").unwrap();

    let req = ctx.socket(SocketType::Req).unwrap();
    req.connect(ADDR).unwrap();
    req.send("hi").unwrap();
    assert_eq!(rep.recv().unwrap(), Bytes::from_static(b"hi"));
    rep.send("hello").unwrap();
    assert_eq!(req.recv().unwrap(), Bytes::from_static(b"hello"));
}

/// REQ only talks to REP
#[test]
fn test_req_rejected_by_pull() {
    let ctx = context();
    let pull = ctx.socket(SocketType::Pull).unwrap();
    let monitor = pull.monitor_all().unwrap();
    pull.bind(ADDR).unwrap();

    let req = ctx.socket(SocketType::Req).unwrap();
    req.connect(ADDR).unwrap();

    assert_eq!(next_kind(&monitor), EventKind::Listening);
    assert_eq!(next_kind(&monitor), EventKind::AcceptFailed);
    assert!(req.connection_states().iter().all(|a| a.peers == 0));
}
