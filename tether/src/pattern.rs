//! Messaging pattern routing.
//!
//! A socket's attached peers are kept as [`Route`]s, each a pair of pipes.
//! [`Pattern`] decides which route a send goes to and which route a receive
//! is taken from:
//!
//! - PUSH: round-robin over attached routes
//! - PULL: fair-queue across inbound pipes
//! - PAIR: the single attached route
//! - REQ: round-robin request, reply only from the route the request used
//! - REP: fair-queue request, reply on the route it came from

use crate::pipe::Pipe;
use bytes::Bytes;
use std::sync::Arc;
use tether_core::endpoint::Endpoint;
use tether_core::error::{Result, TetherError};
use tether_core::socket_type::SocketType;
use tracing::trace;

/// One attached (or previously attached) peer.
#[derive(Debug)]
pub(crate) struct Route {
    pub id: u64,
    pub endpoint: Endpoint,
    /// Messages from this socket to the peer.
    pub outbound: Arc<Pipe>,
    /// Messages from the peer to this socket.
    pub inbound: Arc<Pipe>,
    /// Peer gone; the route is only kept until `inbound` is drained.
    pub detached: bool,
}

impl Route {
    fn can_send(&self) -> bool {
        !self.detached && !self.outbound.is_full()
    }
}

#[derive(Debug, Default)]
pub(crate) struct Routes {
    routes: Vec<Route>,
}

impl Routes {
    pub(crate) fn add(&mut self, route: Route) {
        self.routes.push(route);
    }

    pub(crate) fn remove(&mut self, id: u64) -> Option<Route> {
        let pos = self.routes.iter().position(|r| r.id == id)?;
        Some(self.routes.remove(pos))
    }

    pub(crate) fn get(&self, id: u64) -> Option<&Route> {
        self.routes.iter().find(|r| r.id == id)
    }

    /// Mark a route as detached, dropping it right away if nothing is left to read.
    pub(crate) fn detach(&mut self, id: u64) -> Option<&Route> {
        let pos = self.routes.iter().position(|r| r.id == id)?;
        if self.routes[pos].inbound.is_empty() {
            self.routes.remove(pos);
            return None;
        }
        let route = &mut self.routes[pos];
        route.detached = true;
        trace!(
            "[ROUTE] {} detached with {} messages pending",
            route.endpoint,
            route.inbound.len()
        );
        Some(&self.routes[pos])
    }

    pub(crate) fn live(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter().filter(|r| !r.detached)
    }

    pub(crate) fn clear(&mut self) -> Vec<Route> {
        std::mem::take(&mut self.routes)
    }

    fn len(&self) -> usize {
        self.routes.len()
    }

    fn prune_drained(&mut self) {
        self.routes.retain(|r| !r.detached || !r.inbound.is_empty());
    }
}

/// Outcome of a non-blocking send attempt.
#[derive(Debug)]
pub(crate) enum SendOutcome {
    Sent,
    /// No route can take the message right now.
    Full(Bytes),
}

#[derive(Debug)]
pub(crate) enum Pattern {
    Push { cursor: usize },
    Pull { cursor: usize },
    Pair,
    Req { cursor: usize, awaiting: Option<u64> },
    Rep { cursor: usize, reply_to: Option<u64> },
}

impl Pattern {
    pub(crate) fn new(socket_type: SocketType) -> Self {
        match socket_type {
            SocketType::Push => Self::Push { cursor: 0 },
            SocketType::Pull => Self::Pull { cursor: 0 },
            SocketType::Pair => Self::Pair,
            SocketType::Req => Self::Req {
                cursor: 0,
                awaiting: None,
            },
            SocketType::Rep => Self::Rep {
                cursor: 0,
                reply_to: None,
            },
        }
    }

    pub(crate) fn send(
        &mut self,
        routes: &mut Routes,
        msg: Bytes,
        req_relaxed: bool,
    ) -> Result<SendOutcome> {
        match self {
            Self::Push { cursor } => Ok(round_robin(routes, cursor, msg).0),
            Self::Pair => Ok(match routes.live().next() {
                Some(route) => push_to(route, msg),
                None => SendOutcome::Full(msg),
            }),
            Self::Req { cursor, awaiting } => {
                if awaiting.is_some() && !req_relaxed {
                    return Err(TetherError::InvalidState(
                        "REQ socket must receive a reply before sending again",
                    ));
                }
                let (outcome, route) = round_robin(routes, cursor, msg);
                if let Some(id) = route {
                    if let Some(abandoned) = awaiting.replace(id) {
                        trace!("[REQ] abandoning request on route {}", abandoned);
                    }
                }
                Ok(outcome)
            }
            Self::Rep { reply_to, .. } => {
                let Some(id) = *reply_to else {
                    return Err(TetherError::InvalidState(
                        "REP socket must receive a request before replying",
                    ));
                };
                match routes.get(id) {
                    Some(route) if !route.detached => match route.outbound.push(msg) {
                        Ok(()) => {
                            *reply_to = None;
                            Ok(SendOutcome::Sent)
                        }
                        Err(msg) => Ok(SendOutcome::Full(msg)),
                    },
                    _ => {
                        // Requester is gone; the reply has nowhere to go.
                        trace!("[REP] dropping reply for vanished route {}", id);
                        *reply_to = None;
                        Ok(SendOutcome::Sent)
                    }
                }
            }
            Self::Pull { .. } => Err(TetherError::Unsupported {
                socket_type: SocketType::Pull,
                op: "send",
            }),
        }
    }

    pub(crate) fn recv(&mut self, routes: &mut Routes) -> Result<Option<Bytes>> {
        let msg = match self {
            Self::Pull { cursor } => fair_queue(routes, cursor).map(|(msg, _)| msg),
            Self::Pair => {
                let mut cursor = 0;
                fair_queue(routes, &mut cursor).map(|(msg, _)| msg)
            }
            Self::Req { awaiting, .. } => {
                let Some(id) = *awaiting else {
                    return Err(TetherError::InvalidState(
                        "REQ socket must send a request before receiving",
                    ));
                };
                let msg = routes.get(id).and_then(|r| r.inbound.pop());
                if msg.is_some() {
                    *awaiting = None;
                }
                msg
            }
            Self::Rep { cursor, reply_to } => {
                if reply_to.is_some() {
                    return Err(TetherError::InvalidState(
                        "REP socket must send a reply before receiving again",
                    ));
                }
                fair_queue(routes, cursor).map(|(msg, id)| {
                    *reply_to = Some(id);
                    msg
                })
            }
            Self::Push { .. } => {
                return Err(TetherError::Unsupported {
                    socket_type: SocketType::Push,
                    op: "recv",
                })
            }
        };
        routes.prune_drained();
        Ok(msg)
    }

    /// True if a non-blocking receive would yield a message.
    pub(crate) fn readable(&self, routes: &Routes) -> bool {
        match self {
            Self::Push { .. } => false,
            Self::Req { awaiting, .. } => awaiting
                .and_then(|id| routes.get(id))
                .is_some_and(|r| !r.inbound.is_empty()),
            Self::Rep {
                reply_to: Some(_), ..
            } => false,
            Self::Pull { .. } | Self::Pair | Self::Rep { .. } => {
                routes.routes.iter().any(|r| !r.inbound.is_empty())
            }
        }
    }

    /// True if a non-blocking send would succeed.
    pub(crate) fn writable(&self, routes: &Routes, req_relaxed: bool) -> bool {
        match self {
            Self::Pull { .. } => false,
            Self::Push { .. } => routes.live().any(Route::can_send),
            Self::Pair => routes.live().next().is_some_and(Route::can_send),
            Self::Req { awaiting, .. } => {
                (awaiting.is_none() || req_relaxed) && routes.live().any(Route::can_send)
            }
            Self::Rep { reply_to, .. } => match reply_to {
                None => false,
                Some(id) => routes
                    .get(*id)
                    .map_or(true, |r| r.detached || !r.outbound.is_full()),
            },
        }
    }
}

fn push_to(route: &Route, msg: Bytes) -> SendOutcome {
    match route.outbound.push(msg) {
        Ok(()) => SendOutcome::Sent,
        Err(msg) => SendOutcome::Full(msg),
    }
}

/// Hand `msg` to the first live route at or after `cursor` with room.
fn round_robin(routes: &Routes, cursor: &mut usize, mut msg: Bytes) -> (SendOutcome, Option<u64>) {
    let n = routes.len();
    for step in 0..n {
        let idx = (*cursor + step) % n;
        let route = &routes.routes[idx];
        if route.detached {
            continue;
        }
        match route.outbound.push(msg) {
            Ok(()) => {
                *cursor = (idx + 1) % n;
                return (SendOutcome::Sent, Some(route.id));
            }
            Err(back) => msg = back,
        }
    }
    (SendOutcome::Full(msg), None)
}

/// Take the next message from the first non-empty inbound pipe at or after `cursor`.
fn fair_queue(routes: &Routes, cursor: &mut usize) -> Option<(Bytes, u64)> {
    let n = routes.len();
    for step in 0..n {
        let idx = (*cursor + step) % n;
        let route = &routes.routes[idx];
        if let Some(msg) = route.inbound.pop() {
            *cursor = (idx + 1) % n;
            return Some((msg, route.id));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(id: u64, hwm: usize) -> Route {
        Route {
            id,
            endpoint: Endpoint::Inproc(format!("r{id}")),
            outbound: Arc::new(Pipe::new(hwm)),
            inbound: Arc::new(Pipe::new(hwm)),
            detached: false,
        }
    }

    fn msg(s: &'static str) -> Bytes {
        Bytes::from_static(s.as_bytes())
    }

    #[test]
    fn test_push_round_robin() {
        let mut routes = Routes::default();
        routes.add(route(1, 0));
        routes.add(route(2, 0));
        let mut push = Pattern::new(SocketType::Push);

        for s in ["a", "b", "c"] {
            assert!(matches!(push.send(&mut routes, msg(s), false).unwrap(), SendOutcome::Sent));
        }
        assert_eq!(routes.get(1).unwrap().outbound.len(), 2);
        assert_eq!(routes.get(2).unwrap().outbound.len(), 1);
    }

    #[test]
    fn test_push_skips_full_and_detached_routes() {
        let mut routes = Routes::default();
        routes.add(route(1, 1));
        routes.add(route(2, 1));
        let mut push = Pattern::new(SocketType::Push);

        push.send(&mut routes, msg("a"), false).unwrap();
        push.send(&mut routes, msg("b"), false).unwrap();
        assert!(!push.writable(&routes, false));
        assert!(matches!(
            push.send(&mut routes, msg("c"), false).unwrap(),
            SendOutcome::Full(m) if m == msg("c")
        ));

        routes.get(1).unwrap().outbound.pop();
        assert!(push.writable(&routes, false));
    }

    #[test]
    fn test_pull_fair_queue() {
        let mut routes = Routes::default();
        routes.add(route(1, 0));
        routes.add(route(2, 0));
        for s in ["a1", "a2"] {
            routes.get(1).unwrap().inbound.push(msg(s)).unwrap();
        }
        routes.get(2).unwrap().inbound.push(msg("b1")).unwrap();

        let mut pull = Pattern::new(SocketType::Pull);
        assert!(pull.readable(&routes));
        let got: Vec<_> = std::iter::from_fn(|| pull.recv(&mut routes).unwrap()).collect();
        assert_eq!(got, vec![msg("a1"), msg("b1"), msg("a2")]);
        assert!(!pull.readable(&routes));
    }

    #[test]
    fn test_detached_route_drains_then_disappears() {
        let mut routes = Routes::default();
        routes.add(route(1, 0));
        routes.get(1).unwrap().inbound.push(msg("last")).unwrap();
        assert!(routes.detach(1).is_some());

        let mut pull = Pattern::new(SocketType::Pull);
        assert_eq!(pull.recv(&mut routes).unwrap(), Some(msg("last")));
        assert!(routes.get(1).is_none());

        routes.add(route(2, 0));
        assert!(routes.detach(2).is_none());
        assert!(routes.get(2).is_none());
    }

    #[test]
    fn test_req_strict_alternation() {
        let mut routes = Routes::default();
        routes.add(route(1, 0));
        let mut req = Pattern::new(SocketType::Req);

        assert!(matches!(req.recv(&mut routes), Err(TetherError::InvalidState(_))));
        req.send(&mut routes, msg("ping"), false).unwrap();
        assert!(matches!(
            req.send(&mut routes, msg("again"), false),
            Err(TetherError::InvalidState(_))
        ));
        assert!(!req.writable(&routes, false));

        assert_eq!(req.recv(&mut routes).unwrap(), None);
        routes.get(1).unwrap().inbound.push(msg("pong")).unwrap();
        assert!(req.readable(&routes));
        assert_eq!(req.recv(&mut routes).unwrap(), Some(msg("pong")));
        assert!(req.writable(&routes, false));
    }

    #[test]
    fn test_req_relaxed_resend() {
        let mut routes = Routes::default();
        routes.add(route(1, 0));
        routes.add(route(2, 0));
        let mut req = Pattern::new(SocketType::Req);

        req.send(&mut routes, msg("first"), true).unwrap();
        req.send(&mut routes, msg("second"), true).unwrap();

        // Only the route of the latest request is read from.
        routes.get(1).unwrap().inbound.push(msg("stale")).unwrap();
        assert!(!req.readable(&routes));
        routes.get(2).unwrap().inbound.push(msg("fresh")).unwrap();
        assert_eq!(req.recv(&mut routes).unwrap(), Some(msg("fresh")));
    }

    #[test]
    fn test_rep_replies_on_request_route() {
        let mut routes = Routes::default();
        routes.add(route(1, 0));
        routes.add(route(2, 0));
        routes.get(2).unwrap().inbound.push(msg("req")).unwrap();
        let mut rep = Pattern::new(SocketType::Rep);

        assert!(matches!(
            rep.send(&mut routes, msg("early"), false),
            Err(TetherError::InvalidState(_))
        ));
        assert_eq!(rep.recv(&mut routes).unwrap(), Some(msg("req")));
        assert!(matches!(rep.recv(&mut routes), Err(TetherError::InvalidState(_))));

        rep.send(&mut routes, msg("rep"), false).unwrap();
        assert_eq!(routes.get(2).unwrap().outbound.pop(), Some(msg("rep")));
        assert!(routes.get(1).unwrap().outbound.is_empty());
    }

    #[test]
    fn test_rep_drops_reply_to_vanished_route() {
        let mut routes = Routes::default();
        routes.add(route(1, 0));
        routes.get(1).unwrap().inbound.push(msg("req")).unwrap();
        let mut rep = Pattern::new(SocketType::Rep);

        rep.recv(&mut routes).unwrap();
        routes.remove(1);
        assert!(matches!(rep.send(&mut routes, msg("rep"), false).unwrap(), SendOutcome::Sent));
        assert!(!rep.writable(&routes, false));
    }

    #[test]
    fn test_pair_uses_single_route() {
        let mut routes = Routes::default();
        let mut pair = Pattern::new(SocketType::Pair);
        assert!(matches!(pair.send(&mut routes, msg("x"), false).unwrap(), SendOutcome::Full(_)));

        routes.add(route(7, 0));
        pair.send(&mut routes, msg("x"), false).unwrap();
        assert_eq!(routes.get(7).unwrap().outbound.pop(), Some(msg("x")));
    }

    #[test]
    fn test_unsupported_directions() {
        let mut routes = Routes::default();
        assert!(matches!(
            Pattern::new(SocketType::Push).recv(&mut routes),
            Err(TetherError::Unsupported { op: "recv", .. })
        ));
        assert!(matches!(
            Pattern::new(SocketType::Pull).send(&mut routes, msg("x"), false),
            Err(TetherError::Unsupported { op: "send", .. })
        ));
    }
}
