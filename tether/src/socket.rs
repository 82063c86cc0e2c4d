//! Sockets.
//!
//! A [`Socket`] is a handle on a [`SocketCore`], which owns everything about
//! one socket behind a single state lock:
//! - one [`Lifecycle`] per bound address and per connected address
//! - the routes (pipe pairs) to attached peers and the [`Pattern`] over them
//! - the monitors fed by every lifecycle transition
//!
//! # Locking
//!
//! Locks are taken in this order: socket state, then address registry or
//! pipe, then readiness. The only place two socket states are held at once
//! is a connection attempt on the reactor thread (connector, then binder).
//! Peers are told about a lost link only after the local lock is released.
//!
//! # Peer loss
//!
//! Closing a socket tells every attached peer synchronously. A connector that
//! loses its binder reports `DISCONNECTED`, then schedules a retry
//! (`CONNECT_RETRIED`), and keeps retrying until it is closed or the address
//! is disconnected. A binder that loses a connector reports `DISCONNECTED`
//! and keeps draining whatever that connector left in the pipe.

use crate::context::Shared;
use crate::monitor::{EventChannel, Monitor};
use crate::pattern::{Pattern, Route, Routes, SendOutcome};
use crate::pipe::Pipe;
use crate::reactor::Job;
use crate::readiness::{deadline_after, Readiness};
use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use hashbrown::HashMap;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tether_core::endpoint::Endpoint;
use tether_core::error::{Result, TetherError};
use tether_core::monitor::{EventDetail, EventKind, EventMask, SocketEvent};
use tether_core::options::SocketOptions;
use tether_core::reconnect::ReconnectState;
use tether_core::socket_type::SocketType;
use tether_core::state::{ConnectionState, Lifecycle, Role, Trigger};
use tracing::{debug, trace, warn};

/// Snapshot of one bound or connected address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub endpoint: Endpoint,
    pub role: Role,
    pub state: ConnectionState,
    /// Attached peers: accepted connections for a bind, 0 or 1 for a connect.
    pub peers: usize,
}

/// Readiness of a socket as seen by `select`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct PollState {
    pub readable: bool,
    pub writable: bool,
    pub errored: bool,
}

/// Monitors attached to one socket.
#[derive(Debug, Default)]
struct MonitorSet {
    channels: SmallVec<[Arc<EventChannel>; 2]>,
}

impl MonitorSet {
    fn attach(&mut self, channel: Arc<EventChannel>) {
        self.channels.retain(|c| !c.is_closed());
        self.channels.push(channel);
    }

    fn emit(&mut self, socket_type: SocketType, event: SocketEvent) {
        debug!("[{}] {}", socket_type, event);
        self.channels.retain(|c| !c.is_closed());
        for channel in &self.channels {
            channel.append(&event);
        }
    }

    /// Drive `lifecycle` with `trigger` and emit the resulting event.
    fn transition(
        &mut self,
        socket_type: SocketType,
        lifecycle: &mut Lifecycle,
        trigger: Trigger,
        endpoint: &Endpoint,
        detail: EventDetail,
    ) -> Result<EventKind> {
        let kind = lifecycle.apply(trigger)?;
        self.emit(
            socket_type,
            SocketEvent::new(kind, Some(endpoint.clone())).with_detail(detail),
        );
        Ok(kind)
    }
}

#[derive(Debug)]
struct Accepted {
    route_id: u64,
    peer: Weak<SocketCore>,
}

#[derive(Debug)]
struct BindSlot {
    lifecycle: Lifecycle,
    peers: Vec<Accepted>,
}

#[derive(Debug)]
struct PeerLink {
    peer: Weak<SocketCore>,
    /// Route id on the binder's side.
    id: u64,
}

#[derive(Debug)]
struct ConnectSlot {
    lifecycle: Lifecycle,
    reconnect: ReconnectState,
    /// Only reactor jobs carrying this epoch act on the slot.
    epoch: u64,
    route_id: u64,
    outbound: Arc<Pipe>,
    inbound: Arc<Pipe>,
    link: Option<PeerLink>,
}

#[derive(Debug)]
struct SocketState {
    options: SocketOptions,
    binds: HashMap<Endpoint, BindSlot>,
    connects: HashMap<Endpoint, ConnectSlot>,
    routes: Routes,
    pattern: Pattern,
    monitors: MonitorSet,
    last_endpoint: Option<Endpoint>,
}

fn has_peer(state: &SocketState) -> bool {
    state.binds.values().any(|b| !b.peers.is_empty())
        || state.connects.values().any(|c| c.link.is_some())
}

#[derive(Debug)]
pub(crate) struct SocketCore {
    id: u64,
    socket_type: SocketType,
    shared: Arc<Shared>,
    this: Weak<SocketCore>,
    closed: AtomicBool,
    readiness: Arc<Readiness>,
    state: Mutex<SocketState>,
}

impl SocketCore {
    pub(crate) fn new(shared: Arc<Shared>, socket_type: SocketType, options: SocketOptions) -> Arc<Self> {
        let id = shared.next_id();
        trace!("[{}] socket {} created", socket_type, id);
        Arc::new_cyclic(|this| Self {
            id,
            socket_type,
            shared,
            this: this.clone(),
            closed: AtomicBool::new(false),
            readiness: Arc::new(Readiness::new()),
            state: Mutex::new(SocketState {
                options,
                binds: HashMap::new(),
                connects: HashMap::new(),
                routes: Routes::default(),
                pattern: Pattern::new(socket_type),
                monitors: MonitorSet::default(),
                last_endpoint: None,
            }),
        })
    }

    #[inline]
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        self.shared.check_alive()?;
        if self.is_closed() {
            return Err(TetherError::SocketClosed);
        }
        Ok(())
    }

    pub(crate) fn readiness(&self) -> &Arc<Readiness> {
        &self.readiness
    }

    // ---------------------------------------------------------------------
    // Address registry
    // ---------------------------------------------------------------------

    fn register(&self, endpoint: &Endpoint) -> Result<()> {
        match self.shared.registry.entry(endpoint.clone()) {
            Entry::Occupied(mut entry) => {
                let live = entry.get().upgrade().is_some_and(|s| !s.is_closed());
                if live {
                    return Err(TetherError::AddressInUse(endpoint.clone()));
                }
                entry.insert(self.this.clone());
            }
            Entry::Vacant(entry) => {
                entry.insert(self.this.clone());
            }
        }
        Ok(())
    }

    fn unregister(&self, endpoint: &Endpoint) {
        self.shared
            .registry
            .remove_if(endpoint, |_, owner| owner.ptr_eq(&self.this));
    }

    fn lookup_binder(&self, endpoint: &Endpoint) -> Option<Arc<SocketCore>> {
        self.shared
            .registry
            .get(endpoint)
            .and_then(|owner| owner.upgrade())
    }

    // ---------------------------------------------------------------------
    // bind / unbind
    // ---------------------------------------------------------------------

    fn bind(&self, endpoint: Endpoint) -> Result<()> {
        self.shared.check_alive()?;
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if self.is_closed() {
            return Err(TetherError::SocketClosed);
        }

        let mut lifecycle = Lifecycle::new(Role::Bind);
        if let Err(err) = self.register(&endpoint) {
            state.monitors.transition(
                self.socket_type,
                &mut lifecycle,
                Trigger::BindFailed,
                &endpoint,
                EventDetail::Reason(err.to_string()),
            )?;
            return Err(err);
        }

        state.monitors.transition(
            self.socket_type,
            &mut lifecycle,
            Trigger::Bind,
            &endpoint,
            EventDetail::None,
        )?;
        state.binds.insert(
            endpoint.clone(),
            BindSlot {
                lifecycle,
                peers: Vec::new(),
            },
        );
        state.last_endpoint = Some(endpoint);
        Ok(())
    }

    fn unbind(&self, endpoint: Endpoint) -> Result<()> {
        self.shared.check_alive()?;
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if self.is_closed() {
            return Err(TetherError::SocketClosed);
        }

        let Some(mut slot) = state.binds.remove(&endpoint) else {
            state.monitors.transition(
                self.socket_type,
                &mut Lifecycle::new(Role::Bind),
                Trigger::CloseFailed,
                &endpoint,
                EventDetail::Reason("endpoint not bound".to_string()),
            )?;
            return Err(TetherError::NotBound(endpoint));
        };
        self.unregister(&endpoint);

        let mut lost = Vec::with_capacity(slot.peers.len());
        while let Some(accepted) = slot.peers.pop() {
            if let Some(route) = state.routes.remove(accepted.route_id) {
                route.outbound.set_writer(None);
                route.inbound.set_reader(None);
            }
            state.monitors.transition(
                self.socket_type,
                &mut slot.lifecycle,
                Trigger::PeerLost {
                    remaining: slot.peers.len(),
                },
                &endpoint,
                EventDetail::None,
            )?;
            lost.push(accepted);
        }
        debug!("[{}] unbound {}", self.socket_type, endpoint);
        drop(guard);

        self.readiness.notify();
        for accepted in lost {
            if let Some(peer) = accepted.peer.upgrade() {
                peer.link_lost(&endpoint, accepted.route_id);
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // connect / disconnect / attempts
    // ---------------------------------------------------------------------

    fn connect(&self, endpoint: Endpoint) -> Result<()> {
        self.shared.check_alive()?;
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if self.is_closed() {
            return Err(TetherError::SocketClosed);
        }
        if state.connects.contains_key(&endpoint) {
            return Err(TetherError::InvalidState("endpoint already connected"));
        }

        let outbound = Arc::new(Pipe::new(state.options.send_hwm));
        outbound.set_writer(Some(Arc::clone(&self.readiness)));
        let inbound = Arc::new(Pipe::new(state.options.recv_hwm));
        inbound.set_reader(Some(Arc::clone(&self.readiness)));

        let route_id = self.shared.next_id();
        let mut slot = ConnectSlot {
            lifecycle: Lifecycle::new(Role::Connect),
            reconnect: ReconnectState::new(&state.options),
            epoch: 0,
            route_id,
            outbound: Arc::clone(&outbound),
            inbound: Arc::clone(&inbound),
            link: None,
        };
        state.monitors.transition(
            self.socket_type,
            &mut slot.lifecycle,
            Trigger::Connect,
            &endpoint,
            EventDetail::None,
        )?;
        let job = self.rearm(&mut slot, &endpoint, Duration::ZERO);

        // Messages sent before the handshake queue on this route.
        state.routes.add(Route {
            id: route_id,
            endpoint: endpoint.clone(),
            outbound,
            inbound,
            detached: false,
        });
        state.connects.insert(endpoint.clone(), slot);
        state.last_endpoint = Some(endpoint);
        drop(guard);

        self.readiness.notify();
        match job {
            Some(job) => self.shared.schedule(job),
            None => Ok(()),
        }
    }

    fn disconnect(&self, endpoint: Endpoint) -> Result<()> {
        self.shared.check_alive()?;
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if self.is_closed() {
            return Err(TetherError::SocketClosed);
        }

        let Some(mut slot) = state.connects.remove(&endpoint) else {
            state.monitors.transition(
                self.socket_type,
                &mut Lifecycle::new(Role::Connect),
                Trigger::CloseFailed,
                &endpoint,
                EventDetail::Reason("endpoint not connected".to_string()),
            )?;
            return Err(TetherError::NotConnected(endpoint));
        };

        state.routes.remove(slot.route_id);
        slot.outbound.set_writer(None);
        slot.inbound.set_reader(None);
        let link = slot.link.take();
        if link.is_some() {
            state.monitors.transition(
                self.socket_type,
                &mut slot.lifecycle,
                Trigger::PeerLost { remaining: 0 },
                &endpoint,
                EventDetail::None,
            )?;
        }
        debug!("[{}] disconnected {}", self.socket_type, endpoint);
        drop(guard);

        self.readiness.notify();
        if let Some(link) = link {
            if let Some(peer) = link.peer.upgrade() {
                peer.peer_lost(&endpoint, link.id);
            }
        }
        Ok(())
    }

    /// Give `slot` a fresh epoch and build the job that will act on it.
    ///
    /// A delay too large to express as an `Instant` yields no job: the slot
    /// stays armed but its retry never fires.
    fn rearm(&self, slot: &mut ConnectSlot, endpoint: &Endpoint, delay: Duration) -> Option<Job> {
        slot.epoch = self.shared.next_id();
        let Some(due) = deadline_after(delay) else {
            debug!(
                "[{}] retry on {} in {:?} is beyond any deadline, not scheduled",
                self.socket_type, endpoint, delay
            );
            return None;
        };
        Some(Job {
            due,
            socket: self.this.clone(),
            endpoint: endpoint.clone(),
            epoch: slot.epoch,
        })
    }

    fn submit(&self, job: Option<Job>) {
        let Some(job) = job else {
            return;
        };
        if let Err(err) = self.shared.schedule(job) {
            debug!("[{}] retry not scheduled: {}", self.socket_type, err);
        }
    }

    /// Run one connection attempt for `endpoint`. Called by the reactor.
    pub(crate) fn attempt(&self, endpoint: &Endpoint, epoch: u64) {
        if self.shared.is_terminated() {
            return;
        }
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if self.is_closed() {
            return;
        }

        let exclusive_busy = self.socket_type.is_exclusive() && has_peer(state);
        let Some(slot) = state.connects.get_mut(endpoint) else {
            return;
        };
        if slot.epoch != epoch {
            trace!("[{}] stale attempt on {} ignored", self.socket_type, endpoint);
            return;
        }

        if slot.lifecycle.state() == ConnectionState::Retrying {
            if let Err(err) = state.monitors.transition(
                self.socket_type,
                &mut slot.lifecycle,
                Trigger::RetryFired,
                endpoint,
                EventDetail::None,
            ) {
                warn!("[{}] {}", self.socket_type, err);
                return;
            }
        }
        if slot.lifecycle.state() != ConnectionState::ConnectDelayed {
            return;
        }

        let outcome = if exclusive_busy {
            Err(format!("{} socket already has a peer", self.socket_type))
        } else {
            match self.lookup_binder(endpoint) {
                None => Err("no listener".to_string()),
                Some(binder) => self
                    .join(&binder, endpoint, slot, &state.options)
                    .map(|()| binder),
            }
        };

        match outcome {
            Ok(binder) => {
                slot.reconnect.reset();
                if let Err(err) = state.monitors.transition(
                    self.socket_type,
                    &mut slot.lifecycle,
                    Trigger::HandshakeOk,
                    endpoint,
                    EventDetail::None,
                ) {
                    warn!("[{}] {}", self.socket_type, err);
                }
                drop(guard);

                binder.readiness.notify();
                self.readiness.notify();
            }
            Err(reason) => {
                let delay = slot.reconnect.next_delay();
                debug!(
                    "[{}] attempt on {} failed ({}), retry in {:?}",
                    self.socket_type, endpoint, reason, delay
                );
                if let Err(err) = state.monitors.transition(
                    self.socket_type,
                    &mut slot.lifecycle,
                    Trigger::AttemptFailed,
                    endpoint,
                    EventDetail::Interval(delay),
                ) {
                    warn!("[{}] {}", self.socket_type, err);
                    return;
                }
                let job = self.rearm(slot, endpoint, delay);
                drop(guard);
                self.submit(job);
            }
        }
    }

    /// Attach `slot`'s pipes to `binder`. Runs with our state lock held.
    fn join(
        &self,
        binder: &Arc<SocketCore>,
        endpoint: &Endpoint,
        slot: &mut ConnectSlot,
        options: &SocketOptions,
    ) -> std::result::Result<(), String> {
        if std::ptr::eq(binder.as_ref(), self) {
            return Err("socket cannot connect to itself".to_string());
        }

        let mut guard = binder.state.lock();
        let bstate = &mut *guard;
        if binder.is_closed() {
            return Err("listener closed".to_string());
        }
        let busy = binder.socket_type.is_exclusive() && has_peer(bstate);
        let Some(bslot) = bstate.binds.get_mut(endpoint) else {
            return Err("listener unbound".to_string());
        };

        let (trigger, rejection) = if !binder.socket_type.is_compatible(self.socket_type) {
            (
                Trigger::AcceptFailed,
                Some(format!(
                    "{} socket cannot accept {} peer",
                    binder.socket_type, self.socket_type
                )),
            )
        } else if busy {
            (
                Trigger::AcceptFailed,
                Some(format!("{} socket already has a peer", binder.socket_type)),
            )
        } else {
            (Trigger::Accept, None)
        };

        let detail = rejection
            .clone()
            .map_or(EventDetail::None, EventDetail::Reason);
        bstate
            .monitors
            .transition(binder.socket_type, &mut bslot.lifecycle, trigger, endpoint, detail)
            .map_err(|e| e.to_string())?;
        if let Some(reason) = rejection {
            return Err(reason);
        }

        slot.outbound.set_hwm(SocketOptions::pipe_hwm(
            options.send_hwm,
            bstate.options.recv_hwm,
        ));
        slot.inbound.set_hwm(SocketOptions::pipe_hwm(
            bstate.options.send_hwm,
            options.recv_hwm,
        ));
        slot.outbound.set_reader(Some(Arc::clone(&binder.readiness)));
        slot.inbound.set_writer(Some(Arc::clone(&binder.readiness)));

        let link_id = self.shared.next_id();
        bstate.routes.add(Route {
            id: link_id,
            endpoint: endpoint.clone(),
            outbound: Arc::clone(&slot.inbound),
            inbound: Arc::clone(&slot.outbound),
            detached: false,
        });
        bslot.peers.push(Accepted {
            route_id: link_id,
            peer: self.this.clone(),
        });
        slot.link = Some(PeerLink {
            peer: Arc::downgrade(binder),
            id: link_id,
        });
        Ok(())
    }

    /// The binder behind `endpoint` dropped link `link_id`.
    pub(crate) fn link_lost(&self, endpoint: &Endpoint, link_id: u64) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if self.is_closed() {
            return;
        }
        let Some(slot) = state.connects.get_mut(endpoint) else {
            return;
        };
        if slot.link.as_ref().map(|l| l.id) != Some(link_id) {
            return;
        }
        slot.link = None;
        slot.outbound.set_reader(None);
        slot.inbound.set_writer(None);

        let delay = slot.reconnect.next_delay();
        for (trigger, detail) in [
            (Trigger::PeerLost { remaining: 0 }, EventDetail::None),
            (Trigger::RetryScheduled, EventDetail::Interval(delay)),
        ] {
            if let Err(err) = state.monitors.transition(
                self.socket_type,
                &mut slot.lifecycle,
                trigger,
                endpoint,
                detail,
            ) {
                warn!("[{}] {}", self.socket_type, err);
                return;
            }
        }
        let job = self.rearm(slot, endpoint, delay);
        drop(guard);

        self.readiness.notify();
        self.submit(job);
    }

    /// The connector on link `link_id` of `endpoint` went away.
    pub(crate) fn peer_lost(&self, endpoint: &Endpoint, link_id: u64) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if self.is_closed() {
            return;
        }
        let Some(slot) = state.binds.get_mut(endpoint) else {
            return;
        };
        let Some(pos) = slot.peers.iter().position(|p| p.route_id == link_id) else {
            return;
        };
        slot.peers.remove(pos);
        if let Some(route) = state.routes.get(link_id) {
            route.outbound.set_writer(None);
        }
        state.routes.detach(link_id);

        if let Err(err) = state.monitors.transition(
            self.socket_type,
            &mut slot.lifecycle,
            Trigger::PeerLost {
                remaining: slot.peers.len(),
            },
            endpoint,
            EventDetail::None,
        ) {
            warn!("[{}] {}", self.socket_type, err);
        }
        drop(guard);
        self.readiness.notify();
    }

    // ---------------------------------------------------------------------
    // close
    // ---------------------------------------------------------------------

    /// Close the socket. Idempotent.
    pub(crate) fn close(&self) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut lost = Vec::new();
        for (endpoint, mut slot) in state.binds.drain() {
            self.unregister(&endpoint);
            for accepted in slot.peers.drain(..) {
                lost.push((endpoint.clone(), accepted));
            }
        }

        let mut gone = Vec::new();
        for (endpoint, mut slot) in state.connects.drain() {
            if let Some(link) = slot.link.take() {
                gone.push((endpoint, link));
            }
        }

        for route in state.routes.clear() {
            route.outbound.set_writer(None);
            route.inbound.set_reader(None);
        }

        let endpoint = state.last_endpoint.clone();
        state
            .monitors
            .emit(self.socket_type, SocketEvent::new(EventKind::Closed, endpoint));
        state.monitors.channels.clear();
        drop(guard);

        self.shared.forget_socket(self.id);
        self.readiness.notify();

        for (endpoint, accepted) in lost {
            if let Some(peer) = accepted.peer.upgrade() {
                peer.link_lost(&endpoint, accepted.route_id);
            }
        }
        for (endpoint, link) in gone {
            if let Some(peer) = link.peer.upgrade() {
                peer.peer_lost(&endpoint, link.id);
            }
        }
    }

    pub(crate) fn close_for_teardown(&self) {
        self.close();
    }

    // ---------------------------------------------------------------------
    // data path
    // ---------------------------------------------------------------------

    fn try_send_once(&self, msg: Bytes) -> Result<SendOutcome> {
        self.ensure_open()?;
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if self.is_closed() {
            return Err(TetherError::SocketClosed);
        }
        let relaxed = state.options.req_relaxed;
        state.pattern.send(&mut state.routes, msg, relaxed)
    }

    fn try_recv_once(&self) -> Result<Option<Bytes>> {
        self.ensure_open()?;
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if self.is_closed() {
            return Err(TetherError::SocketClosed);
        }
        state.pattern.recv(&mut state.routes)
    }

    fn send_with(&self, mut msg: Bytes, timeout: Option<Duration>) -> Result<()> {
        if !self.socket_type.can_send() {
            return Err(TetherError::Unsupported {
                socket_type: self.socket_type,
                op: "send",
            });
        }
        let deadline = timeout.and_then(deadline_after);
        loop {
            let seen = self.readiness.generation();
            match self.try_send_once(msg)? {
                SendOutcome::Sent => {
                    trace!("[{}] message sent", self.socket_type);
                    return Ok(());
                }
                SendOutcome::Full(back) => msg = back,
            }
            match timeout {
                Some(d) if d.is_zero() => return Err(TetherError::WouldBlock),
                Some(d) if !self.readiness.wait_past(seen, deadline) => {
                    return Err(TetherError::TimedOut(d))
                }
                Some(_) => {}
                None => {
                    self.readiness.wait_past(seen, None);
                }
            }
        }
    }

    fn recv_with(&self, timeout: Option<Duration>) -> Result<Bytes> {
        if !self.socket_type.can_recv() {
            return Err(TetherError::Unsupported {
                socket_type: self.socket_type,
                op: "recv",
            });
        }
        let deadline = timeout.and_then(deadline_after);
        loop {
            let seen = self.readiness.generation();
            if let Some(msg) = self.try_recv_once()? {
                trace!("[{}] message received ({} bytes)", self.socket_type, msg.len());
                return Ok(msg);
            }
            match timeout {
                Some(d) if d.is_zero() => return Err(TetherError::WouldBlock),
                Some(d) if !self.readiness.wait_past(seen, deadline) => {
                    return Err(TetherError::TimedOut(d))
                }
                Some(_) => {}
                None => {
                    self.readiness.wait_past(seen, None);
                }
            }
        }
    }

    pub(crate) fn poll(&self) -> PollState {
        if self.shared.is_terminated() || self.is_closed() {
            return PollState {
                errored: true,
                ..PollState::default()
            };
        }
        let state = self.state.lock();
        if self.is_closed() {
            return PollState {
                errored: true,
                ..PollState::default()
            };
        }
        PollState {
            readable: state.pattern.readable(&state.routes),
            writable: state
                .pattern
                .writable(&state.routes, state.options.req_relaxed),
            errored: false,
        }
    }

    // ---------------------------------------------------------------------
    // monitors, options, introspection
    // ---------------------------------------------------------------------

    fn monitor(&self, mask: EventMask) -> Result<Monitor> {
        self.ensure_open()?;
        let mut state = self.state.lock();
        if self.is_closed() {
            return Err(TetherError::SocketClosed);
        }
        let channel = Arc::new(EventChannel::new(mask));
        state.monitors.attach(Arc::clone(&channel));
        trace!("[{}] monitor attached (filter {:#x})", self.socket_type, mask.bits());
        Ok(Monitor::new(channel))
    }

    fn options(&self) -> SocketOptions {
        self.state.lock().options.clone()
    }

    fn set_options(&self, options: SocketOptions) -> Result<()> {
        options.validate()?;
        self.ensure_open()?;
        let mut guard = self.state.lock();
        let state = &mut *guard;
        for slot in state.connects.values_mut() {
            slot.reconnect = ReconnectState::new(&options);
        }
        state.options = options;
        Ok(())
    }

    fn last_endpoint(&self) -> Option<Endpoint> {
        self.state.lock().last_endpoint.clone()
    }

    fn connection_states(&self) -> Vec<Attachment> {
        let state = self.state.lock();
        let binds = state.binds.iter().map(|(endpoint, slot)| Attachment {
            endpoint: endpoint.clone(),
            role: Role::Bind,
            state: slot.lifecycle.state(),
            peers: slot.peers.len(),
        });
        let connects = state.connects.iter().map(|(endpoint, slot)| Attachment {
            endpoint: endpoint.clone(),
            role: Role::Connect,
            state: slot.lifecycle.state(),
            peers: usize::from(slot.link.is_some()),
        });
        let mut all: Vec<Attachment> = binds.chain(connects).collect();
        all.sort_by_key(|a| a.endpoint.to_string());
        all
    }
}

/// A messaging socket.
///
/// Created by [`Context::socket`](crate::Context::socket). Every method takes
/// `&self` and the handle is `Send + Sync`, so a socket blocked in `recv` on
/// one thread can be closed from another; the blocked call then fails with
/// [`TetherError::SocketClosed`]. Dropping the handle closes the socket.
#[derive(Debug)]
pub struct Socket {
    core: Arc<SocketCore>,
}

impl Socket {
    pub(crate) fn new(core: Arc<SocketCore>) -> Self {
        Self { core }
    }

    pub(crate) fn core(&self) -> &Arc<SocketCore> {
        &self.core
    }

    pub fn socket_type(&self) -> SocketType {
        self.core.socket_type
    }

    /// Start listening on `addr`.
    ///
    /// Emits `LISTENING`, or `BIND_FAILED` and returns `AddressInUse` when a
    /// live socket of this context already listens there.
    pub fn bind(&self, addr: &str) -> Result<()> {
        let endpoint = Endpoint::parse(addr)?;
        self.core.bind(endpoint)
    }

    /// Stop listening on `addr`, dropping the peers accepted there.
    ///
    /// Emits `DISCONNECTED` per dropped peer. Unbinding an address that is not
    /// bound emits `CLOSE_FAILED` and returns `NotBound`.
    pub fn unbind(&self, addr: &str) -> Result<()> {
        let endpoint = Endpoint::parse(addr)?;
        self.core.unbind(endpoint)
    }

    /// Connect to `addr`.
    ///
    /// Returns as soon as `CONNECT_DELAYED` is emitted; the handshake runs on
    /// the context's reactor and is retried every `reconnect_ivl` (with
    /// backoff up to `reconnect_ivl_max`) until it succeeds. Messages sent in
    /// the meantime are queued up to the high-water mark.
    pub fn connect(&self, addr: &str) -> Result<()> {
        let endpoint = Endpoint::parse(addr)?;
        self.core.connect(endpoint)
    }

    /// Drop the connection to `addr` and stop retrying it.
    ///
    /// Disconnecting an address that is not connected emits `CLOSE_FAILED` and
    /// returns `NotConnected`.
    pub fn disconnect(&self, addr: &str) -> Result<()> {
        let endpoint = Endpoint::parse(addr)?;
        self.core.disconnect(endpoint)
    }

    /// Send a message, honouring `send_timeout` when no peer can take it.
    pub fn send(&self, msg: impl Into<Bytes>) -> Result<()> {
        let timeout = self.core.options().send_timeout;
        self.core.send_with(msg.into(), timeout)
    }

    /// Send a message or fail with `WouldBlock` right away.
    pub fn try_send(&self, msg: impl Into<Bytes>) -> Result<()> {
        self.core.send_with(msg.into(), Some(Duration::ZERO))
    }

    /// Receive a message, honouring `recv_timeout`.
    pub fn recv(&self) -> Result<Bytes> {
        let timeout = self.core.options().recv_timeout;
        self.core.recv_with(timeout)
    }

    /// Receive a message if one is ready.
    pub fn try_recv(&self) -> Result<Option<Bytes>> {
        match self.core.recv_with(Some(Duration::ZERO)) {
            Ok(msg) => Ok(Some(msg)),
            Err(TetherError::WouldBlock) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Attach a monitor receiving the event kinds in `mask`.
    ///
    /// Fails with `SocketClosed` on a closed socket. A monitor sees only
    /// events emitted after it was attached.
    pub fn monitor(&self, mask: impl Into<EventMask>) -> Result<Monitor> {
        self.core.monitor(mask.into())
    }

    /// Attach a monitor receiving every event kind.
    pub fn monitor_all(&self) -> Result<Monitor> {
        self.core.monitor(EventMask::ALL)
    }

    /// Close the socket.
    ///
    /// Emits a single `CLOSED` to every monitor, tells attached peers, and
    /// releases bound addresses. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        self.core.close();
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    pub fn options(&self) -> SocketOptions {
        self.core.options()
    }

    /// Replace the socket's options. Pipes already attached keep their
    /// high-water marks.
    pub fn set_options(&self, options: SocketOptions) -> Result<()> {
        self.core.set_options(options)
    }

    /// Address of the most recent successful `bind` or `connect`.
    pub fn last_endpoint(&self) -> Option<Endpoint> {
        self.core.last_endpoint()
    }

    /// Current state of every bound and connected address, sorted by address.
    pub fn connection_states(&self) -> Vec<Attachment> {
        self.core.connection_states()
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        self.core.close();
    }
}
