use crate::net::channel::Channel;
use crate::net::datagram::Datagram;
use crate::net::support::{
    ClientId, ErrorUtils, NetworkError, NetworkResult, TransportEvent,
};
use flare::logging;
use hashbrown::HashMap;
use indexmap::IndexSet;
use mio::{Events, Interest, Poll, Token};
use mio::net::TcpListener;
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Endpoint construction parameters.
pub struct EndpointConfig {
    pub tcp_addr: String,
    pub udp_addr: String,
    pub max_peers: usize,
}

impl Default for EndpointConfig {
    fn default() -> EndpointConfig {
        EndpointConfig {
            tcp_addr: "127.0.0.1:4242".to_string(),
            udp_addr: "127.0.0.1:4243".to_string(),
            max_peers: 32,
        }
    }
}

/// Handles all connection management and network transmission on the server
/// side: one listening socket, up to `max_peers` reliable channels and the
/// shared datagram socket. Peers are assigned monotonically increasing client
/// ids on accept; a watchdog disconnects peers with no inbound traffic for
/// 30 seconds.
pub struct Endpoint {
    listener: TcpListener,
    datagram: Datagram,

    poll: Poll,
    events: Events,

    channels: Vec<Channel>,
    free: Vec<usize>,
    live: IndexSet<usize>,
    slots: HashMap<ClientId, usize>,

    next_client: ClientId,
    max_peers: usize,

    pending: Vec<TransportEvent>,

    housekeeping_time: Instant,

    log: logging::Logger,
}

const LISTENER_TOKEN: Token = Token(usize::max_value());
const DATAGRAM_TOKEN: Token = Token(usize::max_value() - 1);

impl Endpoint {
    const INGRESS_TIMEOUT: Duration = Duration::from_secs(30);
    const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(3);

    /// Bind the endpoint sockets. Failures here abort startup.
    pub fn bind<'a, L: Into<Option<&'a logging::Logger>>>(
        config: &EndpointConfig,
        log: L,
    ) -> NetworkResult<Endpoint> {
        let endpoint_log = match log.into() {
            Some(log) => log.new(logging::o!()),
            _ => logging::Logger::root(logging::Discard, logging::o!()),
        };

        let poll = Poll::new()?;
        let mut listener = TcpListener::bind(config.tcp_addr.parse::<SocketAddr>()?)?;
        let mut datagram = Datagram::bind(&config.udp_addr, &endpoint_log)?;

        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;
        datagram.register(poll.registry(), DATAGRAM_TOKEN)?;

        logging::info!(endpoint_log, "endpoint bound";
                       "context" => "bind",
                       "tcp" => %config.tcp_addr,
                       "udp" => %config.udp_addr,
                       "max_peers" => config.max_peers);

        Ok(Endpoint {
            listener,
            datagram,
            poll,
            events: Events::with_capacity(1024),
            channels: Vec::new(),
            free: Vec::new(),
            live: IndexSet::new(),
            slots: HashMap::new(),
            next_client: 1,
            max_peers: config.max_peers,
            pending: Vec::new(),
            housekeeping_time: Instant::now(),
            log: endpoint_log,
        })
    }

    /// Run one I/O pass: flush egress, poll for readiness, accept, read and
    /// write, then run housekeeping. Accumulated events are retrieved with
    /// `drain_events`.
    pub fn sync(&mut self, now: Instant, timeout: Option<Duration>) {
        if now.duration_since(self.housekeeping_time) >= Self::HOUSEKEEPING_INTERVAL {
            self.housekeeping(now);
            self.housekeeping_time = now;
        }

        // Force send buffered data on all live channels.
        let mut failed = Vec::new();
        for &slot in self.live.iter() {
            if self.channels[slot].flush(now).has_failed() {
                failed.push(slot);
            }
        }
        for slot in failed {
            self.close_slot(slot);
        }

        if let Err(err) = self.poll.poll(&mut self.events, timeout) {
            if err.kind() == io::ErrorKind::Interrupted {
                return;
            }
            panic!("Poll failed: {:?}", err);
        }

        let mut accept_pending = false;
        let mut datagram_pending = false;
        let mut ready: Vec<(usize, bool, bool)> = Vec::new();

        for event in self.events.iter() {
            match event.token() {
                LISTENER_TOKEN => accept_pending = true,
                DATAGRAM_TOKEN => datagram_pending = true,
                Token(slot) => ready.push((slot, event.is_readable(), event.is_writable())),
            }
        }

        if accept_pending {
            self.accept_all(now);
        }

        if datagram_pending {
            self.drain_datagrams();
        }

        for (slot, readable, writable) in ready {
            self.service_channel(slot, readable, writable, now);
        }
    }

    /// Drains all the events accumulated since the last call.
    #[inline]
    pub fn drain_events(&mut self) -> Vec<TransportEvent> {
        std::mem::replace(&mut self.pending, Vec::new())
    }

    /// Queue a packet on a peer's reliable channel. A full write buffer means
    /// the peer stopped draining; the channel is closed so the delivery
    /// guarantee degrades to disconnect, never to silent loss.
    pub fn push_reliable(&mut self, client: ClientId, payload: &[u8]) {
        let slot = match self.slots.get(&client) {
            Some(slot) => *slot,
            None => {
                logging::debug!(self.log, "send on unknown peer dropped";
                                "context" => "push_reliable",
                                "client_id" => client);
                return;
            }
        };

        if self.channels[slot].push(payload).is_err() {
            logging::warn!(self.log, "reliable send failed, closing peer";
                           "context" => "push_reliable",
                           "client_id" => client);
            self.close_slot(slot);
        }
    }

    /// Fire a datagram at an associated peer. Unassociated or failed sends
    /// are dropped; the unreliable channel never retries.
    pub fn push_unreliable(&mut self, client: ClientId, payload: &[u8]) {
        if let Err(err) = self.datagram.send(client, payload) {
            logging::trace!(self.log, "unreliable send dropped";
                            "context" => "push_unreliable",
                            "client_id" => client,
                            "error" => ?err);
        }
    }

    pub fn broadcast_reliable(&mut self, payload: &[u8], except: Option<ClientId>) {
        let clients: Vec<ClientId> = self
            .live
            .iter()
            .filter_map(|&slot| self.channels[slot].client_id())
            .filter(|&client| Some(client) != except)
            .collect();

        for client in clients {
            self.push_reliable(client, payload);
        }
    }

    pub fn broadcast_unreliable(&mut self, payload: &[u8], except: Option<ClientId>) {
        for client in self.datagram.associated_clients() {
            if Some(client) != except {
                self.push_unreliable(client, payload);
            }
        }
    }

    pub fn associate_udp(&mut self, client: ClientId, addr: SocketAddr) {
        if self.slots.contains_key(&client) {
            self.datagram.associate(client, addr);
        }
    }

    /// Server initiated disconnect; flushes nothing, surfaces the usual
    /// `Disconnected` event so cleanup runs through one path.
    pub fn disconnect(&mut self, client: ClientId) {
        if let Some(slot) = self.slots.get(&client).copied() {
            self.close_slot(slot);
        }
    }

    pub fn peer_count(&self) -> usize {
        self.live.len()
    }

    pub fn shutdown(&mut self) {
        let slots: Vec<usize> = self.live.iter().copied().collect();
        for slot in slots {
            self.close_slot(slot);
        }
    }

    fn accept_all(&mut self, now: Instant) {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    if self.live.len() >= self.max_peers {
                        logging::warn!(self.log, "peer limit reached, refusing connection";
                                       "context" => "accept",
                                       "addr" => %addr,
                                       "max_peers" => self.max_peers);
                        drop(stream);
                        continue;
                    }

                    let slot = match self.free.pop() {
                        Some(slot) => slot,
                        None => {
                            self.channels.push(Channel::new(&self.log));
                            self.channels.len() - 1
                        }
                    };

                    let client = self.next_client;
                    self.next_client += 1;

                    self.channels[slot].open(client, stream, now);

                    if self.channels[slot]
                        .register(self.poll.registry(), Token(slot))
                        .has_failed()
                    {
                        self.channels[slot].close();
                        self.free.push(slot);
                        continue;
                    }

                    self.live.insert(slot);
                    self.slots.insert(client, slot);
                    self.pending.push(TransportEvent::Connected(client));

                    logging::info!(self.log, "peer connected";
                                   "context" => "accept",
                                   "client_id" => client,
                                   "addr" => %addr);
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    logging::error!(self.log, "accept failed";
                                    "context" => "accept",
                                    "error" => ?err);
                    break;
                }
            }
        }
    }

    fn drain_datagrams(&mut self) {
        loop {
            match self.datagram.recv() {
                Ok((source, payload)) => {
                    self.pending.push(TransportEvent::Unreliable(source, payload));
                }
                Err(NetworkError::Wait) => break,
                Err(err) => {
                    logging::debug!(self.log, "datagram receive error";
                                    "context" => "drain_datagrams",
                                    "error" => ?err);
                    break;
                }
            }
        }
    }

    fn service_channel(&mut self, slot: usize, readable: bool, writable: bool, now: Instant) {
        if !self.live.contains(&slot) {
            return;
        }

        let client = match self.channels[slot].client_id() {
            Some(client) => client,
            None => return,
        };

        if readable {
            if self.channels[slot].receive(now).has_failed() {
                self.close_slot(slot);
                return;
            }

            loop {
                match self.channels[slot].pull() {
                    Ok(payload) => self.pending.push(TransportEvent::Reliable(client, payload)),
                    Err(NetworkError::Wait) => break,
                    Err(_) => {
                        self.close_slot(slot);
                        return;
                    }
                }
            }
        }

        if writable && self.channels[slot].flush(now).has_failed() {
            self.close_slot(slot);
        }
    }

    fn housekeeping(&mut self, now: Instant) {
        let stale: Vec<usize> = self
            .live
            .iter()
            .copied()
            .filter(|&slot| {
                self.channels[slot].last_ingress_elapsed(now) >= Self::INGRESS_TIMEOUT
            })
            .collect();

        for slot in stale {
            logging::info!(self.log, "peer timed out";
                           "context" => "housekeeping",
                           "client_id" => self.channels[slot].client_id());
            self.close_slot(slot);
        }
    }

    fn close_slot(&mut self, slot: usize) {
        if !self.live.swap_remove(&slot) {
            return;
        }

        let client = self.channels[slot].client_id();

        drop(self.channels[slot].deregister(self.poll.registry()));
        self.channels[slot].close();
        self.free.push(slot);

        if let Some(client) = client {
            self.slots.remove(&client);
            self.datagram.dissociate(client);
            self.pending.push(TransportEvent::Disconnected(client));
        }
    }
}
