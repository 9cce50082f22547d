use crate::net::endpoint::{Endpoint, EndpointConfig};
use crate::net::support::{ClientId, NetworkResult, TransportEvent};
use crate::net::Transport;
use flare::logging;
use hashbrown::HashMap;
use std::net::SocketAddr;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

const POLL_TIMEOUT: Duration = Duration::from_millis(5);

enum Command {
    SendReliable(ClientId, Vec<u8>),
    SendUnreliable(ClientId, Vec<u8>),
    BroadcastReliable(Vec<u8>, Option<ClientId>),
    BroadcastUnreliable(Vec<u8>, Option<ClientId>),
    Associate(ClientId, SocketAddr),
    Disconnect(ClientId),
    Shutdown,
}

/// The default server transport backend. Socket polling runs on a dedicated
/// I/O thread owned by this object; the tick thread exchanges commands and
/// events with it over queues, so no connection state is shared across
/// threads.
pub struct ServerTransport {
    commands: mpsc::Sender<Command>,
    events: mpsc::Receiver<TransportEvent>,
    rtt: HashMap<ClientId, u32>,
    worker: Option<thread::JoinHandle<()>>,
    log: logging::Logger,
}

impl ServerTransport {
    /// Bind the endpoint and start the I/O thread. Bind failures surface
    /// synchronously so startup can abort.
    pub fn start<'a, L: Into<Option<&'a logging::Logger>>>(
        config: EndpointConfig,
        log: L,
    ) -> NetworkResult<ServerTransport> {
        let transport_log = match log.into() {
            Some(log) => log.new(logging::o!()),
            _ => logging::Logger::root(logging::Discard, logging::o!()),
        };

        let mut endpoint = Endpoint::bind(&config, &transport_log)?;

        let (command_tx, command_rx) = mpsc::channel::<Command>();
        let (event_tx, event_rx) = mpsc::channel::<TransportEvent>();

        let worker = thread::Builder::new()
            .name("net-io".to_string())
            .spawn(move || loop {
                loop {
                    match command_rx.try_recv() {
                        Ok(Command::SendReliable(client, bytes)) => {
                            endpoint.push_reliable(client, &bytes)
                        }
                        Ok(Command::SendUnreliable(client, bytes)) => {
                            endpoint.push_unreliable(client, &bytes)
                        }
                        Ok(Command::BroadcastReliable(bytes, except)) => {
                            endpoint.broadcast_reliable(&bytes, except)
                        }
                        Ok(Command::BroadcastUnreliable(bytes, except)) => {
                            endpoint.broadcast_unreliable(&bytes, except)
                        }
                        Ok(Command::Associate(client, addr)) => {
                            endpoint.associate_udp(client, addr)
                        }
                        Ok(Command::Disconnect(client)) => endpoint.disconnect(client),
                        Ok(Command::Shutdown) | Err(mpsc::TryRecvError::Disconnected) => {
                            endpoint.shutdown();
                            return;
                        }
                        Err(mpsc::TryRecvError::Empty) => break,
                    }
                }

                endpoint.sync(Instant::now(), Some(POLL_TIMEOUT));

                for event in endpoint.drain_events() {
                    if event_tx.send(event).is_err() {
                        endpoint.shutdown();
                        return;
                    }
                }
            })
            .expect("Failed to spawn the network I/O thread");

        Ok(ServerTransport {
            commands: command_tx,
            events: event_rx,
            rtt: HashMap::new(),
            worker: Some(worker),
            log: transport_log,
        })
    }

    fn command(&self, command: Command) {
        if self.commands.send(command).is_err() {
            logging::error!(self.log, "network I/O thread is gone"; "context" => "command");
        }
    }
}

impl Transport for ServerTransport {
    fn poll(&mut self) -> Vec<TransportEvent> {
        let events: Vec<TransportEvent> = self.events.try_iter().collect();

        for event in events.iter() {
            if let TransportEvent::Disconnected(client) = event {
                self.rtt.remove(client);
            }
        }

        events
    }

    fn send_reliable(&mut self, peer: ClientId, bytes: Vec<u8>) {
        self.command(Command::SendReliable(peer, bytes));
    }

    fn send_unreliable(&mut self, peer: ClientId, bytes: Vec<u8>) {
        self.command(Command::SendUnreliable(peer, bytes));
    }

    fn broadcast_reliable(&mut self, bytes: Vec<u8>, except: Option<ClientId>) {
        self.command(Command::BroadcastReliable(bytes, except));
    }

    fn broadcast_unreliable(&mut self, bytes: Vec<u8>, except: Option<ClientId>) {
        self.command(Command::BroadcastUnreliable(bytes, except));
    }

    fn associate_udp(&mut self, peer: ClientId, addr: SocketAddr) {
        self.command(Command::Associate(peer, addr));
    }

    fn disconnect_peer(&mut self, peer: ClientId) {
        self.command(Command::Disconnect(peer));
    }

    fn note_rtt(&mut self, peer: ClientId, rtt_ms: u32) {
        self.rtt.insert(peer, rtt_ms);
    }

    fn rtt(&self, peer: ClientId) -> Option<u32> {
        self.rtt.get(&peer).copied()
    }

    fn shutdown(&mut self) {
        self.command(Command::Shutdown);

        if let Some(worker) = self.worker.take() {
            drop(worker.join());
        }
    }
}

impl Drop for ServerTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}
