use crate::net::channel::Channel;
use crate::net::support::{ErrorUtils, NetworkError, NetworkResult};
use flare::logging;
use mio::net::{TcpStream, UdpSocket};
use mio::{Events, Interest, Poll, Token};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

const POLL_TIMEOUT: Duration = Duration::from_millis(5);
const TCP_TOKEN: Token = Token(0);
const UDP_TOKEN: Token = Token(1);
const MAX_DATAGRAM: usize = 2048;

/// Traffic and connectivity events surfaced to the client core.
#[derive(Debug, Eq, PartialEq)]
pub enum ClientTransportEvent {
    Reliable(Vec<u8>),
    Unreliable(Vec<u8>),
    Disconnected,
}

enum Command {
    SendReliable(Vec<u8>),
    SendUnreliable(Vec<u8>),
    Shutdown,
}

/// Client half of the hybrid transport: one reliable channel to the server
/// plus a connected datagram socket. Socket polling runs on a background
/// thread, mirroring the server transport.
pub struct ClientTransport {
    commands: mpsc::Sender<Command>,
    events: mpsc::Receiver<ClientTransportEvent>,
    worker: Option<thread::JoinHandle<()>>,
    log: logging::Logger,
}

impl ClientTransport {
    /// Connect to the server. Connection refusal fails the call synchronously.
    pub fn connect<'a, L: Into<Option<&'a logging::Logger>>>(
        host: &str,
        tcp_port: u16,
        udp_port: u16,
        log: L,
    ) -> NetworkResult<ClientTransport> {
        let transport_log = match log.into() {
            Some(log) => log.new(logging::o!()),
            _ => logging::Logger::root(logging::Discard, logging::o!()),
        };

        let tcp_addr = resolve(host, tcp_port)?;
        let udp_addr = resolve(host, udp_port)?;

        let std_stream = std::net::TcpStream::connect(tcp_addr)?;
        std_stream.set_nonblocking(true)?;
        std_stream.set_nodelay(true)?;
        let stream = TcpStream::from_std(std_stream);

        let std_socket = std::net::UdpSocket::bind("0.0.0.0:0")?;
        std_socket.connect(udp_addr)?;
        std_socket.set_nonblocking(true)?;
        let socket = UdpSocket::from_std(std_socket);

        logging::info!(transport_log, "connected to server";
                       "context" => "connect",
                       "tcp" => %tcp_addr,
                       "udp" => %udp_addr);

        let (command_tx, command_rx) = mpsc::channel::<Command>();
        let (event_tx, event_rx) = mpsc::channel::<ClientTransportEvent>();

        let worker_log = transport_log.new(logging::o!());
        let worker = thread::Builder::new()
            .name("net-io-client".to_string())
            .spawn(move || run_worker(stream, socket, command_rx, event_tx, worker_log))
            .expect("Failed to spawn the network I/O thread");

        Ok(ClientTransport {
            commands: command_tx,
            events: event_rx,
            worker: Some(worker),
            log: transport_log,
        })
    }

    /// Drain everything received since the last poll. Never blocks.
    pub fn poll(&mut self) -> Vec<ClientTransportEvent> {
        self.events.try_iter().collect()
    }

    pub fn send_reliable(&self, bytes: Vec<u8>) {
        self.command(Command::SendReliable(bytes));
    }

    pub fn send_unreliable(&self, bytes: Vec<u8>) {
        self.command(Command::SendUnreliable(bytes));
    }

    pub fn shutdown(&mut self) {
        self.command(Command::Shutdown);

        if let Some(worker) = self.worker.take() {
            drop(worker.join());
        }
    }

    fn command(&self, command: Command) {
        if self.commands.send(command).is_err() {
            logging::debug!(self.log, "network I/O thread is gone"; "context" => "command");
        }
    }
}

impl Drop for ClientTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn resolve(host: &str, port: u16) -> NetworkResult<SocketAddr> {
    (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "host resolved to nothing").into())
}

fn run_worker(
    mut stream: TcpStream,
    mut socket: UdpSocket,
    commands: mpsc::Receiver<Command>,
    events: mpsc::Sender<ClientTransportEvent>,
    log: logging::Logger,
) {
    let mut poll = match Poll::new() {
        Ok(poll) => poll,
        Err(err) => {
            logging::error!(log, "poll creation failed"; "error" => ?err);
            drop(events.send(ClientTransportEvent::Disconnected));
            return;
        }
    };

    let registered = poll
        .registry()
        .register(
            &mut stream,
            TCP_TOKEN,
            Interest::READABLE | Interest::WRITABLE,
        )
        .and_then(|_| {
            poll.registry()
                .register(&mut socket, UDP_TOKEN, Interest::READABLE)
        });

    if registered.is_err() {
        drop(events.send(ClientTransportEvent::Disconnected));
        return;
    }

    let mut channel = Channel::new(&log);
    channel.open(0, stream, Instant::now());

    let mut poll_events = Events::with_capacity(256);
    let mut scratch = [0u8; MAX_DATAGRAM];

    loop {
        loop {
            match commands.try_recv() {
                Ok(Command::SendReliable(bytes)) => {
                    if channel.push(&bytes).has_failed() {
                        drop(events.send(ClientTransportEvent::Disconnected));
                        channel.close();
                        return;
                    }
                }
                Ok(Command::SendUnreliable(bytes)) => {
                    // Fire and forget; errors are dropped by design.
                    drop(socket.send(&bytes));
                }
                Ok(Command::Shutdown) | Err(mpsc::TryRecvError::Disconnected) => {
                    channel.close();
                    return;
                }
                Err(mpsc::TryRecvError::Empty) => break,
            }
        }

        let now = Instant::now();

        if channel.flush(now).has_failed() {
            drop(events.send(ClientTransportEvent::Disconnected));
            channel.close();
            return;
        }

        if let Err(err) = poll.poll(&mut poll_events, Some(POLL_TIMEOUT)) {
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            drop(events.send(ClientTransportEvent::Disconnected));
            channel.close();
            return;
        }

        let mut tcp_readable = false;
        let mut udp_readable = false;

        for event in poll_events.iter() {
            match event.token() {
                TCP_TOKEN if event.is_readable() => tcp_readable = true,
                UDP_TOKEN => udp_readable = true,
                _ => (),
            }
        }

        if tcp_readable {
            if channel.receive(now).has_failed() {
                drop(events.send(ClientTransportEvent::Disconnected));
                channel.close();
                return;
            }

            loop {
                match channel.pull() {
                    Ok(payload) => {
                        if events.send(ClientTransportEvent::Reliable(payload)).is_err() {
                            channel.close();
                            return;
                        }
                    }
                    Err(NetworkError::Wait) => break,
                    Err(_) => {
                        drop(events.send(ClientTransportEvent::Disconnected));
                        channel.close();
                        return;
                    }
                }
            }
        }

        if udp_readable {
            loop {
                match socket.recv(&mut scratch) {
                    Ok(count) => {
                        let payload = scratch[..count].to_vec();
                        if events.send(ClientTransportEvent::Unreliable(payload)).is_err() {
                            channel.close();
                            return;
                        }
                    }
                    Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => break,
                    Err(_) => break,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_refused_fails_synchronously() {
        // Nothing listens on this port.
        let result = ClientTransport::connect("127.0.0.1", 1, 4243, None);

        assert!(result.is_err());
    }
}
