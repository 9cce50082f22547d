use crate::net::support::{ClientId, ErrorType, NetworkError, NetworkResult, UdpSource};
use flare::logging;
use hashbrown::HashMap;
use mio::net::UdpSocket;
use std::net::SocketAddr;

/// Largest datagram accepted or produced. Inputs and snapshots fit with
/// plenty of headroom.
pub const MAX_DATAGRAM: usize = 2048;

/// The unreliable, unordered half of the transport. One socket serves every
/// peer; the address of each datagram is mapped onto the reliable identity
/// through the association table populated by the handshake.
pub struct Datagram {
    socket: UdpSocket,
    by_addr: HashMap<SocketAddr, ClientId>,
    by_client: HashMap<ClientId, SocketAddr>,
    scratch: [u8; MAX_DATAGRAM],
    log: logging::Logger,
}

impl Datagram {
    pub fn bind<'a, L: Into<Option<&'a logging::Logger>>>(
        addr: &str,
        log: L,
    ) -> NetworkResult<Datagram> {
        let datagram_log = match log.into() {
            Some(log) => log.new(logging::o!()),
            _ => logging::Logger::root(logging::Discard, logging::o!()),
        };

        let socket = UdpSocket::bind(addr.parse::<SocketAddr>()?)?;

        logging::debug!(datagram_log, "datagram socket bound"; "context" => "bind", "addr" => addr);

        Ok(Datagram {
            socket,
            by_addr: HashMap::new(),
            by_client: HashMap::new(),
            scratch: [0; MAX_DATAGRAM],
            log: datagram_log,
        })
    }

    pub fn register(&mut self, registry: &mio::Registry, token: mio::Token) -> NetworkResult<()> {
        registry
            .register(&mut self.socket, token, mio::Interest::READABLE)
            .map_err(Into::into)
    }

    /// Bind an unreliable address to a reliable peer identity. A peer
    /// re-associating from a new address replaces the old binding.
    pub fn associate(&mut self, client: ClientId, addr: SocketAddr) {
        if let Some(old_addr) = self.by_client.insert(client, addr) {
            self.by_addr.remove(&old_addr);
        }

        self.by_addr.insert(addr, client);

        logging::debug!(self.log, "udp address associated";
                        "context" => "associate",
                        "client_id" => client,
                        "addr" => %addr);
    }

    pub fn dissociate(&mut self, client: ClientId) {
        if let Some(addr) = self.by_client.remove(&client) {
            self.by_addr.remove(&addr);
        }
    }

    #[inline]
    pub fn is_associated(&self, client: ClientId) -> bool {
        self.by_client.contains_key(&client)
    }

    /// Receive one pending datagram. Returns `Wait` once the socket is
    /// drained; call until then.
    pub fn recv(&mut self) -> NetworkResult<(UdpSource, Vec<u8>)> {
        let (count, addr) = self.socket.recv_from(&mut self.scratch)?;

        let source = UdpSource {
            client: self.by_addr.get(&addr).copied(),
            addr,
        };

        Ok((source, self.scratch[..count].to_vec()))
    }

    /// Fire one datagram at an associated peer. Unassociated peers are
    /// refused; the payload is never retried.
    pub fn send(&mut self, client: ClientId, payload: &[u8]) -> NetworkResult<()> {
        if payload.len() > MAX_DATAGRAM {
            return Err(NetworkError::Fatal(ErrorType::PayloadTooLarge));
        }

        let addr = match self.by_client.get(&client) {
            Some(addr) => *addr,
            None => return Err(NetworkError::Fatal(ErrorType::NotAssociated)),
        };

        self.socket.send_to(payload, addr)?;

        Ok(())
    }

    /// Every associated peer, for unreliable broadcast.
    pub fn associated_clients(&self) -> Vec<ClientId> {
        self.by_client.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn datagram() -> Datagram {
        Datagram::bind("127.0.0.1:0", None).expect("bind on an ephemeral port")
    }

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    #[test]
    fn test_send_unassociated_refused() {
        let mut datagram = datagram();

        assert_eq!(
            datagram.send(7, &[1, 2, 3]).unwrap_err(),
            NetworkError::Fatal(ErrorType::NotAssociated)
        );
    }

    #[test]
    fn test_associate_dissociate() {
        let mut datagram = datagram();

        datagram.associate(7, addr(4000));
        assert!(datagram.is_associated(7));
        assert_eq!(datagram.associated_clients(), vec![7]);

        datagram.dissociate(7);
        assert!(!datagram.is_associated(7));
        assert!(datagram.associated_clients().is_empty());
    }

    #[test]
    fn test_reassociation_replaces_address() {
        let mut datagram = datagram();

        datagram.associate(7, addr(4000));
        datagram.associate(7, addr(4001));

        assert_eq!(datagram.by_addr.len(), 1);
        assert_eq!(datagram.by_client[&7], addr(4001));
    }

    #[test]
    fn test_oversized_send_refused() {
        let mut datagram = datagram();
        datagram.associate(1, addr(4000));

        let oversized = vec![0u8; MAX_DATAGRAM + 1];

        assert_eq!(
            datagram.send(1, &oversized).unwrap_err(),
            NetworkError::Fatal(ErrorType::PayloadTooLarge)
        );
    }
}
