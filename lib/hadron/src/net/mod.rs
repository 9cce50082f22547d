//! The networking modules in `hadron` carry all traffic between clients and
//! the server: a reliable ordered channel per peer (TCP) and an unreliable
//! unordered datagram path (UDP) that is associated with the reliable
//! identity through an application-level handshake.

pub mod buffer;
pub mod channel;
pub mod client;
pub mod datagram;
pub mod endpoint;
pub mod frame;
pub mod support;
pub mod transport;

pub use self::support::{
    ClientId, ErrorType, ErrorUtils, NetworkError, NetworkResult, TransportEvent, UdpSource,
};

use std::net::SocketAddr;

/// Contract between the server dispatcher and a transport backend. The mio
/// implementation lives in [`transport::ServerTransport`]; tests and
/// alternative backends provide their own.
pub trait Transport {
    /// Drain every event observed since the previous poll. Never blocks.
    fn poll(&mut self) -> Vec<TransportEvent>;

    /// Queue bytes on the peer's reliable ordered channel. Delivery is
    /// guaranteed or the peer is disconnected.
    fn send_reliable(&mut self, peer: ClientId, bytes: Vec<u8>);

    /// Fire-and-forget datagram to an associated peer. Never retried.
    fn send_unreliable(&mut self, peer: ClientId, bytes: Vec<u8>);

    fn broadcast_reliable(&mut self, bytes: Vec<u8>, except: Option<ClientId>);

    fn broadcast_unreliable(&mut self, bytes: Vec<u8>, except: Option<ClientId>);

    /// Bind the unreliable identity `addr` to the reliable peer.
    fn associate_udp(&mut self, peer: ClientId, addr: SocketAddr);

    fn disconnect_peer(&mut self, peer: ClientId);

    /// Record a round-trip measurement made by the protocol layer.
    fn note_rtt(&mut self, peer: ClientId, rtt_ms: u32);

    /// Latest round-trip time in milliseconds, if one has been measured.
    fn rtt(&self, peer: ClientId) -> Option<u32>;

    fn shutdown(&mut self);
}
