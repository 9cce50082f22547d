use crate::net::buffer::Buffer;
use crate::net::frame;
use crate::net::support::{ClientId, ErrorType, NetworkError, NetworkResult};
use flare::logging;
use mio::net::TcpStream;
use std::io;
use std::net::Shutdown;
use std::time::{Duration, Instant};

const WRITE_BUF_SIZE: usize = 8 * 65536;
const READ_BUF_SIZE: usize = 65536;

/// Represents the reliable ordered communication channel with a single peer.
/// Framing is a length prefix per packet; ordering and retransmission come
/// from the underlying stream.
pub struct Channel {
    client_id: Option<ClientId>,
    stream: Option<TcpStream>,

    // Communication timestamps
    last_egress: Instant,
    last_ingress: Instant,

    read_buffer: Buffer,
    write_buffer: Buffer,

    log: logging::Logger,
}

impl Channel {
    #[inline]
    pub fn new<'a, L: Into<Option<&'a logging::Logger>>>(log: L) -> Channel {
        let now = Instant::now();

        let channel_log = match log.into() {
            Some(log) => log.new(logging::o!()),
            _ => logging::Logger::root(logging::Discard, logging::o!()),
        };

        Channel {
            client_id: None,
            stream: None,
            last_egress: now,
            last_ingress: now,
            read_buffer: Buffer::new(READ_BUF_SIZE),
            write_buffer: Buffer::new(WRITE_BUF_SIZE),
            log: channel_log,
        }
    }

    /// Opens the channel using a new underlying stream. The channel must be
    /// closed for this operation to succeed.
    pub fn open(&mut self, client_id: ClientId, stream: TcpStream, now: Instant) {
        if self.stream.is_some() {
            panic!("Attempted to open an already open channel");
        }

        self.client_id = Some(client_id);
        self.stream = Some(stream);
        self.last_ingress = now;
        self.last_egress = now;

        logging::debug!(self.log, "channel opened";
                        "context" => "open",
                        "client_id" => client_id);
    }

    /// Closes the channel and the underlying stream, dropping any buffered
    /// data in both directions.
    pub fn close(&mut self) {
        logging::debug!(self.log, "closing channel";
                        "context" => "close",
                        "client_id" => self.client_id,
                        "read_size" => self.read_buffer.len(),
                        "write_size" => self.write_buffer.len());

        self.read_buffer.clear();
        self.write_buffer.clear();
        self.client_id = None;

        if let Some(stream) = self.stream.take() {
            // The peer may already be gone; a failed shutdown changes nothing.
            drop(stream.shutdown(Shutdown::Both));
        }
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    #[inline]
    pub fn client_id(&self) -> Option<ClientId> {
        self.client_id
    }

    /// Returns true if there is outgoing data pending on the channel.
    #[inline]
    pub fn has_egress(&self) -> bool {
        !self.write_buffer.is_empty()
    }

    /// Time elapsed since bytes last arrived from the peer.
    #[inline]
    pub fn last_ingress_elapsed(&self, now: Instant) -> Duration {
        now.duration_since(self.last_ingress)
    }

    /// Registers the channel's stream on the supplied registry.
    pub fn register(&mut self, registry: &mio::Registry, token: mio::Token) -> NetworkResult<()> {
        let stream = self.stream.as_mut().expect("Can't register a closed channel");

        registry
            .register(
                stream,
                token,
                mio::Interest::READABLE | mio::Interest::WRITABLE,
            )
            .map_err(Into::into)
    }

    pub fn deregister(&mut self, registry: &mio::Registry) -> NetworkResult<()> {
        let stream = self.stream.as_mut().expect("Can't deregister a closed channel");

        registry.deregister(stream).map_err(Into::into)
    }

    /// Read all available data off the network, updating the ingress
    /// timestamp when anything arrived.
    pub fn receive(&mut self, now: Instant) -> NetworkResult<usize> {
        let stream = self.stream.as_mut().ok_or(NetworkError::Fatal(ErrorType::Closed))?;

        let received = match self.read_buffer.ingress(stream) {
            Ok(count) => count,
            Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                // WouldBlock ends the read; whatever arrived first counts.
                self.last_ingress = now;
                return Ok(0);
            }
            Err(err) => return Err(err.into()),
        };

        if received > 0 {
            self.last_ingress = now;
        }

        Ok(received)
    }

    /// Send all buffered data to the network, updating the egress timestamp
    /// when anything was written.
    pub fn flush(&mut self, now: Instant) -> NetworkResult<usize> {
        if self.write_buffer.is_empty() {
            return Ok(0);
        }

        let stream = self.stream.as_mut().ok_or(NetworkError::Fatal(ErrorType::Closed))?;

        let sent = match self.write_buffer.egress(stream) {
            Ok(count) => count,
            Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                self.last_egress = now;
                return Ok(0);
            }
            Err(err) => return Err(err.into()),
        };

        if sent > 0 {
            self.last_egress = now;
        }

        Ok(sent)
    }

    /// Queue one packet for transmission.
    pub fn push(&mut self, payload: &[u8]) -> NetworkResult<()> {
        frame::write(&mut self.write_buffer, payload)
    }

    /// Extract the next buffered inbound packet. Returns `Wait` when no whole
    /// frame is available; call until then.
    pub fn pull(&mut self) -> NetworkResult<Vec<u8>> {
        frame::read(&mut self.read_buffer)
    }

    #[cfg(test)]
    pub(crate) fn buffers_mut(&mut self) -> (&mut Buffer, &mut Buffer) {
        (&mut self.read_buffer, &mut self.write_buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem;

    #[test]
    fn test_push_pull_roundtrip() {
        let mut channel = Channel::new(None);

        channel.push(&[10, 20, 30]).unwrap();
        channel.push(&[40]).unwrap();

        assert!(channel.has_egress());

        {
            let (read, write) = channel.buffers_mut();
            mem::swap(read, write);
        }

        assert_eq!(channel.pull().unwrap(), vec![10, 20, 30]);
        assert_eq!(channel.pull().unwrap(), vec![40]);
        assert_eq!(channel.pull().unwrap_err(), NetworkError::Wait);
    }

    #[test]
    fn test_push_empty_payload_fails() {
        let mut channel = Channel::new(None);

        assert_eq!(
            channel.push(&[]).unwrap_err(),
            NetworkError::Fatal(ErrorType::EmptyPayload)
        );
    }

    #[test]
    fn test_closed_channel_reports_closed() {
        let mut channel = Channel::new(None);

        assert!(!channel.is_open());
        assert_eq!(
            channel.receive(Instant::now()).unwrap_err(),
            NetworkError::Fatal(ErrorType::Closed)
        );
    }
}
