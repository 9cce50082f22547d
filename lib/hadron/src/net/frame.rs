use crate::net::buffer::Buffer;
use crate::net::support::{ErrorType, NetworkError, NetworkResult};
use byteorder::{BigEndian, ByteOrder};

/// Stream-level frame header: a two byte big-endian length prefix. Every
/// frame carries exactly one protocol packet; the packet's own header is
/// opaque at this layer.
pub const HEADER_SIZE: usize = 2;

/// Upper bound on a single framed payload. Generously above the largest
/// packet in the catalogue.
pub const MAX_PAYLOAD: usize = 8192;

/// Append one framed payload to the write buffer. Fails with `Wait` when the
/// buffer lacks capacity for the whole frame.
pub fn write(buffer: &mut Buffer, payload: &[u8]) -> NetworkResult<()> {
    if payload.is_empty() {
        return Err(NetworkError::Fatal(ErrorType::EmptyPayload));
    }

    if payload.len() > MAX_PAYLOAD {
        return Err(NetworkError::Fatal(ErrorType::PayloadTooLarge));
    }

    if buffer.free_capacity() < HEADER_SIZE + payload.len() {
        return Err(NetworkError::Wait);
    }

    let mut header = [0u8; HEADER_SIZE];
    BigEndian::write_u16(&mut header, payload.len() as u16);

    buffer
        .extend(&header)
        .and_then(|_| buffer.extend(payload))
        .expect("capacity was checked upfront");

    Ok(())
}

/// Extract one framed payload from the read buffer. Returns `Wait` until a
/// whole frame is buffered; a malformed length is fatal.
pub fn read(buffer: &mut Buffer) -> NetworkResult<Vec<u8>> {
    let stream = buffer.read_slice();

    if stream.len() < HEADER_SIZE {
        return Err(NetworkError::Wait);
    }

    let length = BigEndian::read_u16(stream) as usize;

    if length == 0 {
        return Err(NetworkError::Fatal(ErrorType::EmptyPayload));
    }

    if length > MAX_PAYLOAD {
        return Err(NetworkError::Fatal(ErrorType::PayloadTooLarge));
    }

    if stream.len() < HEADER_SIZE + length {
        return Err(NetworkError::Wait);
    }

    let payload = stream[HEADER_SIZE..HEADER_SIZE + length].to_vec();
    buffer.consume(HEADER_SIZE + length);

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_roundtrip() {
        let mut buffer = Buffer::new(1024);

        write(&mut buffer, &[1, 2, 3]).unwrap();
        write(&mut buffer, &[4, 5]).unwrap();

        assert_eq!(read(&mut buffer).unwrap(), vec![1, 2, 3]);
        assert_eq!(read(&mut buffer).unwrap(), vec![4, 5]);
        assert_eq!(read(&mut buffer).unwrap_err(), NetworkError::Wait);
    }

    #[test]
    fn test_read_partial_header_waits() {
        let mut buffer = Buffer::new(1024);
        buffer.extend(&[0]).unwrap();

        assert_eq!(read(&mut buffer).unwrap_err(), NetworkError::Wait);
    }

    #[test]
    fn test_read_partial_payload_waits() {
        let mut buffer = Buffer::new(1024);
        buffer.extend(&[0, 4, 9, 9]).unwrap();

        assert_eq!(read(&mut buffer).unwrap_err(), NetworkError::Wait);
        // The partial frame stays buffered for the next attempt.
        assert_eq!(buffer.len(), 4);
    }

    #[test]
    fn test_read_zero_length_is_fatal() {
        let mut buffer = Buffer::new(1024);
        buffer.extend(&[0, 0]).unwrap();

        assert_eq!(
            read(&mut buffer).unwrap_err(),
            NetworkError::Fatal(ErrorType::EmptyPayload)
        );
    }

    #[test]
    fn test_write_empty_is_fatal() {
        let mut buffer = Buffer::new(1024);

        assert_eq!(
            write(&mut buffer, &[]).unwrap_err(),
            NetworkError::Fatal(ErrorType::EmptyPayload)
        );
    }

    #[test]
    fn test_write_oversized_is_fatal() {
        let mut buffer = Buffer::new(MAX_PAYLOAD * 2 + 16);
        let oversized = vec![0u8; MAX_PAYLOAD + 1];

        assert_eq!(
            write(&mut buffer, &oversized).unwrap_err(),
            NetworkError::Fatal(ErrorType::PayloadTooLarge)
        );
    }

    #[test]
    fn test_write_full_buffer_waits() {
        let mut buffer = Buffer::new(8);
        write(&mut buffer, &[1, 2, 3, 4, 5, 6]).unwrap();

        assert_eq!(write(&mut buffer, &[7]).unwrap_err(), NetworkError::Wait);
    }
}
