use std::io;

/// A bounded FIFO byte queue. Data is appended at the tail and read from the
/// head; the head region is compacted away before new ingress so the readable
/// bytes always form one contiguous slice.
pub struct Buffer {
    data: Vec<u8>,
    head: usize,
    capacity: usize,
}

impl Buffer {
    #[inline]
    pub fn new(capacity: usize) -> Buffer {
        Buffer {
            data: Vec::with_capacity(capacity),
            head: 0,
            capacity,
        }
    }

    /// The number of readable bytes in the buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() - self.head
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining free capacity in the buffer.
    #[inline]
    pub fn free_capacity(&self) -> usize {
        self.capacity - self.len()
    }

    /// Slice containing the readable data.
    #[inline]
    pub fn read_slice(&self) -> &[u8] {
        &self.data[self.head..]
    }

    /// Advance the head past consumed bytes.
    #[inline]
    pub fn consume(&mut self, count: usize) {
        assert!(count <= self.len(), "consumed past the buffer tail");
        self.head += count;

        if self.head == self.data.len() {
            self.data.clear();
            self.head = 0;
        }
    }

    #[inline]
    pub fn clear(&mut self) {
        self.data.clear();
        self.head = 0;
    }

    /// Append bytes at the tail. Fails with `Wait` when the bytes don't fit.
    pub fn extend(&mut self, bytes: &[u8]) -> Result<(), ()> {
        if bytes.len() > self.free_capacity() {
            return Err(());
        }

        self.compact();
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// Write the contents of the buffer to the supplied writer, advancing the
    /// head past everything written.
    pub fn egress<W: io::Write>(&mut self, mut writer: W) -> io::Result<usize> {
        let mut total = 0;

        while !self.is_empty() {
            let count = writer.write(self.read_slice())?;

            if count == 0 {
                return Err(io::ErrorKind::WriteZero.into());
            }

            self.consume(count);
            total += count;
        }

        Ok(total)
    }

    /// Read data from the supplied reader into the buffer until it would
    /// block. A zero-length read means the peer closed the stream. Filling
    /// the buffer to capacity without blocking is treated as an overrun.
    pub fn ingress<R: io::Read>(&mut self, mut reader: R) -> io::Result<usize> {
        self.compact();

        let mut total = 0;

        while self.data.len() < self.capacity {
            let old_len = self.data.len();
            self.data.resize(self.capacity, 0);

            match reader.read(&mut self.data[old_len..]) {
                Ok(0) => {
                    self.data.truncate(old_len);
                    return Err(io::ErrorKind::UnexpectedEof.into());
                }
                Ok(count) => {
                    self.data.truncate(old_len + count);
                    total += count;
                }
                Err(err) => {
                    self.data.truncate(old_len);
                    return Err(err);
                }
            }
        }

        Err(io::Error::new(io::ErrorKind::Other, "Buffer overrun"))
    }

    fn compact(&mut self) {
        if self.head > 0 {
            self.data.drain(..self.head);
            self.head = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::min;

    const CAP: usize = 1024;

    struct MockChannel {
        data: Vec<u8>,
        cursor: usize,
        chunk: usize,
        max_size: usize,
    }

    impl MockChannel {
        fn new(data: Vec<u8>, chunk: usize, max_size: usize) -> MockChannel {
            MockChannel {
                data,
                cursor: 0,
                chunk,
                max_size,
            }
        }

        fn clear(&mut self) {
            self.data.clear();
            self.cursor = 0;
        }
    }

    impl io::Read for MockChannel {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.cursor == self.data.len() {
                return Err(io::ErrorKind::WouldBlock.into());
            }

            let offset = min(min(self.chunk, buf.len()), self.data.len() - self.cursor);
            buf[..offset].copy_from_slice(&self.data[self.cursor..(self.cursor + offset)]);
            self.cursor += offset;
            Ok(offset)
        }
    }

    impl io::Write for MockChannel {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.data.len() == self.max_size {
                return Err(io::ErrorKind::WouldBlock.into());
            }

            let count = min(self.chunk, buf.len());
            self.data.extend(&buf[..count]);

            Ok(count)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_roundtrip() {
        let mock_data: Vec<_> = (0..CAP / 2).map(|item| item as u8).collect();
        let mut channel = MockChannel::new(mock_data.clone(), 100, mock_data.len());

        let mut buffer = Buffer::new(CAP);

        let result = buffer.ingress(&mut channel);

        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::WouldBlock);
        assert_eq!(buffer.len(), mock_data.len());
        assert_eq!(buffer.read_slice(), &mock_data[..]);

        channel.clear();
        let count = buffer.egress(&mut channel).unwrap();

        assert_eq!(count, mock_data.len());
        assert!(buffer.is_empty());
        assert_eq!(channel.data[..], mock_data[..]);
    }

    #[test]
    fn test_ingress_eof_on_closed_stream() {
        let mut buffer = Buffer::new(CAP);

        let result = buffer.ingress(&[][..]);

        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_ingress_buffer_overrun() {
        let mock_data: Vec<_> = (0..CAP * 2).map(|item| item as u8).collect();
        let mut buffer = Buffer::new(CAP);

        let result = buffer.ingress(&mock_data[..]);

        let err = result.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Other);
        assert_eq!(err.to_string(), "Buffer overrun");
        assert_eq!(buffer.len(), CAP);
    }

    #[test]
    fn test_egress_error_on_zero_write() {
        let mut zero_sink = [0u8; 0];

        let mut buffer = Buffer::new(CAP);
        buffer.extend(&[1]).unwrap();

        let result = buffer.egress(&mut zero_sink[..]);

        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::WriteZero);
    }

    #[test]
    fn test_extend_respects_capacity() {
        let mut buffer = Buffer::new(4);

        assert!(buffer.extend(&[1, 2, 3]).is_ok());
        assert!(buffer.extend(&[4, 5]).is_err());
        assert_eq!(buffer.free_capacity(), 1);
    }

    #[test]
    fn test_consume_reclaims_space() {
        let mut buffer = Buffer::new(4);

        buffer.extend(&[1, 2, 3, 4]).unwrap();
        buffer.consume(2);

        assert_eq!(buffer.read_slice(), &[3, 4]);
        assert_eq!(buffer.free_capacity(), 2);

        buffer.extend(&[5, 6]).unwrap();
        assert_eq!(buffer.read_slice(), &[3, 4, 5, 6]);
    }
}
