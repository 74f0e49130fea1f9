//! Circular byte accumulator between the transport and the word protocol.
//!
//! Bytes are pulled from the link as they arrive and handed out only as
//! whole words, most significant byte first.

use byteorder::{BigEndian, ByteOrder};
use tracing::trace;

use crate::error::Result;
use crate::protocol::constants::READ_BUFFER_SIZE;
use crate::transport::UsbTransport;

/// Fixed-capacity ring of received bytes.
#[derive(Debug)]
pub struct WordBuffer {
    ring: Box<[u8]>,
    read_pos: usize,
    len: usize,
}

impl WordBuffer {
    pub fn new() -> Self {
        Self::with_capacity(READ_BUFFER_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ring: vec![0u8; capacity].into_boxed_slice(),
            read_pos: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.ring.len()
    }

    /// Buffered bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whole words currently buffered.
    pub fn words_available(&self) -> usize {
        self.len / 4
    }

    /// Pull whatever the link has ready, up to the free space left.
    pub fn collect<T: UsbTransport + ?Sized>(&mut self, transport: &mut T) -> Result<usize> {
        let free = self.capacity() - self.len;
        if free == 0 {
            return Ok(0);
        }
        let bytes = transport.read(free)?;
        self.push_bytes(&bytes);
        if !bytes.is_empty() {
            trace!(collected = bytes.len(), buffered = self.len, "Collected bytes");
        }
        Ok(bytes.len())
    }

    /// Append bytes, dropping any that do not fit.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> usize {
        let capacity = self.capacity();
        let n = bytes.len().min(capacity - self.len);
        for &b in &bytes[..n] {
            let write_pos = (self.read_pos + self.len) % capacity;
            self.ring[write_pos] = b;
            self.len += 1;
        }
        n
    }

    fn byte_at(&self, offset: usize) -> u8 {
        self.ring[(self.read_pos + offset) % self.capacity()]
    }

    fn word_at(&self, word_offset: usize) -> u32 {
        let start = word_offset * 4;
        let bytes = [
            self.byte_at(start),
            self.byte_at(start + 1),
            self.byte_at(start + 2),
            self.byte_at(start + 3),
        ];
        BigEndian::read_u32(&bytes)
    }

    /// The next word, without consuming it.
    pub fn peek_word(&self) -> Option<u32> {
        (self.len >= 4).then(|| self.word_at(0))
    }

    /// Take `n` words, or nothing if fewer than `n` whole words are buffered.
    pub fn take_words(&mut self, n: usize) -> Option<Vec<u32>> {
        if self.len < n * 4 {
            return None;
        }
        let words: Vec<u32> = (0..n).map(|i| self.word_at(i)).collect();
        self.read_pos = (self.read_pos + n * 4) % self.capacity();
        self.len -= n * 4;
        Some(words)
    }

    /// Discard everything buffered.
    pub fn flush_and_reset(&mut self) {
        self.read_pos = 0;
        self.len = 0;
    }
}

impl Default for WordBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    #[test]
    fn test_fixed_byte_order() {
        let mut buffer = WordBuffer::new();
        buffer.push_bytes(&[0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE, 0xF0]);
        // Same values on any host: the first byte is always the high byte.
        assert_eq!(buffer.take_words(2), Some(vec![0x12345678, 0x9ABCDEF0]));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_partial_word_not_exposed() {
        let mut buffer = WordBuffer::new();
        buffer.push_bytes(&[0xAA, 0xBB, 0xCC]);
        assert_eq!(buffer.peek_word(), None);
        assert_eq!(buffer.take_words(1), None);
        assert_eq!(buffer.len(), 3);

        buffer.push_bytes(&[0xDD]);
        assert_eq!(buffer.take_words(1), Some(vec![0xAABBCCDD]));
    }

    #[test]
    fn test_take_fails_without_enough_bytes() {
        let mut buffer = WordBuffer::new();
        buffer.push_bytes(&[0, 0, 0, 1, 0, 0]);
        assert_eq!(buffer.take_words(2), None);
        assert_eq!(buffer.words_available(), 1);
        assert_eq!(buffer.len(), 6);
    }

    #[test]
    fn test_wraps_around() {
        let mut buffer = WordBuffer::with_capacity(8);
        buffer.push_bytes(&[0, 0, 0, 1, 0, 0]);
        assert_eq!(buffer.take_words(1), Some(vec![1]));
        // Write position wraps past the end of the ring.
        buffer.push_bytes(&[0, 2, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(buffer.len(), 8);
        assert_eq!(buffer.take_words(2), Some(vec![2, 0xFFFFFFFF]));
    }

    #[test]
    fn test_collect_bounded_by_free_space() {
        let mut mock = MockTransport::new();
        mock.queue_bytes(&[7u8; 12]);
        let mut buffer = WordBuffer::with_capacity(8);
        assert_eq!(buffer.collect(&mut mock).unwrap(), 8);
        assert_eq!(buffer.collect(&mut mock).unwrap(), 0);
        assert_eq!(mock.pending_bytes(), 4);
    }

    #[test]
    fn test_flush_and_reset() {
        let mut buffer = WordBuffer::new();
        buffer.push_bytes(&[1, 2, 3, 4, 5]);
        buffer.flush_and_reset();
        assert!(buffer.is_empty());
        assert_eq!(buffer.take_words(1), None);
    }
}
