//! Single-byte lookahead over a consuming ring buffer
//!
//! A peeked byte is physically removed from the ring and held here until a
//! read consumes it, so it is never counted twice.

use super::ring::ByteRingBuffer;

#[derive(Debug, Default, Clone, Copy)]
pub struct PeekCache {
    byte: Option<u8>,
}

impl PeekCache {
    pub const fn new() -> Self {
        Self { byte: None }
    }

    /// Whether a byte is currently held ahead of the ring.
    pub fn is_valid(&self) -> bool {
        self.byte.is_some()
    }

    /// Return the next byte without consuming it from the caller's view.
    pub fn peek<const N: usize>(&mut self, ring: &mut ByteRingBuffer<N>) -> Option<u8> {
        if let Some(byte) = self.byte {
            return Some(byte);
        }

        let mut tmp = [0u8; 1];
        if ring.read(&mut tmp) == 0 {
            return None;
        }
        self.byte = Some(tmp[0]);
        self.byte
    }

    /// Readable bytes, counting the cached one.
    pub fn available<const N: usize>(&self, ring: &ByteRingBuffer<N>) -> usize {
        ring.available() + usize::from(self.byte.is_some())
    }

    /// Consume up to `out.len()` bytes, cached byte first.
    pub fn read<const N: usize>(&mut self, ring: &mut ByteRingBuffer<N>, out: &mut [u8]) -> usize {
        if out.is_empty() {
            return 0;
        }

        let mut count = 0;
        if let Some(byte) = self.byte.take() {
            out[0] = byte;
            count = 1;
        }
        count + ring.read(&mut out[count..])
    }

    /// Drop the cached byte.
    pub fn clear(&mut self) {
        self.byte = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peek_then_read_same_byte() {
        let mut ring: ByteRingBuffer<8> = ByteRingBuffer::new();
        let mut cache = PeekCache::new();
        ring.write(&[0x41, 0x42, 0x43]);

        let before = cache.available(&ring);
        assert_eq!(cache.peek(&mut ring), Some(0x41));
        // Peek does not change what is readable
        assert_eq!(cache.available(&ring), before);
        // Repeated peeks see the same byte
        assert_eq!(cache.peek(&mut ring), Some(0x41));

        let mut out = [0u8; 1];
        assert_eq!(cache.read(&mut ring, &mut out), 1);
        assert_eq!(out[0], 0x41);
        assert_eq!(cache.available(&ring), before - 1);
        assert!(!cache.is_valid());
    }

    #[test]
    fn test_read_combines_cache_and_ring() {
        let mut ring: ByteRingBuffer<8> = ByteRingBuffer::new();
        let mut cache = PeekCache::new();
        ring.write(&[1, 2, 3, 4]);

        cache.peek(&mut ring);
        let mut out = [0u8; 3];
        assert_eq!(cache.read(&mut ring, &mut out), 3);
        assert_eq!(out, [1, 2, 3]);
        assert_eq!(cache.available(&ring), 1);
    }

    #[test]
    fn test_peek_on_empty_ring() {
        let mut ring: ByteRingBuffer<4> = ByteRingBuffer::new();
        let mut cache = PeekCache::new();
        assert_eq!(cache.peek(&mut ring), None);
        assert_eq!(cache.available(&ring), 0);
    }

    #[test]
    fn test_cached_byte_alone_satisfies_read() {
        let mut ring: ByteRingBuffer<4> = ByteRingBuffer::new();
        let mut cache = PeekCache::new();
        ring.write(&[7]);
        cache.peek(&mut ring);
        assert!(ring.is_empty());

        let mut out = [0u8; 4];
        assert_eq!(cache.read(&mut ring, &mut out), 1);
        assert_eq!(out[0], 7);
    }

    #[test]
    fn test_empty_output_consumes_nothing() {
        let mut ring: ByteRingBuffer<4> = ByteRingBuffer::new();
        let mut cache = PeekCache::new();
        ring.write(&[7]);
        cache.peek(&mut ring);

        assert_eq!(cache.read(&mut ring, &mut []), 0);
        assert!(cache.is_valid());
    }
}
