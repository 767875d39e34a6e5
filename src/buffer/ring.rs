//! Fixed-capacity byte queue used for RX and TX staging
//!
//! Overflow is a policy decision signalled only through return counts;
//! callers log the shortfall, nothing here fails.

use heapless::Deque;

/// Bounded FIFO of bytes with lossy and lossless write modes.
pub struct ByteRingBuffer<const N: usize> {
    bytes: Deque<u8, N>,
}

impl<const N: usize> ByteRingBuffer<N> {
    /// Create an empty buffer.
    pub const fn new() -> Self {
        Self {
            bytes: Deque::new(),
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of readable bytes.
    pub fn available(&self) -> usize {
        self.bytes.len()
    }

    /// Number of bytes that fit without evicting anything.
    pub fn free(&self) -> usize {
        N - self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Append all of `data`, evicting the oldest bytes when full.
    ///
    /// Always reports the whole input as written. When `data` is longer than
    /// the capacity only its newest `N` bytes survive.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let tail = if data.len() > N {
            &data[data.len() - N..]
        } else {
            data
        };

        for &byte in tail {
            if self.bytes.is_full() {
                self.bytes.pop_front();
            }
            let _ = self.bytes.push_back(byte);
        }

        data.len()
    }

    /// Append as much of `data` as fits, never evicting.
    ///
    /// Returns the number of bytes accepted; `data.len() - returned` were dropped.
    pub fn write_without_replacement(&mut self, data: &[u8]) -> usize {
        let accepted = data.len().min(self.free());
        for &byte in &data[..accepted] {
            let _ = self.bytes.push_back(byte);
        }
        accepted
    }

    /// Consume up to `out.len()` bytes into `out`.
    ///
    /// Never waits; returns how many bytes were actually copied.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let mut count = 0;
        for slot in out.iter_mut() {
            match self.bytes.pop_front() {
                Some(byte) => {
                    *slot = byte;
                    count += 1;
                }
                None => break,
            }
        }
        count
    }

    /// Discard everything buffered.
    pub fn clear(&mut self) {
        self.bytes.clear();
    }
}

impl<const N: usize> Default for ByteRingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
