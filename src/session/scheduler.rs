//! Outbound chunking with a single write in flight
//!
//! The scheduler pulls at most one MTU-sized chunk from the TX ring per
//! call and refuses to send another until the stack acknowledges it.

use crate::buffer::ByteRingBuffer;
use crate::config::mtu::{ATT_HEADER_LEN, FALLBACK_PAYLOAD, MAX_PAYLOAD};
use crate::link::{AttHandle, BleStack, ConnId, StackError};

/// Largest payload one write can carry at `mtu`
pub fn payload_size(mtu: u16) -> usize {
    usize::from(mtu)
        .saturating_sub(ATT_HEADER_LEN)
        .max(FALLBACK_PAYLOAD)
        .min(MAX_PAYLOAD)
}

/// Result of one scheduling attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// A chunk of this many bytes was submitted
    Sent(usize),
    /// Nothing staged
    Drained,
    /// The previous chunk is still unacknowledged
    InFlight,
    /// Submission failed; the chunk's bytes are gone
    Failed(StackError),
}

#[derive(Debug, Default)]
pub struct ChunkScheduler {
    in_flight: bool,
}

impl ChunkScheduler {
    pub const fn new() -> Self {
        Self { in_flight: false }
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// Submit the next chunk if nothing is outstanding.
    pub fn pump<const N: usize, S: BleStack>(
        &mut self,
        tx: &mut ByteRingBuffer<N>,
        stack: &mut S,
        conn: ConnId,
        handle: AttHandle,
        mtu: u16,
    ) -> ChunkOutcome {
        if self.in_flight {
            return ChunkOutcome::InFlight;
        }
        if tx.is_empty() {
            return ChunkOutcome::Drained;
        }

        let mut chunk = [0u8; MAX_PAYLOAD];
        let size = payload_size(mtu).min(tx.available());
        let len = tx.read(&mut chunk[..size]);

        log::trace!("TX chunk {} bytes: {:02X?}", len, &chunk[..len]);
        match stack.send_chunk(conn, handle, &chunk[..len]) {
            Ok(()) => {
                self.in_flight = true;
                ChunkOutcome::Sent(len)
            }
            Err(e) => {
                // Already pulled from the ring, no retry at this layer
                log::warn!("TX chunk submit failed: {:?}, {} bytes dropped", e, len);
                ChunkOutcome::Failed(e)
            }
        }
    }

    /// The outstanding chunk completed (successfully or not).
    pub fn acknowledge(&mut self) {
        self.in_flight = false;
    }

    /// Forget the outstanding chunk after a disconnect.
    pub fn abandon(&mut self) {
        if self.in_flight {
            log::debug!("TX: abandoning in-flight chunk");
        }
        self.in_flight = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::traits::mock::MockStack;

    const CONN: ConnId = ConnId(1);
    const HANDLE: AttHandle = 0x0010;

    #[test]
    fn test_payload_size() {
        assert_eq!(payload_size(23), 20);
        assert_eq!(payload_size(247), 244);
        // Never below the pre-exchange fallback
        assert_eq!(payload_size(0), 20);
        assert_eq!(payload_size(10), 20);
        // Never above the attribute limit
        assert_eq!(payload_size(517), 512);
    }

    #[test]
    fn test_fifty_bytes_at_default_mtu() {
        let mut tx: ByteRingBuffer<512> = ByteRingBuffer::new();
        let mut stack = MockStack::new();
        let mut scheduler = ChunkScheduler::new();
        let data: Vec<u8> = (0..50).collect();
        tx.write(&data);

        assert_eq!(scheduler.pump(&mut tx, &mut stack, CONN, HANDLE, 23), ChunkOutcome::Sent(20));
        // Nothing more until acknowledged
        assert_eq!(scheduler.pump(&mut tx, &mut stack, CONN, HANDLE, 23), ChunkOutcome::InFlight);
        assert_eq!(stack.sent_chunks().len(), 1);

        scheduler.acknowledge();
        assert_eq!(scheduler.pump(&mut tx, &mut stack, CONN, HANDLE, 23), ChunkOutcome::Sent(20));
        scheduler.acknowledge();
        assert_eq!(scheduler.pump(&mut tx, &mut stack, CONN, HANDLE, 23), ChunkOutcome::Sent(10));
        scheduler.acknowledge();
        assert_eq!(scheduler.pump(&mut tx, &mut stack, CONN, HANDLE, 23), ChunkOutcome::Drained);

        let chunks = stack.sent_chunks();
        assert_eq!(chunks.iter().map(Vec::len).collect::<Vec<_>>(), vec![20, 20, 10]);
        assert_eq!(chunks.concat(), data);
    }

    #[test]
    fn test_submit_failure_clears_in_flight() {
        let mut tx: ByteRingBuffer<64> = ByteRingBuffer::new();
        let mut stack = MockStack::new();
        let mut scheduler = ChunkScheduler::new();
        tx.write(&[1; 30]);

        stack.set_next_send_error(StackError::Busy);
        assert_eq!(
            scheduler.pump(&mut tx, &mut stack, CONN, HANDLE, 23),
            ChunkOutcome::Failed(StackError::Busy)
        );
        assert!(!scheduler.in_flight());
        // The failed chunk is not retried, the rest goes out next
        assert_eq!(tx.available(), 10);
        assert_eq!(scheduler.pump(&mut tx, &mut stack, CONN, HANDLE, 23), ChunkOutcome::Sent(10));
    }

    #[test]
    fn test_abandon_keeps_unsent_bytes() {
        let mut tx: ByteRingBuffer<64> = ByteRingBuffer::new();
        let mut stack = MockStack::new();
        let mut scheduler = ChunkScheduler::new();
        tx.write(&[2; 30]);

        scheduler.pump(&mut tx, &mut stack, CONN, HANDLE, 23);
        scheduler.abandon();
        assert!(!scheduler.in_flight());
        assert_eq!(tx.available(), 10);
    }
}
