//! Bounded byte FIFOs exchanged between protocol engines and their consumers.

use crate::error::SimError;
use heapless::Deque;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Upper bound on any channel's capacity.
pub const MAX_CHANNEL_DEPTH: usize = 256;
pub const DEFAULT_CHANNEL_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ChannelStats {
    pub enqueued: u32,
    pub dequeued: u32,
    /// Bytes dropped because the FIFO was full.
    pub dropped: u32,
    pub high_water: u16,
}

/// A bounded FIFO of bytes.
///
/// Overflow never blocks the producer: the incoming byte is dropped, counted
/// and logged, the way a hardware receive buffer overruns.
#[derive(Debug)]
pub struct ByteChannel {
    name: String,
    capacity: usize,
    fifo: Deque<u8, MAX_CHANNEL_DEPTH>,
    stats: ChannelStats,
}

impl ByteChannel {
    pub fn new(name: impl Into<String>, capacity: usize) -> Result<Self, SimError> {
        let name = name.into();
        if capacity == 0 || capacity > MAX_CHANNEL_DEPTH {
            return Err(SimError::InvalidCapacity {
                channel: name,
                capacity,
                max: MAX_CHANNEL_DEPTH,
            });
        }
        Ok(Self {
            name,
            capacity,
            fifo: Deque::new(),
            stats: ChannelStats::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.fifo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fifo.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.fifo.len() >= self.capacity
    }

    /// Appends `byte`. Returns `false` and drops the byte when the FIFO is full.
    pub fn push(&mut self, byte: u8) -> bool {
        if self.is_full() || self.fifo.push_back(byte).is_err() {
            self.stats.dropped = self.stats.dropped.saturating_add(1);
            warn!(
                channel = %self.name,
                byte = format_args!("{byte:#04x}"),
                capacity = self.capacity,
                "channel full, byte dropped"
            );
            return false;
        }
        self.stats.enqueued = self.stats.enqueued.saturating_add(1);
        self.stats.high_water = self.stats.high_water.max(self.fifo.len() as u16);
        true
    }

    pub fn pop(&mut self) -> Option<u8> {
        let byte = self.fifo.pop_front()?;
        self.stats.dequeued = self.stats.dequeued.saturating_add(1);
        Some(byte)
    }

    pub fn peek(&self) -> Option<u8> {
        self.fifo.front().copied()
    }

    /// Discards every queued byte, returning how many were removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.fifo.len();
        self.fifo.clear();
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = &u8> {
        self.fifo.iter()
    }

    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut ch = ByteChannel::new("rx", 4).unwrap();
        for b in [1u8, 2, 3] {
            assert!(ch.push(b));
        }
        assert_eq!(ch.peek(), Some(1));
        assert_eq!(ch.pop(), Some(1));
        assert_eq!(ch.pop(), Some(2));
        assert_eq!(ch.pop(), Some(3));
        assert_eq!(ch.pop(), None);
        assert_eq!(ch.stats().dequeued, 3);
    }

    #[test]
    fn test_overflow_drops_newest() {
        let mut ch = ByteChannel::new("rx", 2).unwrap();
        assert!(ch.push(0xAA));
        assert!(ch.push(0xBB));
        assert!(!ch.push(0xCC));
        assert!(ch.is_full());
        assert_eq!(ch.stats().dropped, 1);
        assert_eq!(ch.iter().copied().collect::<Vec<_>>(), vec![0xAA, 0xBB]);
    }

    #[test]
    fn test_capacity_bounds() {
        assert!(ByteChannel::new("zero", 0).is_err());
        assert!(ByteChannel::new("huge", MAX_CHANNEL_DEPTH + 1).is_err());
        assert!(ByteChannel::new("max", MAX_CHANNEL_DEPTH).is_ok());
    }

    #[test]
    fn test_clear() {
        let mut ch = ByteChannel::new("tx", 8).unwrap();
        ch.push(1);
        ch.push(2);
        assert_eq!(ch.clear(), 2);
        assert!(ch.is_empty());
    }
}
