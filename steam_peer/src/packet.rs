// Inbound packet queue.
//
// FIFO of attributed payloads in arrival order: channels are interleaved in
// the order the poll loop drained them, with no reordering by channel or
// reliability and no dedup. `take_next` moves the head into a "current"
// slot and lends it out; the slot keeps the payload alive until the
// following `take_next` (the generic layer reads the buffer in place
// between calls).

use std::collections::VecDeque;

use crate::types::{Channel, PeerId, TransferMode};

/// One received payload attributed to a registered peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    pub data: Vec<u8>,
    pub channel: Channel,
    pub reliable: bool,
    pub sender: PeerId,
}

impl Packet {
    pub fn transfer_mode(&self) -> TransferMode {
        if self.reliable {
            TransferMode::Reliable
        } else {
            TransferMode::Unreliable
        }
    }
}

#[derive(Debug, Default)]
pub struct PacketQueue {
    pending: VecDeque<Packet>,
    current: Option<Packet>,
}

impl PacketQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, packet: Packet) {
        self.pending.push_back(packet);
    }

    /// Number of packets not yet handed out.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// The packet the next `take_next` call will return.
    pub fn peek(&self) -> Option<&Packet> {
        self.pending.front()
    }

    /// Pop the oldest packet into the current slot and return it. The
    /// previously current packet is dropped.
    pub fn take_next(&mut self) -> Option<&Packet> {
        let packet = self.pending.pop_front()?;
        self.current = Some(packet);
        self.current.as_ref()
    }

    /// Drop every pending packet from `sender`. Called when the sender's
    /// peer id is freed, so a later holder of the id never inherits them.
    pub fn discard_from(&mut self, sender: PeerId) {
        self.pending.retain(|p| p.sender != sender);
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(tag: u8, channel: u32) -> Packet {
        Packet {
            data: vec![tag],
            channel: Channel(channel),
            reliable: channel % 2 == 0,
            sender: PeerId(42),
        }
    }

    #[test]
    fn fifo_across_channels() {
        let mut q = PacketQueue::new();
        q.push(packet(1, 2));
        q.push(packet(2, 0));
        q.push(packet(3, 2));
        q.push(packet(4, 1));

        let mut order = Vec::new();
        while let Some(p) = q.take_next() {
            order.push(p.data[0]);
        }
        assert_eq!(order, vec![1, 2, 3, 4]);
    }

    #[test]
    fn take_next_on_empty_returns_none() {
        let mut q = PacketQueue::new();
        assert!(q.take_next().is_none());

        q.push(packet(9, 0));
        assert_eq!(q.take_next().map(|p| p.data[0]), Some(9));
        assert!(q.take_next().is_none());
        assert!(q.is_empty());
    }

    #[test]
    fn peek_does_not_consume() {
        let mut q = PacketQueue::new();
        q.push(packet(5, 3));
        assert_eq!(q.peek().map(|p| p.channel), Some(Channel(3)));
        assert_eq!(q.len(), 1);
        assert_eq!(q.peek().unwrap().transfer_mode(), TransferMode::Unreliable);
    }

    #[test]
    fn discard_from_keeps_other_senders_in_order() {
        let mut q = PacketQueue::new();
        q.push(packet(1, 0));
        q.push(Packet {
            sender: PeerId(7),
            ..packet(2, 0)
        });
        q.push(packet(3, 0));
        q.discard_from(PeerId(42));
        assert_eq!(q.len(), 1);
        assert_eq!(q.peek().map(|p| p.sender), Some(PeerId(7)));
    }

    #[test]
    fn clear_drops_pending() {
        let mut q = PacketQueue::new();
        q.push(packet(1, 0));
        q.push(packet(2, 0));
        q.take_next();
        q.clear();
        assert!(q.is_empty());
        assert!(q.peek().is_none());
    }
}
