//! # Packet Header and Notify
//!
//! Every packet starts with a 96-bit header. Acknowledgements ride on the
//! header of the opposite direction, so each endpoint learns the fate of
//! every packet it sent:
//!
//! ```text
//! header:  [sequence : u32] [ack : u32] [ack_bits : u32]
//!
//! ack_bits bit i set  ⇔  packet (ack - 1 - i) was received
//! ```
//!
//! Packets that arrive after a newer one are discarded, so delivery is
//! "latest wins" and each sent packet is reported exactly once, as either
//! delivered or lost, in sequence order.

use std::collections::VecDeque;

use ghostwire_shared::{BitStream, StreamResult};
use tracing::{trace, warn};

/// Largest packet either side will build, in bytes.
pub const MAX_PACKET_SIZE: usize = 1200;

/// Header present in every packet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PacketHeader {
    /// Sequence number of this packet (first packet is 1).
    pub sequence: u32,
    /// Highest sequence received from the remote end, 0 if none.
    pub ack: u32,
    /// Receipt of the 32 packets before `ack`.
    pub ack_bits: u32,
}

impl PacketHeader {
    /// Size of the header in bits.
    pub const BITS: usize = 96;

    /// Writes the header.
    pub fn write(&self, stream: &mut BitStream) {
        stream.write_u32(self.sequence);
        stream.write_u32(self.ack);
        stream.write_u32(self.ack_bits);
    }

    /// Reads a header.
    ///
    /// # Errors
    ///
    /// Propagates stream underruns.
    pub fn read(stream: &mut BitStream) -> StreamResult<Self> {
        Ok(Self {
            sequence: stream.read_u32()?,
            ack: stream.read_u32()?,
            ack_bits: stream.read_u32()?,
        })
    }
}

/// Sequence and acknowledgement state of one connection.
///
/// `N` is whatever the owner remembers about each sent packet; it is handed
/// back once the packet is known delivered or lost.
#[derive(Clone, Debug)]
pub struct PacketWindow<N> {
    next_sequence: u32,
    highest_received: u32,
    received_bits: u32,
    in_flight: VecDeque<(u32, N)>,
}

impl<N> PacketWindow<N> {
    /// Creates a window that has neither sent nor received anything.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next_sequence: 1,
            highest_received: 0,
            received_bits: 0,
            in_flight: VecDeque::new(),
        }
    }

    /// Builds the header for the next outgoing packet and remembers `notify`.
    pub fn prepare_send(&mut self, notify: N) -> PacketHeader {
        let header = PacketHeader {
            sequence: self.next_sequence,
            ack: self.highest_received,
            ack_bits: self.received_bits,
        };
        self.next_sequence = self.next_sequence.wrapping_add(1);
        self.in_flight.push_back((header.sequence, notify));
        header
    }

    /// Number of sent packets awaiting a verdict.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Accepts an incoming header.
    ///
    /// Returns `None` for stale or duplicate packets, which must be ignored.
    /// Otherwise returns the notify data of every packet whose fate this
    /// header settles, oldest first, paired with `true` if it was delivered.
    pub fn receive(&mut self, header: &PacketHeader) -> Option<Vec<(N, bool)>> {
        if header.sequence <= self.highest_received {
            warn!(
                sequence = header.sequence,
                highest = self.highest_received,
                "discarding stale or duplicate packet"
            );
            return None;
        }

        let shift = header.sequence - self.highest_received;
        let previous_bit = if self.highest_received == 0 {
            0
        } else {
            1u32.checked_shl(shift - 1).unwrap_or(0)
        };
        self.received_bits = self.received_bits.checked_shl(shift).unwrap_or(0) | previous_bit;
        self.highest_received = header.sequence;

        let mut settled = Vec::new();
        while let Some((sequence, _)) = self.in_flight.front() {
            let sequence = *sequence;
            if sequence > header.ack {
                break;
            }
            let Some((_, notify)) = self.in_flight.pop_front() else {
                break;
            };
            let delivered = sequence == header.ack || {
                let back = header.ack - sequence - 1;
                back < 32 && header.ack_bits & (1 << back) != 0
            };
            trace!(sequence, delivered, "packet settled");
            settled.push((notify, delivered));
        }
        Some(settled)
    }
}

impl<N> Default for PacketWindow<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_round_trip_is_96_bits() {
        let header = PacketHeader {
            sequence: 9,
            ack: 7,
            ack_bits: 0b101,
        };
        let mut stream = BitStream::new();
        header.write(&mut stream);
        assert_eq!(stream.bit_len(), PacketHeader::BITS);
        stream.set_bit_position(0);
        assert_eq!(PacketHeader::read(&mut stream).unwrap(), header);
    }

    #[test]
    fn test_stale_and_duplicate_packets_are_rejected() {
        let mut window: PacketWindow<()> = PacketWindow::new();
        let at = |sequence| PacketHeader {
            sequence,
            ..PacketHeader::default()
        };
        assert!(window.receive(&at(3)).is_some());
        assert!(window.receive(&at(3)).is_none());
        assert!(window.receive(&at(2)).is_none());
        assert!(window.receive(&at(4)).is_some());
    }

    #[test]
    fn test_ack_bits_track_gaps() {
        let mut a: PacketWindow<()> = PacketWindow::new();
        let mut b: PacketWindow<u32> = PacketWindow::new();

        // b sends 1, 2, 3; only 1 and 3 arrive at a
        let h1 = b.prepare_send(1);
        let _lost = b.prepare_send(2);
        let h3 = b.prepare_send(3);
        a.receive(&h1);
        a.receive(&h3);

        let reply = a.prepare_send(());
        assert_eq!(reply.ack, 3);
        // bit 0: packet 2 missing, bit 1: packet 1 received
        assert_eq!(reply.ack_bits, 0b10);

        let settled = b.receive(&reply).unwrap();
        assert_eq!(settled, vec![(1, true), (2, false), (3, true)]);
        assert_eq!(b.in_flight(), 0);
    }

    #[test]
    fn test_unacked_packets_stay_in_flight() {
        let mut a: PacketWindow<()> = PacketWindow::new();
        let mut b: PacketWindow<u32> = PacketWindow::new();
        let h1 = b.prepare_send(1);
        b.prepare_send(2);
        a.receive(&h1);

        let settled = b.receive(&a.prepare_send(())).unwrap();
        assert_eq!(settled, vec![(1, true)]);
        assert_eq!(b.in_flight(), 1);
    }
}
