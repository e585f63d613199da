//! # Lossy Loopback Link
//!
//! Deterministic stand-in for an unreliable transport: latency, jitter,
//! loss and duplication driven by a seeded ChaCha stream, so a run with the
//! same seed delivers the same packets at the same times.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::trace;

/// Network conditions for one direction of a link.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkConditions {
    /// Base latency in milliseconds.
    pub base_latency_ms: u32,
    /// Extra random delay, uniform in `0..=jitter_ms`.
    pub jitter_ms: u32,
    /// Packet loss percentage (0-100).
    pub packet_loss_percent: u8,
    /// Duplicate packet percentage (0-100).
    pub duplicate_percent: u8,
}

impl LinkConditions {
    /// Instant, lossless delivery.
    pub const PERFECT: Self = Self {
        base_latency_ms: 0,
        jitter_ms: 0,
        packet_loss_percent: 0,
        duplicate_percent: 0,
    };

    /// Average network conditions (cable).
    pub const AVERAGE: Self = Self {
        base_latency_ms: 50,
        jitter_ms: 20,
        packet_loss_percent: 1,
        duplicate_percent: 1,
    };

    /// Poor network conditions (mobile/wifi).
    pub const POOR: Self = Self {
        base_latency_ms: 100,
        jitter_ms: 50,
        packet_loss_percent: 5,
        duplicate_percent: 2,
    };
}

impl Default for LinkConditions {
    fn default() -> Self {
        Self::AVERAGE
    }
}

/// Counters for one link.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Packets handed to the link.
    pub sent: u32,
    /// Packets the link threw away.
    pub dropped: u32,
    /// Extra copies the link created.
    pub duplicated: u32,
    /// Packets handed out by [`LossyLink::advance`].
    pub delivered: u32,
}

/// One direction of a simulated connection.
#[derive(Clone, Debug)]
pub struct LossyLink {
    conditions: LinkConditions,
    rng: ChaCha8Rng,
    now_ms: u64,
    order: u64,
    in_flight: Vec<(u64, u64, Vec<u8>)>,
    stats: LinkStats,
}

impl LossyLink {
    /// Creates a link with the given conditions and seed.
    #[must_use]
    pub fn new(conditions: LinkConditions, seed: u64) -> Self {
        Self {
            conditions,
            rng: ChaCha8Rng::seed_from_u64(seed),
            now_ms: 0,
            order: 0,
            in_flight: Vec::new(),
            stats: LinkStats::default(),
        }
    }

    /// Counters so far.
    #[must_use]
    pub const fn stats(&self) -> LinkStats {
        self.stats
    }

    /// Hands a packet to the link.
    pub fn send(&mut self, packet: Vec<u8>) {
        self.stats.sent += 1;
        if self.roll(self.conditions.packet_loss_percent) {
            self.stats.dropped += 1;
            trace!(bytes = packet.len(), "link dropped packet");
            return;
        }
        if self.roll(self.conditions.duplicate_percent) {
            self.stats.duplicated += 1;
            self.schedule(packet.clone());
        }
        self.schedule(packet);
    }

    /// Moves time forward and returns every packet now due, in arrival order.
    pub fn advance(&mut self, delta_ms: u32) -> Vec<Vec<u8>> {
        self.now_ms += u64::from(delta_ms);
        let now = self.now_ms;
        let (mut due, pending): (Vec<_>, Vec<_>) = self.in_flight.drain(..).partition(|(at, _, _)| *at <= now);
        self.in_flight = pending;
        due.sort_by_key(|(at, order, _)| (*at, *order));
        self.stats.delivered += due.len() as u32;
        due.into_iter().map(|(_, _, packet)| packet).collect()
    }

    fn roll(&mut self, percent: u8) -> bool {
        percent > 0 && self.rng.gen_range(0..100u8) < percent
    }

    fn schedule(&mut self, packet: Vec<u8>) {
        let jitter = if self.conditions.jitter_ms > 0 {
            self.rng.gen_range(0..=self.conditions.jitter_ms)
        } else {
            0
        };
        let at = self.now_ms + u64::from(self.conditions.base_latency_ms + jitter);
        self.in_flight.push((at, self.order, packet));
        self.order += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_link_delivers_in_order() {
        let mut link = LossyLink::new(LinkConditions::PERFECT, 1);
        link.send(vec![1]);
        link.send(vec![2]);
        assert_eq!(link.advance(0), vec![vec![1], vec![2]]);
        assert_eq!(link.stats().delivered, 2);
    }

    #[test]
    fn test_latency_holds_packets_back() {
        let conditions = LinkConditions {
            base_latency_ms: 40,
            ..LinkConditions::PERFECT
        };
        let mut link = LossyLink::new(conditions, 1);
        link.send(vec![7]);
        assert!(link.advance(39).is_empty());
        assert_eq!(link.advance(1), vec![vec![7]]);
    }

    #[test]
    fn test_same_seed_same_fate() {
        let run = |seed| {
            let mut link = LossyLink::new(LinkConditions::POOR, seed);
            let mut arrivals = Vec::new();
            for i in 0..200u8 {
                link.send(vec![i]);
                arrivals.extend(link.advance(16));
            }
            arrivals.extend(link.advance(1000));
            (arrivals, link.stats())
        };
        assert_eq!(run(42), run(42));
        let (_, stats) = run(42);
        assert_eq!(stats.sent, 200);
        assert_eq!(stats.delivered, stats.sent - stats.dropped + stats.duplicated);
    }
}
