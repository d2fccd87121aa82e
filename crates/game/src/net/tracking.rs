use std::collections::VecDeque;
use std::time::{Duration, Instant};

const SEQUENCE_WRAP_THRESHOLD: u32 = u32::MAX / 2;

/// Wrap-aware "s1 is newer than s2" for 32-bit sequences.
#[inline]
pub fn sequence_greater_than(s1: u32, s2: u32) -> bool {
    ((s1 > s2) && (s1 - s2 <= SEQUENCE_WRAP_THRESHOLD))
        || ((s1 < s2) && (s2 - s1 > SEQUENCE_WRAP_THRESHOLD))
}

#[inline]
pub(crate) fn order_greater_than(s1: u16, s2: u16) -> bool {
    const HALF: u16 = u16::MAX / 2;
    ((s1 > s2) && (s1 - s2 <= HALF)) || ((s1 < s2) && (s2 - s1 > HALF))
}

#[derive(Debug, Clone)]
struct SentDatagram {
    sequence: u32,
    sent_at: Instant,
    acked: bool,
}

/// Outbound datagram bookkeeping and the smoothed RTT estimate.
#[derive(Debug)]
pub struct AckTracker {
    pending: VecDeque<SentDatagram>,
    max_pending: usize,
    srtt: f32,
    rtt_var: f32,
    lost: u64,
}

impl AckTracker {
    pub fn new(max_pending: usize) -> Self {
        Self {
            pending: VecDeque::with_capacity(max_pending),
            max_pending,
            srtt: 100.0,
            rtt_var: 50.0,
            lost: 0,
        }
    }

    pub fn track(&mut self, sequence: u32, now: Instant) {
        while self.pending.len() >= self.max_pending {
            if self.pending.pop_front().is_some_and(|old| !old.acked) {
                self.lost += 1;
            }
        }

        self.pending.push_back(SentDatagram {
            sequence,
            sent_at: now,
            acked: false,
        });
    }

    /// Marks every datagram covered by `ack`/`ack_bitfield` and returns the
    /// newly acknowledged sequences.
    pub fn process_ack(&mut self, ack: u32, ack_bitfield: u32, now: Instant) -> Vec<u32> {
        let mut acked = Vec::new();
        let mut samples = Vec::new();

        for sent in self.pending.iter_mut().filter(|s| !s.acked) {
            let covered = if sent.sequence == ack {
                true
            } else if sequence_greater_than(ack, sent.sequence) {
                let diff = ack.wrapping_sub(sent.sequence);
                diff <= 32 && (ack_bitfield & (1 << (diff - 1))) != 0
            } else {
                false
            };

            if covered {
                sent.acked = true;
                acked.push(sent.sequence);
                samples.push(now.duration_since(sent.sent_at).as_secs_f32() * 1000.0);
            }
        }

        for rtt in samples {
            self.update_rtt(rtt);
        }

        while self.pending.front().is_some_and(|s| s.acked) {
            self.pending.pop_front();
        }

        acked
    }

    fn update_rtt(&mut self, rtt: f32) {
        const ALPHA: f32 = 0.125;
        const BETA: f32 = 0.25;

        let diff = (rtt - self.srtt).abs();
        self.rtt_var = (1.0 - BETA) * self.rtt_var + BETA * diff;
        self.srtt = (1.0 - ALPHA) * self.srtt + ALPHA * rtt;
    }

    pub fn srtt(&self) -> f32 {
        self.srtt
    }

    pub fn rtt_var(&self) -> f32 {
        self.rtt_var
    }

    /// Retransmission timeout: `srtt + 4 * rttvar`.
    pub fn rto(&self) -> Duration {
        Duration::from_secs_f32(((self.srtt + 4.0 * self.rtt_var) / 1000.0).max(0.01))
    }

    pub fn unacked_count(&self) -> usize {
        self.pending.iter().filter(|s| !s.acked).count()
    }

    pub fn lost(&self) -> u64 {
        self.lost
    }
}

/// Inbound datagram bookkeeping: duplicate filter plus the ack bitfield
/// echoed back in every outgoing header.
#[derive(Debug)]
pub struct ReceiveTracker {
    last_received: u32,
    received_bitfield: u32,
    recent: VecDeque<u32>,
    max_recent: usize,
}

impl Default for ReceiveTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiveTracker {
    pub fn new() -> Self {
        Self {
            last_received: 0,
            received_bitfield: 0,
            recent: VecDeque::with_capacity(128),
            max_recent: 128,
        }
    }

    /// Returns false for a duplicate.
    pub fn record(&mut self, sequence: u32) -> bool {
        if self.recent.contains(&sequence) {
            return false;
        }

        if self.recent.len() >= self.max_recent {
            self.recent.pop_front();
        }
        self.recent.push_back(sequence);

        if sequence_greater_than(sequence, self.last_received) {
            let diff = sequence.wrapping_sub(self.last_received);
            self.received_bitfield = if diff < 32 {
                (self.received_bitfield << diff) | (1 << (diff - 1))
            } else if diff == 32 {
                1 << 31
            } else {
                0
            };
            self.last_received = sequence;
        } else {
            let diff = self.last_received.wrapping_sub(sequence);
            if diff > 0 && diff <= 32 {
                self.received_bitfield |= 1 << (diff - 1);
            }
        }

        true
    }

    pub fn ack_data(&self) -> (u32, u32) {
        (self.last_received, self.received_bitfield)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitfield_tracks_previous_sequences() {
        let mut tracker = ReceiveTracker::new();

        tracker.record(1);
        tracker.record(2);
        tracker.record(3);

        let (ack, bitfield) = tracker.ack_data();
        assert_eq!(ack, 3);
        assert_eq!(bitfield & 0b11, 0b11);
    }

    #[test]
    fn out_of_order_arrivals_fill_bitfield() {
        let mut tracker = ReceiveTracker::new();

        tracker.record(3);
        tracker.record(1);
        tracker.record(2);

        let (ack, bitfield) = tracker.ack_data();
        assert_eq!(ack, 3);
        assert_eq!(bitfield & 0b11, 0b11);
    }

    #[test]
    fn duplicates_are_detected() {
        let mut tracker = ReceiveTracker::new();

        assert!(tracker.record(1));
        assert!(!tracker.record(1));
        assert!(tracker.record(2));
    }

    #[test]
    fn ack_round_trip_between_trackers() {
        let start = Instant::now();
        let mut sender = AckTracker::new(32);
        let mut receiver = ReceiveTracker::new();

        for seq in 1..=4 {
            sender.track(seq, start);
        }
        receiver.record(1);
        receiver.record(2);
        receiver.record(4);

        let (ack, bits) = receiver.ack_data();
        let mut acked = sender.process_ack(ack, bits, start + Duration::from_millis(20));
        acked.sort_unstable();

        assert_eq!(acked, vec![1, 2, 4]);
        assert_eq!(sender.unacked_count(), 1);
        assert!(sender.srtt() < 100.0);
    }

    #[test]
    fn evicted_unacked_datagrams_count_as_lost() {
        let now = Instant::now();
        let mut sender = AckTracker::new(2);

        sender.track(1, now);
        sender.track(2, now);
        sender.track(3, now);

        assert_eq!(sender.lost(), 1);
    }

    #[test]
    fn sequence_comparison_wraps() {
        assert!(sequence_greater_than(1, 0));
        assert!(sequence_greater_than(0, u32::MAX));
        assert!(!sequence_greater_than(u32::MAX, 0));
        assert!(order_greater_than(0, u16::MAX));
        assert!(!order_greater_than(5, 5));
    }
}
