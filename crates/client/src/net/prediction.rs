use std::collections::VecDeque;

use tether::net::sequence_greater_than;
use tether::{Entity, PlayerInput};

const MAX_PENDING_INPUTS: usize = 128;

#[derive(Debug, Clone, Copy)]
struct PendingInput {
    input: PlayerInput,
    /// Seconds the input was held before the next one replaced it.
    duration: f32,
}

/// Inputs the host has not confirmed yet. After an authoritative snap the
/// local paddle is rewound to the host's state and these are replayed on top.
#[derive(Debug, Default)]
pub struct InputHistory {
    pending: VecDeque<PendingInput>,
    last_acked: Option<u32>,
}

impl InputHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, input: PlayerInput, duration: f32) {
        self.pending.push_back(PendingInput { input, duration });
        while self.pending.len() > MAX_PENDING_INPUTS {
            self.pending.pop_front();
        }
    }

    /// Drops every input at or before `sequence`.
    pub fn acknowledge(&mut self, sequence: u32) {
        if self
            .last_acked
            .is_some_and(|last| !sequence_greater_than(sequence, last))
        {
            return;
        }
        self.last_acked = Some(sequence);

        while self
            .pending
            .front()
            .is_some_and(|p| !sequence_greater_than(p.input.sequence, sequence))
        {
            self.pending.pop_front();
        }
    }

    /// Re-applies the unconfirmed inputs to a paddle that was just snapped.
    pub fn replay(&self, paddle: &mut Entity, speed: f32) {
        for pending in &self.pending {
            paddle.velocity = pending.input.movement.clamp_length_max(1.0) * speed;
            paddle.position += paddle.velocity * pending.duration;
        }
    }

    pub fn last_acked(&self) -> Option<u32> {
        self.last_acked
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.last_acked = None;
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec2;
    use tether::{EntityId, Owner};

    use super::*;

    fn input(sequence: u32, y: f32) -> PlayerInput {
        PlayerInput {
            client_id: 1,
            timestamp_ms: 0,
            sequence,
            movement: Vec2::new(0.0, y),
        }
    }

    #[test]
    fn test_acknowledge_drops_confirmed() {
        let mut history = InputHistory::new();
        for seq in 1..=5 {
            history.record(input(seq, 1.0), 0.1);
        }

        history.acknowledge(3);
        assert_eq!(history.len(), 2);

        // older acks change nothing
        history.acknowledge(2);
        assert_eq!(history.len(), 2);
        assert_eq!(history.last_acked(), Some(3));
    }

    #[test]
    fn test_replay_after_snap() {
        let mut history = InputHistory::new();
        history.record(input(1, 1.0), 0.1);
        history.record(input(2, 1.0), 0.1);
        history.record(input(3, -1.0), 0.05);
        history.acknowledge(1);

        let mut paddle = Entity::paddle(EntityId(4), Owner(1), Vec2::new(0.0, 100.0));
        history.replay(&mut paddle, 100.0);

        // +10 for seq 2, -5 for seq 3
        assert!((paddle.position.y - 105.0).abs() < 1e-4);
        assert_eq!(paddle.velocity, Vec2::new(0.0, -100.0));
    }

    #[test]
    fn test_history_is_bounded() {
        let mut history = InputHistory::new();
        for seq in 0..(MAX_PENDING_INPUTS as u32 + 10) {
            history.record(input(seq, 0.0), 0.01);
        }
        assert_eq!(history.len(), MAX_PENDING_INPUTS);
    }
}
