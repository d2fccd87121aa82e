use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::entity::{ActorKind, Body};

/// Saved description of a respawnable entity. `slot` identifies the
/// placement the entity came from, so one placement never queues twice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blueprint {
    pub slot: u32,
    pub kind: ActorKind,
    pub spawn_position: Vec2,
    /// Launch velocity; zero for props that start at rest.
    pub spawn_velocity: Vec2,
    pub extents: Vec2,
    pub body: Body,
}

#[derive(Debug, Clone)]
pub struct RespawnEntry {
    pub remaining: f32,
    pub blueprint: Blueprint,
}

#[derive(Debug, Default)]
pub struct RespawnQueue {
    entries: Vec<RespawnEntry>,
}

impl RespawnQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the blueprint's slot is already waiting.
    pub fn push(&mut self, delay: f32, blueprint: Blueprint) -> bool {
        if self.is_pending(blueprint.slot) {
            return false;
        }

        self.entries.push(RespawnEntry {
            remaining: delay,
            blueprint,
        });
        true
    }

    /// Counts every entry down by `dt` and hands back the blueprints whose
    /// delay has run out, in the order they were queued.
    pub fn tick(&mut self, dt: f32) -> Vec<Blueprint> {
        let mut ready = Vec::new();
        self.entries.retain_mut(|entry| {
            entry.remaining -= dt;
            if entry.remaining > 0.0 {
                return true;
            }
            ready.push(entry.blueprint.clone());
            false
        });
        ready
    }

    pub fn is_pending(&self, slot: u32) -> bool {
        self.entries.iter().any(|e| e.blueprint.slot == slot)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blueprint(slot: u32) -> Blueprint {
        Blueprint {
            slot,
            kind: ActorKind::Crate,
            spawn_position: Vec2::new(slot as f32 * 10.0, 0.0),
            spawn_velocity: Vec2::ZERO,
            extents: Vec2::splat(16.0),
            body: Body::for_kind(ActorKind::Crate),
        }
    }

    #[test]
    fn respawns_once_when_delay_runs_out() {
        let mut queue = RespawnQueue::new();
        queue.push(5.0, blueprint(1));

        let mut fired_at = Vec::new();
        for tick in 1..=8 {
            let ready = queue.tick(1.0);
            if !ready.is_empty() {
                assert_eq!(ready.len(), 1);
                assert_eq!(ready[0].slot, 1);
                fired_at.push(tick);
            }
        }

        assert_eq!(fired_at, vec![5]);
        assert!(!queue.is_pending(1));
        assert!(queue.is_empty());
    }

    #[test]
    fn one_entry_per_slot() {
        let mut queue = RespawnQueue::new();

        assert!(queue.push(5.0, blueprint(1)));
        assert!(!queue.push(2.0, blueprint(1)));
        assert!(queue.push(2.0, blueprint(2)));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn several_entries_expire_in_one_tick() {
        let mut queue = RespawnQueue::new();
        queue.push(1.0, blueprint(1));
        queue.push(3.0, blueprint(2));
        queue.push(0.5, blueprint(3));
        queue.push(1.0, blueprint(4));

        let ready: Vec<u32> = queue.tick(1.0).into_iter().map(|b| b.slot).collect();

        assert_eq!(ready, vec![1, 3, 4]);
        assert_eq!(queue.len(), 1);
        assert!(queue.is_pending(2));
    }
}
