use log::debug;

use crate::net::{ActorUpdate, sequence_greater_than};

use super::entity::Entity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconcileState {
    /// Driven by local simulation.
    #[default]
    Predicted,
    /// An authoritative update was applied and local simulation has not run since.
    Reconciling,
}

/// Per-entity networking metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetSync {
    pub last_sequence: Option<u32>,
    pub state: ReconcileState,
}

impl NetSync {
    /// Called once local simulation has advanced the entity.
    pub fn mark_predicted(&mut self) {
        self.state = ReconcileState::Predicted;
    }

    pub fn is_reconciling(&self) -> bool {
        self.state == ReconcileState::Reconciling
    }

    /// True if `sequence` is older than the newest update already applied.
    pub fn is_stale(&self, sequence: u32) -> bool {
        self.last_sequence
            .is_some_and(|last| sequence_greater_than(last, sequence))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Applied,
    Stale,
}

/// Overwrites predicted state with the authoritative one. No blending:
/// position and velocity snap to the update.
pub fn reconcile(entity: &mut Entity, update: &ActorUpdate) -> ReconcileOutcome {
    if entity.net.is_stale(update.sequence) {
        debug!(
            "ignoring stale update {} for {} (last {:?})",
            update.sequence, entity.id, entity.net.last_sequence
        );
        return ReconcileOutcome::Stale;
    }

    entity.position = update.position;
    entity.velocity = update.velocity;
    entity.net.last_sequence = Some(update.sequence);
    entity.net.state = ReconcileState::Reconciling;

    ReconcileOutcome::Applied
}

#[cfg(test)]
mod tests {
    use glam::Vec2;

    use super::*;
    use crate::world::{ActorKind, EntityId};

    fn update(sequence: u32, position: Vec2) -> ActorUpdate {
        ActorUpdate {
            entity: EntityId(1),
            position,
            velocity: Vec2::ZERO,
            sequence,
        }
    }

    #[test]
    fn snap_is_idempotent() {
        let mut once = Entity::new(EntityId(1), ActorKind::Ball, Vec2::new(3.0, 4.0));
        once.velocity = Vec2::new(7.0, 7.0);
        let mut twice = once.clone();

        let authoritative = update(5, Vec2::new(10.0, 20.0));

        assert_eq!(reconcile(&mut once, &authoritative), ReconcileOutcome::Applied);
        reconcile(&mut twice, &authoritative);
        reconcile(&mut twice, &authoritative);

        assert_eq!(once.position, Vec2::new(10.0, 20.0));
        assert_eq!(once.velocity, Vec2::ZERO);
        assert_eq!(once.position, twice.position);
        assert_eq!(once.velocity, twice.velocity);
        assert_eq!(once.net, twice.net);
        assert_eq!(twice.net.last_sequence, Some(5));
    }

    #[test]
    fn older_updates_are_dropped() {
        let mut entity = Entity::new(EntityId(1), ActorKind::Ball, Vec2::ZERO);

        reconcile(&mut entity, &update(8, Vec2::new(8.0, 0.0)));
        let outcome = reconcile(&mut entity, &update(6, Vec2::new(6.0, 0.0)));

        assert_eq!(outcome, ReconcileOutcome::Stale);
        assert_eq!(entity.position, Vec2::new(8.0, 0.0));
        assert_eq!(entity.net.last_sequence, Some(8));
    }

    #[test]
    fn sequence_wraparound_counts_as_newer() {
        let mut entity = Entity::new(EntityId(1), ActorKind::Ball, Vec2::ZERO);

        reconcile(&mut entity, &update(u32::MAX, Vec2::ZERO));
        let outcome = reconcile(&mut entity, &update(1, Vec2::ONE));

        assert_eq!(outcome, ReconcileOutcome::Applied);
        assert_eq!(entity.position, Vec2::ONE);
    }

    #[test]
    fn local_step_returns_to_predicted() {
        let mut entity = Entity::new(EntityId(1), ActorKind::Ball, Vec2::ZERO);

        reconcile(&mut entity, &update(1, Vec2::ONE));
        assert!(entity.net.is_reconciling());

        entity.net.mark_predicted();
        assert_eq!(entity.net.state, ReconcileState::Predicted);
    }
}
