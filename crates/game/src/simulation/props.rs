use std::collections::HashMap;

use glam::Vec2;

use crate::physics::{CollisionKind, Hitbox, HitboxKind};
use crate::world::{CrateMotion, Entity, EntityId, Owner};

/// Below this squared speed a crate stops dead.
pub const MIN_VELOCITY_SQ: f32 = 25.0;
/// Above this squared speed a crate kills what it hits.
pub const LETHAL_VELOCITY_SQ: f32 = 100_000.0;
pub const PUSH_ACCELERATION: f32 = 10.0;
pub const GROUND_FRICTION: f32 = 0.89;
/// Horizontal speed kept when a crate slides off an edge.
pub const EDGE_DRAG: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropOutcome {
    Alive,
    Destroyed,
}

/// One tick of crate behaviour: friction or gravity depending on the
/// motion state, contact response, integration and the lethal flag.
pub fn update_crate(
    entity: &mut Entity,
    hitboxes: &[Hitbox],
    paddles: &HashMap<EntityId, Owner>,
    gravity: f32,
    dt: f32,
) -> PropOutcome {
    let Some(motion) = entity.crate_state().map(|c| c.motion) else {
        return PropOutcome::Alive;
    };

    let outcome = match motion {
        CrateMotion::Ground => {
            entity.velocity *= GROUND_FRICTION;
            ground_collision(entity, hitboxes, paddles)
        }
        CrateMotion::Falling => {
            entity.velocity.y += gravity * dt;
            air_collision(entity, hitboxes)
        }
    };
    if outcome == PropOutcome::Destroyed {
        return outcome;
    }

    entity.position += entity.velocity * dt;

    let speed_sq = entity.velocity.length_squared();
    if speed_sq < MIN_VELOCITY_SQ {
        entity.velocity = Vec2::ZERO;
    }
    if let Some(state) = entity.crate_state_mut() {
        state.lethal = speed_sq > LETHAL_VELOCITY_SQ;
    }

    PropOutcome::Alive
}

fn ground_collision(
    entity: &mut Entity,
    hitboxes: &[Hitbox],
    paddles: &HashMap<EntityId, Owner>,
) -> PropOutcome {
    let half_width = entity.extents.x;
    let lethal = entity.crate_state().is_some_and(|c| c.lethal);

    for hitbox in hitboxes {
        match hitbox.kind {
            HitboxKind::Body => {
                for manifold in &hitbox.manifolds {
                    let push = manifold.normal * manifold.penetration;
                    match manifold.other_kind {
                        CollisionKind::Solid | CollisionKind::Platform | CollisionKind::Crate => {
                            entity.position += push;
                            if manifold.normal.x != 0.0 {
                                entity.velocity.x = -entity.velocity.x;
                            }
                        }
                        CollisionKind::Paddle if manifold.normal.x != 0.0 => {
                            entity.position += push;
                            entity.velocity += push * PUSH_ACCELERATION;
                            // A slow crate changes hands; a lethal one keeps its owner.
                            if !lethal {
                                if let Some(owner) = manifold.other.and_then(|id| paddles.get(&id)) {
                                    entity.owner = *owner;
                                }
                            }
                        }
                        _ => {}
                    }

                    if manifold.penetration > half_width {
                        return PropOutcome::Destroyed;
                    }
                }
            }
            HitboxKind::Foot => {
                if hitbox.manifolds.is_empty() {
                    if let Some(state) = entity.crate_state_mut() {
                        state.ground_contact = false;
                        state.motion = CrateMotion::Falling;
                    }
                    entity.velocity.x *= EDGE_DRAG;
                    return PropOutcome::Alive;
                }
            }
        }
    }

    PropOutcome::Alive
}

fn air_collision(entity: &mut Entity, hitboxes: &[Hitbox]) -> PropOutcome {
    for hitbox in hitboxes {
        match hitbox.kind {
            HitboxKind::Body => {
                for manifold in &hitbox.manifolds {
                    match manifold.other_kind {
                        CollisionKind::Paddle => {
                            // Landing on a paddle crushes the crate.
                            let falling_onto = entity.velocity.y > (entity.velocity.x * 2.0).abs()
                                && manifold.normal.y < 0.0;
                            return if falling_onto {
                                PropOutcome::Destroyed
                            } else {
                                PropOutcome::Alive
                            };
                        }
                        CollisionKind::Ball => {}
                        _ => {
                            entity.position += manifold.normal * manifold.penetration;
                            let grounded = entity.crate_state().is_some_and(|c| c.ground_contact);
                            if manifold.normal.y < 1.0 && grounded {
                                if let Some(state) = entity.crate_state_mut() {
                                    state.motion = CrateMotion::Ground;
                                }
                                entity.velocity.y = 0.0;
                                return PropOutcome::Alive;
                            }
                        }
                    }
                }
            }
            HitboxKind::Foot => {
                let touching = !hitbox.manifolds.is_empty();
                if let Some(state) = entity.crate_state_mut() {
                    state.ground_contact = touching;
                }
            }
        }
    }

    PropOutcome::Alive
}

/// Reflects a ball off whatever it touches.
pub fn bounce_ball(entity: &mut Entity, hitboxes: &[Hitbox]) {
    for manifold in hitboxes.iter().flat_map(|h| &h.manifolds) {
        if manifold.other_kind == CollisionKind::Ball {
            continue;
        }
        entity.position += manifold.normal * manifold.penetration;
        if manifold.normal.x != 0.0 {
            entity.velocity.x = entity.velocity.x.abs() * manifold.normal.x.signum();
        }
        if manifold.normal.y != 0.0 {
            entity.velocity.y = entity.velocity.y.abs() * manifold.normal.y.signum();
        }
    }
}

/// Keeps a paddle out of walls and platforms.
pub fn resolve_paddle(entity: &mut Entity, hitboxes: &[Hitbox]) {
    for manifold in hitboxes.iter().flat_map(|h| &h.manifolds) {
        if matches!(
            manifold.other_kind,
            CollisionKind::Solid | CollisionKind::Platform
        ) {
            entity.position += manifold.normal * manifold.penetration;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::Manifold;
    use crate::world::{ActorKind, CrateState};

    fn crate_entity(motion: CrateMotion) -> Entity {
        let mut entity = Entity::new(EntityId(1), ActorKind::Crate, Vec2::new(100.0, 100.0));
        entity.body = crate::world::Body::Crate(CrateState {
            motion,
            ground_contact: motion == CrateMotion::Ground,
            lethal: false,
        });
        entity
    }

    fn floor_contact(penetration: f32) -> Manifold {
        Manifold {
            other: None,
            other_kind: CollisionKind::Solid,
            normal: Vec2::new(0.0, -1.0),
            penetration,
        }
    }

    fn hitboxes(body: Vec<Manifold>, foot: Vec<Manifold>) -> Vec<Hitbox> {
        vec![
            Hitbox {
                kind: HitboxKind::Body,
                manifolds: body,
            },
            Hitbox {
                kind: HitboxKind::Foot,
                manifolds: foot,
            },
        ]
    }

    #[test]
    fn falling_crate_lands_when_foot_touches() {
        let mut entity = crate_entity(CrateMotion::Falling);
        entity.velocity = Vec2::new(0.0, 300.0);
        if let Some(state) = entity.crate_state_mut() {
            state.ground_contact = true;
        }

        let contacts = hitboxes(vec![floor_contact(3.0)], vec![floor_contact(1.0)]);
        let outcome = update_crate(&mut entity, &contacts, &HashMap::new(), 2200.0, 1.0 / 60.0);

        assert_eq!(outcome, PropOutcome::Alive);
        assert_eq!(entity.crate_state().unwrap().motion, CrateMotion::Ground);
        assert_eq!(entity.velocity.y, 0.0);
        assert_eq!(entity.position.y, 97.0);
    }

    #[test]
    fn crate_without_foot_contact_starts_falling() {
        let mut entity = crate_entity(CrateMotion::Ground);
        entity.velocity = Vec2::new(100.0, 0.0);

        update_crate(&mut entity, &hitboxes(vec![], vec![]), &HashMap::new(), 2200.0, 0.1);

        let state = entity.crate_state().unwrap();
        assert_eq!(state.motion, CrateMotion::Falling);
        assert!(!state.ground_contact);
        assert!((entity.velocity.x - 100.0 * GROUND_FRICTION * EDGE_DRAG).abs() < 1e-3);
    }

    #[test]
    fn paddle_push_claims_slow_crate() {
        let mut entity = crate_entity(CrateMotion::Ground);
        let paddle = EntityId(7);
        let paddles = HashMap::from([(paddle, Owner(3))]);
        let push = Manifold {
            other: Some(paddle),
            other_kind: CollisionKind::Paddle,
            normal: Vec2::X,
            penetration: 2.0,
        };

        update_crate(
            &mut entity,
            &hitboxes(vec![push], vec![floor_contact(1.0)]),
            &paddles,
            2200.0,
            1.0 / 60.0,
        );

        assert_eq!(entity.owner, Owner(3));
        assert!(entity.velocity.x > 0.0);
    }

    #[test]
    fn deep_penetration_destroys_crate() {
        let mut entity = crate_entity(CrateMotion::Ground);
        let crush = Manifold {
            penetration: entity.extents.x + 1.0,
            ..floor_contact(0.0)
        };

        let outcome = update_crate(
            &mut entity,
            &hitboxes(vec![crush], vec![floor_contact(1.0)]),
            &HashMap::new(),
            2200.0,
            1.0 / 60.0,
        );
        assert_eq!(outcome, PropOutcome::Destroyed);
    }

    #[test]
    fn fast_crate_becomes_lethal_and_slow_crate_stops() {
        let mut fast = crate_entity(CrateMotion::Ground);
        fast.velocity = Vec2::new(500.0, 0.0);
        update_crate(&mut fast, &hitboxes(vec![], vec![floor_contact(1.0)]), &HashMap::new(), 0.0, 0.01);
        assert!(fast.crate_state().unwrap().lethal);

        let mut slow = crate_entity(CrateMotion::Ground);
        slow.velocity = Vec2::new(4.0, 0.0);
        update_crate(&mut slow, &hitboxes(vec![], vec![floor_contact(1.0)]), &HashMap::new(), 0.0, 0.01);
        assert_eq!(slow.velocity, Vec2::ZERO);
        assert!(!slow.crate_state().unwrap().lethal);
    }

    #[test]
    fn ball_reflects_off_paddle() {
        let mut ball = Entity::ball(EntityId(2), Vec2::new(50.0, 50.0), Vec2::new(-200.0, 10.0));
        let contact = Hitbox {
            kind: HitboxKind::Body,
            manifolds: vec![Manifold {
                other: Some(EntityId(9)),
                other_kind: CollisionKind::Paddle,
                normal: Vec2::X,
                penetration: 4.0,
            }],
        };

        bounce_ball(&mut ball, &[contact]);

        assert_eq!(ball.velocity, Vec2::new(200.0, 10.0));
        assert_eq!(ball.position, Vec2::new(54.0, 50.0));
    }
}
