use std::collections::{HashMap, HashSet};

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::world::{ActorKind, Entity, EntityId, Registry};

use super::contact::{Aabb, CollisionKind, Hitbox, HitboxKind, Manifold, PhysicsBackend, PhysicsEvent};

const FOOT_HEIGHT: f32 = 2.0;
const FOOT_INSET: f32 = 2.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArenaConfig {
    pub size: Vec2,
    pub wall_thickness: f32,
    /// Bodies this far outside the arena are reported destroyed.
    pub kill_margin: f32,
    pub platforms: Vec<(Vec2, Vec2)>,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            size: Vec2::new(960.0, 540.0),
            wall_thickness: 16.0,
            kill_margin: 64.0,
            platforms: vec![
                (Vec2::new(320.0, 380.0), Vec2::new(640.0, 392.0)),
            ],
        }
    }
}

/// Axis-aligned arena: solid ceiling and floor, open left and right sides,
/// optional one-way-agnostic platforms. Coordinates are y-down.
pub struct ArenaPhysics {
    bounds: Aabb,
    solids: Vec<(Aabb, CollisionKind)>,
    contacts: HashMap<EntityId, Vec<Hitbox>>,
    condemned: HashSet<EntityId>,
    events: Vec<PhysicsEvent>,
}

impl Default for ArenaPhysics {
    fn default() -> Self {
        Self::new(&ArenaConfig::default())
    }
}

impl ArenaPhysics {
    pub fn new(config: &ArenaConfig) -> Self {
        let size = config.size;
        let wall = config.wall_thickness;

        let mut solids = vec![
            (
                Aabb::new(Vec2::new(0.0, -wall), Vec2::new(size.x, 0.0)),
                CollisionKind::Solid,
            ),
            (
                Aabb::new(Vec2::new(0.0, size.y), Vec2::new(size.x, size.y + wall)),
                CollisionKind::Solid,
            ),
        ];
        solids.extend(
            config
                .platforms
                .iter()
                .map(|&(min, max)| (Aabb::new(min, max), CollisionKind::Platform)),
        );

        let margin = Vec2::splat(config.kill_margin);
        Self {
            bounds: Aabb::new(-margin, size + margin),
            solids,
            contacts: HashMap::new(),
            condemned: HashSet::new(),
            events: Vec::new(),
        }
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    fn kind_of(entity: &Entity) -> CollisionKind {
        match entity.kind {
            ActorKind::Ball => CollisionKind::Ball,
            ActorKind::Paddle => CollisionKind::Paddle,
            ActorKind::Crate => CollisionKind::Crate,
        }
    }

    fn foot_of(body: &Aabb) -> Aabb {
        Aabb::new(
            Vec2::new(body.min.x + FOOT_INSET, body.max.y),
            Vec2::new(body.max.x - FOOT_INSET, body.max.y + FOOT_HEIGHT),
        )
    }

    fn collide(&self, shape: &Aabb, own: EntityId, bodies: &[(EntityId, CollisionKind, Aabb)]) -> Vec<Manifold> {
        let statics = self.solids.iter().filter_map(|(solid, kind)| {
            shape.penetration(solid).map(|(normal, penetration)| Manifold {
                other: None,
                other_kind: *kind,
                normal,
                penetration,
            })
        });

        let dynamics = bodies
            .iter()
            .filter(|(id, _, _)| *id != own)
            .filter_map(|(id, kind, aabb)| {
                shape.penetration(aabb).map(|(normal, penetration)| Manifold {
                    other: Some(*id),
                    other_kind: *kind,
                    normal,
                    penetration,
                })
            });

        statics.chain(dynamics).collect()
    }
}

impl PhysicsBackend for ArenaPhysics {
    fn step(&mut self, registry: &Registry, _dt: f32) {
        self.contacts.clear();

        let mut bodies: Vec<(EntityId, CollisionKind, Aabb)> = registry
            .iter()
            .filter(|e| !e.is_destroyed())
            .map(|e| (e.id, Self::kind_of(e), Aabb::from_center(e.position, e.extents)))
            .collect();
        bodies.sort_by_key(|(id, _, _)| *id);

        for (id, kind, aabb) in &bodies {
            if !self.bounds.intersects(aabb) {
                if self.condemned.insert(*id) {
                    self.events.push(PhysicsEvent::BodyDestroyed(*id));
                }
                continue;
            }

            let mut hitboxes = vec![Hitbox {
                kind: HitboxKind::Body,
                manifolds: self.collide(aabb, *id, &bodies),
            }];

            if *kind == CollisionKind::Crate {
                let foot = Self::foot_of(aabb);
                let manifolds = self
                    .collide(&foot, *id, &bodies)
                    .into_iter()
                    .filter(|m| {
                        !matches!(m.other_kind, CollisionKind::Ball | CollisionKind::Paddle)
                    })
                    .collect();
                hitboxes.push(Hitbox {
                    kind: HitboxKind::Foot,
                    manifolds,
                });
            }

            self.contacts.insert(*id, hitboxes);
        }
    }

    fn hitboxes(&self, id: EntityId) -> &[Hitbox] {
        self.contacts.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    fn drain_events(&mut self) -> Vec<PhysicsEvent> {
        std::mem::take(&mut self.events)
    }

    fn forget(&mut self, id: EntityId) {
        self.contacts.remove(&id);
        self.condemned.remove(&id);
    }
}
