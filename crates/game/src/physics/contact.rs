use glam::Vec2;

use crate::world::{EntityId, Registry};

/// What a hitbox touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollisionKind {
    Solid,
    Platform,
    Ball,
    Paddle,
    Crate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HitboxKind {
    Body,
    /// Thin sensor under a crate, used for ground detection.
    Foot,
}

/// One contact. `normal` points away from the other shape, so moving by
/// `normal * penetration` separates the two.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Manifold {
    pub other: Option<EntityId>,
    pub other_kind: CollisionKind,
    pub normal: Vec2,
    pub penetration: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hitbox {
    pub kind: HitboxKind,
    pub manifolds: Vec<Manifold>,
}

impl Hitbox {
    pub fn new(kind: HitboxKind) -> Self {
        Self {
            kind,
            manifolds: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhysicsEvent {
    BodyDestroyed(EntityId),
}

/// Collision detection collaborator. The simulation integrates motion
/// itself and only asks the backend for contacts and destruction notices.
pub trait PhysicsBackend {
    /// Recomputes contacts for every entity in `registry`.
    fn step(&mut self, registry: &Registry, dt: f32);

    /// Contacts found by the last `step`, grouped per hitbox.
    fn hitboxes(&self, id: EntityId) -> &[Hitbox];

    fn drain_events(&mut self) -> Vec<PhysicsEvent>;

    /// Drops any state kept for a removed entity.
    fn forget(&mut self, _id: EntityId) {}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    pub fn from_center(center: Vec2, half_extents: Vec2) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    pub fn contains(&self, other: &Aabb) -> bool {
        other.min.cmpge(self.min).all() && other.max.cmple(self.max).all()
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.cmplt(other.max).all() && other.min.cmplt(self.max).all()
    }

    /// Separation of `self` from `other` along the axis of least overlap.
    pub fn penetration(&self, other: &Aabb) -> Option<(Vec2, f32)> {
        let overlap = self.max.min(other.max) - self.min.max(other.min);
        if overlap.x <= 0.0 || overlap.y <= 0.0 {
            return None;
        }

        let delta = self.center() - other.center();
        if overlap.x < overlap.y {
            let sign = if delta.x < 0.0 { -1.0 } else { 1.0 };
            Some((Vec2::new(sign, 0.0), overlap.x))
        } else {
            let sign = if delta.y < 0.0 { -1.0 } else { 1.0 };
            Some((Vec2::new(0.0, sign), overlap.y))
        }
    }
}
