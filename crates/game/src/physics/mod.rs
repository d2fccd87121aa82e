mod arena;
mod contact;

pub use arena::{ArenaConfig, ArenaPhysics};
pub use contact::{
    Aabb, CollisionKind, Hitbox, HitboxKind, Manifold, PhysicsBackend, PhysicsEvent,
};
