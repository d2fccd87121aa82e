use std::fmt;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::reconcile::NetSync;
use super::respawn::Blueprint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl EntityId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Client that last claimed an entity. Neutral entities belong to nobody.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Owner(pub u32);

impl Owner {
    pub const NEUTRAL: Owner = Owner(u32::MAX);

    pub fn is_neutral(self) -> bool {
        self == Self::NEUTRAL
    }
}

impl Default for Owner {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ActorKind {
    Ball = 0,
    Paddle = 1,
    Crate = 2,
}

impl ActorKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Ball),
            1 => Some(Self::Paddle),
            2 => Some(Self::Crate),
            _ => None,
        }
    }

    /// Half extents of the default bounding box.
    pub fn default_extents(self) -> Vec2 {
        match self {
            Self::Ball => Vec2::splat(10.0),
            Self::Paddle => Vec2::new(10.0, 50.0),
            Self::Crate => Vec2::splat(16.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrateMotion {
    Ground,
    Falling,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrateState {
    pub motion: CrateMotion,
    pub ground_contact: bool,
    pub lethal: bool,
}

impl Default for CrateState {
    fn default() -> Self {
        Self {
            motion: CrateMotion::Falling,
            ground_contact: false,
            lethal: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Body {
    Ball,
    Paddle,
    Crate(CrateState),
}

impl Body {
    pub fn for_kind(kind: ActorKind) -> Self {
        match kind {
            ActorKind::Ball => Self::Ball,
            ActorKind::Paddle => Self::Paddle,
            ActorKind::Crate => Self::Crate(CrateState::default()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub id: EntityId,
    pub kind: ActorKind,
    pub position: Vec2,
    pub velocity: Vec2,
    pub extents: Vec2,
    pub owner: Owner,
    pub net: NetSync,
    pub body: Body,
    pub respawn: Option<Blueprint>,
    destroyed: bool,
}

impl Entity {
    pub fn new(id: EntityId, kind: ActorKind, position: Vec2) -> Self {
        Self {
            id,
            kind,
            position,
            velocity: Vec2::ZERO,
            extents: kind.default_extents(),
            owner: Owner::NEUTRAL,
            net: NetSync::default(),
            body: Body::for_kind(kind),
            respawn: None,
            destroyed: false,
        }
    }

    pub fn ball(id: EntityId, position: Vec2, velocity: Vec2) -> Self {
        Self {
            velocity,
            ..Self::new(id, ActorKind::Ball, position)
        }
    }

    pub fn paddle(id: EntityId, owner: Owner, position: Vec2) -> Self {
        Self {
            owner,
            ..Self::new(id, ActorKind::Paddle, position)
        }
    }

    /// Builds a fresh entity from a saved blueprint. Ownership and
    /// lethality start from scratch.
    pub fn from_blueprint(id: EntityId, blueprint: &Blueprint) -> Self {
        let mut body = blueprint.body.clone();
        if let Body::Crate(state) = &mut body {
            state.lethal = false;
        }

        Self {
            velocity: blueprint.spawn_velocity,
            extents: blueprint.extents,
            body,
            respawn: Some(blueprint.clone()),
            ..Self::new(id, blueprint.kind, blueprint.spawn_position)
        }
    }

    pub fn crate_state(&self) -> Option<&CrateState> {
        match &self.body {
            Body::Crate(state) => Some(state),
            _ => None,
        }
    }

    pub fn crate_state_mut(&mut self) -> Option<&mut CrateState> {
        match &mut self.body {
            Body::Crate(state) => Some(state),
            _ => None,
        }
    }

    pub fn mark_destroyed(&mut self) {
        self.destroyed = true;
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn min(&self) -> Vec2 {
        self.position - self.extents
    }

    pub fn max(&self) -> Vec2 {
        self.position + self.extents
    }
}
