use glam::Vec2;

use tether::world::Body;
use tether::{
    ActorKind, ActorSpawn, ActorUpdate, ArenaConfig, Blueprint, Entity, EntityId, Message,
    PlayerInput, PhysicsBackend, Simulation,
};

/// Respawn slots below this belong to balls, the rest to crates.
const CRATE_SLOT_BASE: u32 = 10;
const PADDLE_INSET: f32 = 48.0;

/// Places the neutral, respawnable props every match starts with.
pub fn populate_arena<P: PhysicsBackend>(simulation: &mut Simulation<P>, arena: &ArenaConfig) {
    let size = arena.size;
    let center = size * 0.5;

    let balls = [
        (center, Vec2::new(240.0, -180.0)),
        (center + Vec2::new(0.0, 80.0), Vec2::new(-240.0, 120.0)),
    ];
    for (slot, (position, velocity)) in balls.into_iter().enumerate() {
        let blueprint = Blueprint {
            spawn_velocity: velocity,
            ..blueprint(slot as u32, ActorKind::Ball, position)
        };
        simulation
            .registry_mut()
            .spawn_with(|id| Entity::from_blueprint(id, &blueprint));
    }

    let mut crates = Vec::new();
    for (min, max) in &arena.platforms {
        let top = min.y.min(max.y) - ActorKind::Crate.default_extents().y;
        crates.push(Vec2::new(min.x + (max.x - min.x) * 0.25, top));
        crates.push(Vec2::new(min.x + (max.x - min.x) * 0.75, top));
    }
    let floor = size.y - ActorKind::Crate.default_extents().y;
    crates.push(Vec2::new(size.x * 0.2, floor));
    crates.push(Vec2::new(size.x * 0.8, floor));

    for (index, position) in crates.into_iter().enumerate() {
        let blueprint = blueprint(CRATE_SLOT_BASE + index as u32, ActorKind::Crate, position);
        simulation
            .registry_mut()
            .spawn_with(|id| Entity::from_blueprint(id, &blueprint));
    }
}

fn blueprint(slot: u32, kind: ActorKind, spawn_position: Vec2) -> Blueprint {
    Blueprint {
        slot,
        kind,
        spawn_position,
        spawn_velocity: Vec2::ZERO,
        extents: kind.default_extents(),
        body: Body::for_kind(kind),
    }
}

/// Paddles alternate between the left and right edge.
pub fn paddle_spawn(arena: &ArenaConfig, index: usize) -> Vec2 {
    let x = if index % 2 == 0 {
        PADDLE_INSET
    } else {
        arena.size.x - PADDLE_INSET
    };
    Vec2::new(x, arena.size.y * 0.5)
}

/// Applies one input to the paddle it drives. Returns false for inputs
/// older than the newest one already applied.
pub fn apply_input(entity: &mut Entity, input: &PlayerInput, speed: f32) -> bool {
    if entity.net.is_stale(input.sequence) {
        return false;
    }

    entity.net.last_sequence = Some(input.sequence);
    entity.velocity = input.movement.clamp_length_max(1.0) * speed;
    true
}

pub fn spawn_message(entity: &Entity) -> Message {
    Message::ActorSpawned(ActorSpawn {
        entity: entity.id,
        kind: entity.kind,
        owner: entity.owner.0,
        position: entity.position,
        velocity: entity.velocity,
    })
}

/// Paddles carry the last input applied to them so the owner can replay
/// the rest. Everything else is stamped with the tick.
pub fn update_message(entity: &Entity, tick: u64) -> Message {
    let sequence = match entity.kind {
        ActorKind::Paddle => entity.net.last_sequence.unwrap_or(0),
        _ => tick as u32,
    };

    Message::ActorUpdate(ActorUpdate {
        entity: entity.id,
        position: entity.position,
        velocity: entity.velocity,
        sequence,
    })
}

pub fn destroyed_message(entity: EntityId, position: Vec2) -> Message {
    Message::EntityDestroyed { entity, position }
}
