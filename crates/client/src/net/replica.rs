use glam::Vec2;
use log::{debug, trace};

use tether::world::CommandReport;
use tether::{
    ActorKind, ActorSpawn, ActorUpdate, CommandBus, Entity, EntityId, Message, Owner, PlayerInput,
    Registry, reconcile,
};

use super::prediction::InputHistory;

/// What a message did to the replicated world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReplicaEvent {
    Spawned(EntityId),
    LocalPaddle(EntityId),
    Destroyed { id: EntityId, position: Vec2 },
}

/// Client-side copy of the host's entities. Spawns and destroys apply as
/// they arrive; state updates go through the command bus and land on the
/// next `step`.
pub struct ClientWorld {
    registry: Registry,
    commands: CommandBus,
    history: InputHistory,
    client_id: Option<u32>,
    local_paddle: Option<EntityId>,
    paddle_speed: f32,
    frame: u64,
}

impl ClientWorld {
    pub fn new(paddle_speed: f32, command_capacity: usize) -> Self {
        Self {
            registry: Registry::new(),
            commands: CommandBus::new(command_capacity),
            history: InputHistory::new(),
            client_id: None,
            local_paddle: None,
            paddle_speed,
            frame: 0,
        }
    }

    pub fn set_client_id(&mut self, client_id: u32) {
        self.client_id = Some(client_id);
    }

    pub fn client_id(&self) -> Option<u32> {
        self.client_id
    }

    pub fn local_paddle(&self) -> Option<EntityId> {
        self.local_paddle
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn history(&self) -> &InputHistory {
        &self.history
    }

    pub fn apply(&mut self, message: Message) -> Option<ReplicaEvent> {
        match message {
            Message::ActorSpawned(spawn) => self.on_spawn(spawn),
            Message::ActorUpdate(update) => {
                self.commands.send_command(update.entity, move |entity, _| {
                    reconcile(entity, &update);
                });
                None
            }
            Message::EntityDestroyed { entity, position } => {
                let removed = self.registry.despawn(entity)?;
                if self.local_paddle == Some(removed.id) {
                    debug!("Local paddle {} destroyed", removed.id);
                    self.local_paddle = None;
                    self.history.clear();
                }
                Some(ReplicaEvent::Destroyed {
                    id: entity,
                    position,
                })
            }
            other => {
                trace!("Replica ignores {:?}", other.packet_id());
                None
            }
        }
    }

    fn on_spawn(&mut self, spawn: ActorSpawn) -> Option<ReplicaEvent> {
        // Late-join sync and the broadcast may both carry our own paddle.
        if self.registry.contains(spawn.entity) {
            trace!("Duplicate spawn for {}", spawn.entity);
            return None;
        }

        let mut entity = Entity::new(spawn.entity, spawn.kind, spawn.position);
        entity.velocity = spawn.velocity;
        entity.owner = Owner(spawn.owner);
        self.registry.insert(entity);

        let ours = spawn.kind == ActorKind::Paddle && Some(spawn.owner) == self.client_id;
        if ours {
            self.local_paddle = Some(spawn.entity);
            return Some(ReplicaEvent::LocalPaddle(spawn.entity));
        }
        Some(ReplicaEvent::Spawned(spawn.entity))
    }

    /// Steers the local paddle straight away and remembers the input for
    /// replay after the next authoritative snap.
    pub fn predict(&mut self, input: PlayerInput, duration: f32) {
        let Some(paddle) = self.local_paddle.and_then(|id| self.registry.get_mut(id)) else {
            return;
        };
        paddle.velocity = input.movement.clamp_length_max(1.0) * self.paddle_speed;
        self.history.record(input, duration);
    }

    /// Applies queued updates, replays unconfirmed input on a snapped local
    /// paddle, then moves everything along its velocity.
    pub fn step(&mut self, dt: f32) -> CommandReport {
        self.frame += 1;
        let report = self.commands.process(&mut self.registry, self.frame, dt);

        if let Some(paddle) = self.local_paddle.and_then(|id| self.registry.get_mut(id)) {
            if paddle.net.is_reconciling() {
                if let Some(acked) = paddle.net.last_sequence {
                    self.history.acknowledge(acked);
                }
                self.history.replay(paddle, self.paddle_speed);
            }
        }

        for entity in self.registry.iter_mut() {
            entity.position += entity.velocity * dt;
            entity.net.mark_predicted();
        }

        report
    }

    /// Queues an authoritative update as if it had come off the wire.
    pub fn queue_update(&mut self, update: ActorUpdate) {
        self.apply(Message::ActorUpdate(update));
    }

    pub fn clear(&mut self) {
        self.registry = Registry::new();
        self.commands.clear();
        self.history.clear();
        self.local_paddle = None;
    }
}
