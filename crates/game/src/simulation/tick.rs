use std::collections::HashMap;

use glam::Vec2;
use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::physics::{PhysicsBackend, PhysicsEvent};
use crate::world::{
    ActorKind, Body, CommandBus, CommandReport, CommandSender, Entity, EntityId, Owner, Registry,
    RespawnQueue,
};

use super::props::{self, PropOutcome};
use super::timestep::FixedTimestep;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub tick_rate: u16,
    /// Seconds between a respawnable entity's destruction and its return.
    pub respawn_delay: f32,
    pub paddle_speed: f32,
    pub gravity: f32,
    pub command_capacity: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            respawn_delay: 5.0,
            paddle_speed: 400.0,
            gravity: 2200.0,
            command_capacity: 1024,
        }
    }
}

/// Something the host must tell clients about after a tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickEvent {
    Spawned(EntityId),
    Destroyed {
        id: EntityId,
        kind: ActorKind,
        position: Vec2,
    },
}

/// Owns the authoritative world and advances it one fixed tick at a time:
/// commands, motion and contacts, prop behaviour, destruction, respawns.
pub struct Simulation<P> {
    registry: Registry,
    commands: CommandBus,
    respawns: RespawnQueue,
    physics: P,
    timestep: FixedTimestep,
    config: SimulationConfig,
    tick: u64,
    last_report: CommandReport,
}

impl<P: PhysicsBackend> Simulation<P> {
    pub fn new(config: SimulationConfig, physics: P) -> Self {
        Self {
            registry: Registry::new(),
            commands: CommandBus::new(config.command_capacity),
            respawns: RespawnQueue::new(),
            physics,
            timestep: FixedTimestep::new(config.tick_rate),
            config,
            tick: 0,
            last_report: CommandReport::default(),
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn commands(&mut self) -> &mut CommandBus {
        &mut self.commands
    }

    pub fn command_sender(&self) -> CommandSender {
        self.commands.sender()
    }

    /// Queues `action` for the next command phase.
    pub fn send_command<F>(&mut self, target: EntityId, action: F)
    where
        F: FnOnce(&mut Entity, f32) + Send + 'static,
    {
        self.commands.send_command(target, action);
    }

    pub fn respawns(&self) -> &RespawnQueue {
        &self.respawns
    }

    pub fn physics(&self) -> &P {
        &self.physics
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn dt(&self) -> f32 {
        self.timestep.dt()
    }

    pub fn last_report(&self) -> CommandReport {
        self.last_report
    }

    pub fn interpolation_alpha(&self) -> f32 {
        self.timestep.alpha()
    }

    /// Feeds a frame delta and runs however many ticks fall due.
    pub fn update(&mut self, delta: f32) -> Vec<TickEvent> {
        self.timestep.accumulate(delta);

        let mut events = Vec::new();
        while self.timestep.consume_tick() {
            events.extend(self.step());
        }
        events
    }

    /// Runs exactly one tick.
    pub fn step(&mut self) -> Vec<TickEvent> {
        let dt = self.timestep.dt();
        self.tick += 1;
        let mut events = Vec::new();

        self.last_report = self.commands.process(&mut self.registry, self.tick, dt);
        if self.last_report.dropped > 0 {
            trace!(
                "tick {}: {} commands dropped",
                self.tick, self.last_report.dropped
            );
        }

        for entity in self.registry.iter_mut() {
            if matches!(entity.body, Body::Ball | Body::Paddle) {
                entity.position += entity.velocity * dt;
            }
        }
        self.physics.step(&self.registry, dt);

        let paddles: HashMap<EntityId, Owner> = self
            .registry
            .iter()
            .filter(|e| e.kind == ActorKind::Paddle)
            .map(|e| (e.id, e.owner))
            .collect();

        for id in self.registry.ids() {
            let Some(entity) = self.registry.get_mut(id) else {
                continue;
            };
            let hitboxes = self.physics.hitboxes(id);
            match entity.body {
                Body::Crate(_) => {
                    let outcome =
                        props::update_crate(entity, hitboxes, &paddles, self.config.gravity, dt);
                    if outcome == PropOutcome::Destroyed {
                        entity.mark_destroyed();
                    }
                }
                Body::Ball => props::bounce_ball(entity, hitboxes),
                Body::Paddle => props::resolve_paddle(entity, hitboxes),
            }
        }

        for event in self.physics.drain_events() {
            let PhysicsEvent::BodyDestroyed(id) = event;
            if let Some(entity) = self.registry.get_mut(id) {
                entity.mark_destroyed();
            }
        }

        let mut captured = Vec::new();
        for entity in self.registry.sweep_destroyed() {
            self.physics.forget(entity.id);
            debug!("{} destroyed at {:?}", entity.id, entity.position);
            events.push(TickEvent::Destroyed {
                id: entity.id,
                kind: entity.kind,
                position: entity.position,
            });
            captured.extend(entity.respawn);
        }

        // Entries captured this tick start counting down on the next one.
        let ready = self.respawns.tick(dt);
        for blueprint in captured {
            if !self.respawns.push(self.config.respawn_delay, blueprint) {
                trace!("respawn slot already pending");
            }
        }

        for blueprint in ready {
            let id = self
                .registry
                .spawn_with(|id| Entity::from_blueprint(id, &blueprint));
            debug!("{} respawned from slot {}", id, blueprint.slot);
            events.push(TickEvent::Spawned(id));
        }

        events
    }

    /// Removes an entity outside the tick, e.g. when its owner leaves.
    pub fn despawn(&mut self, id: EntityId) -> Option<Entity> {
        let entity = self.registry.despawn(id)?;
        self.physics.forget(id);
        Some(entity)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::physics::Hitbox;
    use crate::world::{Blueprint, CrateMotion, CrateState};

    /// Backend with no contacts that reports whatever the test tells it to.
    #[derive(Default)]
    struct ScriptedPhysics {
        pending: Vec<PhysicsEvent>,
        forgotten: Vec<EntityId>,
    }

    impl PhysicsBackend for ScriptedPhysics {
        fn step(&mut self, _registry: &Registry, _dt: f32) {}

        fn hitboxes(&self, _id: EntityId) -> &[Hitbox] {
            &[]
        }

        fn drain_events(&mut self) -> Vec<PhysicsEvent> {
            std::mem::take(&mut self.pending)
        }

        fn forget(&mut self, id: EntityId) {
            self.forgotten.push(id);
        }
    }

    fn simulation() -> Simulation<ScriptedPhysics> {
        Simulation::new(
            SimulationConfig {
                tick_rate: 1,
                ..SimulationConfig::default()
            },
            ScriptedPhysics::default(),
        )
    }

    fn resting_crate(slot: u32) -> Blueprint {
        Blueprint {
            slot,
            kind: ActorKind::Crate,
            spawn_position: Vec2::new(10.0, 10.0),
            spawn_velocity: Vec2::ZERO,
            extents: Vec2::splat(16.0),
            body: Body::Crate(CrateState {
                motion: CrateMotion::Ground,
                ground_contact: true,
                lethal: false,
            }),
        }
    }

    #[test]
    fn commands_run_in_the_next_tick() {
        let mut sim = simulation();
        let ball = sim
            .registry_mut()
            .spawn_with(|id| Entity::ball(id, Vec2::ZERO, Vec2::ZERO));

        sim.send_command(ball, |entity, _| entity.velocity = Vec2::new(3.0, 0.0));
        assert_eq!(sim.registry().get(ball).unwrap().velocity, Vec2::ZERO);

        sim.step();
        let entity = sim.registry().get(ball).unwrap();
        assert_eq!(entity.velocity, Vec2::new(3.0, 0.0));
        assert_eq!(entity.position, Vec2::new(3.0, 0.0));
        assert_eq!(sim.last_report().applied, 1);
    }

    #[test]
    fn command_for_entity_destroyed_earlier_is_dropped() {
        let mut sim = simulation();
        let ball = sim
            .registry_mut()
            .spawn_with(|id| Entity::ball(id, Vec2::ZERO, Vec2::ZERO));
        let other = sim
            .registry_mut()
            .spawn_with(|id| Entity::ball(id, Vec2::ONE, Vec2::ZERO));

        sim.physics.pending.push(PhysicsEvent::BodyDestroyed(ball));
        let events = sim.step();
        assert!(matches!(events[0], TickEvent::Destroyed { id, .. } if id == ball));

        let touched = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&touched);
        sim.send_command(ball, move |_, _| *flag.lock().unwrap() = true);
        sim.step();

        assert!(!*touched.lock().unwrap());
        assert_eq!(sim.last_report().dropped, 1);
        assert_eq!(sim.registry().ids(), vec![other]);
        assert_eq!(sim.physics.forgotten, vec![ball]);
    }

    #[test]
    fn destroyed_crate_respawns_after_delay_with_fresh_id() {
        let mut sim = simulation();
        let blueprint = resting_crate(4);
        let first = sim
            .registry_mut()
            .spawn_with(|id| Entity::from_blueprint(id, &blueprint));

        sim.physics.pending.push(PhysicsEvent::BodyDestroyed(first));
        sim.step();
        assert!(sim.respawns().is_pending(4));

        let mut spawned = Vec::new();
        for tick in 1..=8 {
            for event in sim.step() {
                if let TickEvent::Spawned(id) = event {
                    spawned.push((tick, id));
                }
            }
        }

        assert_eq!(spawned.len(), 1);
        let (tick, id) = spawned[0];
        assert_eq!(tick, 5);
        assert_ne!(id, first);
        let entity = sim.registry().get(id).unwrap();
        assert!(entity.owner.is_neutral());
        assert_eq!(entity.position, Vec2::new(10.0, 10.0));
    }

    #[test]
    fn repeated_destroy_and_respawn_keeps_world_bounded() {
        let mut sim = Simulation::new(
            SimulationConfig {
                tick_rate: 1,
                respawn_delay: 0.5,
                ..SimulationConfig::default()
            },
            ScriptedPhysics::default(),
        );
        let blueprint = resting_crate(0);
        let mut current = sim
            .registry_mut()
            .spawn_with(|id| Entity::from_blueprint(id, &blueprint));

        let mut destroyed = 0;
        let mut spawned = 0;
        for _ in 0..2000 {
            if sim.registry().contains(current) {
                sim.physics.pending.push(PhysicsEvent::BodyDestroyed(current));
            }
            for event in sim.step() {
                match event {
                    TickEvent::Destroyed { .. } => destroyed += 1,
                    TickEvent::Spawned(id) => {
                        current = id;
                        spawned += 1;
                    }
                }
            }
            assert!(sim.registry().len() <= 1);
            assert!(sim.respawns().len() <= 1);
        }

        assert_eq!(destroyed, 1000);
        assert_eq!(spawned, 1000);
        assert!(sim.respawns().len() <= 1);
    }

    #[test]
    fn entities_without_blueprint_do_not_respawn() {
        let mut sim = simulation();
        let ball = sim
            .registry_mut()
            .spawn_with(|id| Entity::ball(id, Vec2::ZERO, Vec2::ZERO));

        sim.physics.pending.push(PhysicsEvent::BodyDestroyed(ball));
        sim.step();

        assert!(sim.respawns().is_empty());
        assert!(sim.registry().is_empty());
    }

    #[test]
    fn update_runs_whole_ticks() {
        let mut sim = Simulation::new(SimulationConfig::default(), ScriptedPhysics::default());
        sim.update(1.0 / 30.0);
        assert_eq!(sim.tick(), 2);
    }
}
