use log::trace;
use tokio::sync::mpsc::{self, error::TrySendError};

use super::entity::{Entity, EntityId};
use super::registry::Registry;

pub type CommandAction = Box<dyn FnOnce(&mut Entity, f32) + Send + 'static>;

/// A deferred mutation aimed at one entity.
pub struct Command {
    pub target: EntityId,
    /// Earliest tick the command may run on. `None` means the next command phase.
    pub due_tick: Option<u64>,
    action: CommandAction,
}

impl Command {
    pub fn new<F>(target: EntityId, action: F) -> Self
    where
        F: FnOnce(&mut Entity, f32) + Send + 'static,
    {
        Self {
            target,
            due_tick: None,
            action: Box::new(action),
        }
    }

    pub fn at<F>(target: EntityId, tick: u64, action: F) -> Self
    where
        F: FnOnce(&mut Entity, f32) + Send + 'static,
    {
        Self {
            target,
            due_tick: Some(tick),
            action: Box::new(action),
        }
    }

    fn is_due(&self, tick: u64) -> bool {
        self.due_tick.is_none_or(|due| due <= tick)
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("target", &self.target)
            .field("due_tick", &self.due_tick)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("command queue is full")]
    Full,
    #[error("command bus has been dropped")]
    BusClosed,
}

/// Cross-thread producer side of a `CommandBus`.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::Sender<Command>,
}

impl CommandSender {
    pub fn send(&self, command: Command) -> Result<(), CommandError> {
        self.tx.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => CommandError::Full,
            TrySendError::Closed(_) => CommandError::BusClosed,
        })
    }

    pub fn send_command<F>(&self, target: EntityId, action: F) -> Result<(), CommandError>
    where
        F: FnOnce(&mut Entity, f32) + Send + 'static,
    {
        self.send(Command::new(target, action))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandReport {
    pub applied: usize,
    pub dropped: usize,
    pub deferred: usize,
}

pub struct CommandBus {
    queued: Vec<Command>,
    tx: mpsc::Sender<Command>,
    rx: mpsc::Receiver<Command>,
    dropped_total: u64,
}

impl CommandBus {
    pub fn new(channel_capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(channel_capacity.max(1));
        Self {
            queued: Vec::new(),
            tx,
            rx,
            dropped_total: 0,
        }
    }

    pub fn sender(&self) -> CommandSender {
        CommandSender {
            tx: self.tx.clone(),
        }
    }

    /// Queues `action` for the next command phase. Never runs it immediately.
    pub fn send_command<F>(&mut self, target: EntityId, action: F)
    where
        F: FnOnce(&mut Entity, f32) + Send + 'static,
    {
        self.queued.push(Command::new(target, action));
    }

    pub fn push(&mut self, command: Command) {
        self.queued.push(command);
    }

    /// Runs every due command against its target. Commands whose target no
    /// longer exists are discarded; that race is expected.
    pub fn process(&mut self, registry: &mut Registry, tick: u64, dt: f32) -> CommandReport {
        while let Ok(command) = self.rx.try_recv() {
            self.queued.push(command);
        }

        let mut report = CommandReport::default();
        let pending = std::mem::take(&mut self.queued);

        for command in pending {
            if !command.is_due(tick) {
                report.deferred += 1;
                self.queued.push(command);
                continue;
            }

            match registry.get_mut(command.target) {
                Some(entity) => {
                    (command.action)(entity, dt);
                    report.applied += 1;
                }
                None => {
                    trace!("dropping command for missing entity {}", command.target);
                    report.dropped += 1;
                }
            }
        }

        self.dropped_total += report.dropped as u64;
        report
    }

    pub fn len(&self) -> usize {
        self.queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped_total
    }

    pub fn clear(&mut self) {
        self.queued.clear();
        while self.rx.try_recv().is_ok() {}
    }
}

impl Default for CommandBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec2;

    use super::*;
    use crate::world::ActorKind;

    fn registry_with_ball() -> (Registry, EntityId) {
        let mut registry = Registry::new();
        let id = registry.spawn_with(|id| Entity::new(id, ActorKind::Ball, Vec2::ZERO));
        (registry, id)
    }

    #[test]
    fn commands_wait_for_the_command_phase() {
        let (mut registry, id) = registry_with_ball();
        let mut bus = CommandBus::default();

        bus.send_command(id, |e, _| e.position = Vec2::new(5.0, 5.0));
        assert_eq!(registry.get(id).unwrap().position, Vec2::ZERO);

        let report = bus.process(&mut registry, 1, 0.016);
        assert_eq!(report.applied, 1);
        assert_eq!(registry.get(id).unwrap().position, Vec2::new(5.0, 5.0));
        assert!(bus.is_empty());
    }

    #[test]
    fn action_receives_tick_delta() {
        let (mut registry, id) = registry_with_ball();
        let mut bus = CommandBus::default();

        bus.send_command(id, |e, dt| e.velocity = Vec2::splat(dt));
        bus.process(&mut registry, 1, 0.25);

        assert_eq!(registry.get(id).unwrap().velocity, Vec2::splat(0.25));
    }

    #[test]
    fn missing_target_is_dropped_silently() {
        let (mut registry, id) = registry_with_ball();
        let mut bus = CommandBus::default();

        bus.send_command(id, |e, _| e.position = Vec2::ONE);
        registry.despawn(id);

        let report = bus.process(&mut registry, 1, 0.016);
        assert_eq!(report.dropped, 1);
        assert_eq!(report.applied, 0);
        assert!(registry.is_empty());
        assert_eq!(bus.dropped_total(), 1);
    }

    #[test]
    fn target_destroyed_earlier_in_tick_leaves_registry_intact() {
        let mut registry = Registry::new();
        let doomed = registry.spawn_with(|id| Entity::new(id, ActorKind::Crate, Vec2::ZERO));
        let survivor = registry.spawn_with(|id| Entity::new(id, ActorKind::Crate, Vec2::ZERO));
        let mut bus = CommandBus::default();

        bus.send_command(doomed, |e, _| e.position = Vec2::splat(100.0));
        bus.send_command(survivor, |e, _| e.position = Vec2::splat(3.0));

        registry.get_mut(doomed).unwrap().mark_destroyed();
        registry.sweep_destroyed();

        let report = bus.process(&mut registry, 1, 0.016);
        assert_eq!(report, CommandReport { applied: 1, dropped: 1, deferred: 0 });
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(survivor).unwrap().position, Vec2::splat(3.0));
    }

    #[test]
    fn scheduled_commands_are_deferred() {
        let (mut registry, id) = registry_with_ball();
        let mut bus = CommandBus::default();

        bus.push(Command::at(id, 5, |e, _| e.position = Vec2::ONE));

        let report = bus.process(&mut registry, 4, 0.016);
        assert_eq!(report.deferred, 1);
        assert_eq!(bus.len(), 1);

        let report = bus.process(&mut registry, 5, 0.016);
        assert_eq!(report.applied, 1);
        assert_eq!(registry.get(id).unwrap().position, Vec2::ONE);
    }

    #[test]
    fn sender_feeds_bus_from_another_thread() {
        let (mut registry, id) = registry_with_ball();
        let mut bus = CommandBus::new(16);
        let sender = bus.sender();

        std::thread::spawn(move || {
            sender
                .send_command(id, |e, _| e.velocity = Vec2::new(2.0, 0.0))
                .unwrap();
        })
        .join()
        .unwrap();

        bus.process(&mut registry, 1, 0.016);
        assert_eq!(registry.get(id).unwrap().velocity, Vec2::new(2.0, 0.0));
    }

    #[test]
    fn full_sender_reports_backpressure() {
        let bus = CommandBus::new(1);
        let sender = bus.sender();

        sender.send_command(EntityId(1), |_, _| {}).unwrap();
        assert!(matches!(
            sender.send_command(EntityId(1), |_, _| {}),
            Err(CommandError::Full)
        ));
    }
}
