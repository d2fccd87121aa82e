mod command;
mod entity;
mod reconcile;
mod registry;
mod respawn;

pub use command::{Command, CommandAction, CommandBus, CommandError, CommandReport, CommandSender};
pub use entity::{ActorKind, Body, CrateMotion, CrateState, Entity, EntityId, Owner};
pub use reconcile::{NetSync, ReconcileOutcome, ReconcileState, reconcile};
pub use registry::Registry;
pub use respawn::{Blueprint, RespawnEntry, RespawnQueue};
