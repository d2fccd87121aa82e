pub mod net;
pub mod physics;
pub mod simulation;
pub mod world;

pub use net::{
    ActorSpawn, ActorUpdate, ClientSessionConfig, ConnectError, DEFAULT_PORT, DEFAULT_TICK_RATE,
    HostConfig, Message, NetClient, NetError, NetFlags, NetHandle, NetHost, NetworkEvent,
    NetworkStats, Packet, PacketError, PacketId, PeerHandle, PeerId, PeerState, PlayerInput,
    SendScheduler,
};
pub use physics::{ArenaConfig, ArenaPhysics, PhysicsBackend, PhysicsEvent};
pub use simulation::{FixedTimestep, Simulation, SimulationConfig, TickEvent};
pub use world::{
    ActorKind, Blueprint, Command, CommandBus, CommandSender, Entity, EntityId, Owner,
    ReconcileOutcome, Registry, RespawnQueue, reconcile,
};
