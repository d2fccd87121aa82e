use std::collections::{HashMap, HashSet, VecDeque};
use std::net::SocketAddr;
use std::time::Instant;

use log::{debug, info, warn};

use tether::net::{CHANNEL_EVENTS, CHANNEL_STATE};
use tether::{
    ArenaConfig, EntityId, Message, NetFlags, NetworkEvent, Owner, Packet, PeerHandle, PeerId,
    PhysicsBackend, PlayerInput, SendScheduler, Simulation, TickEvent,
};

use crate::config::ServerConfig;
use crate::events::{DisconnectReason, ServerEvent};
use crate::simulation::{
    apply_input, destroyed_message, paddle_spawn, populate_arena, spawn_message, update_message,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    All,
    Peer(PeerId),
}

/// A message the simulation wants on the wire.
#[derive(Debug, Clone)]
pub struct Outgoing {
    pub target: Target,
    pub message: Message,
    pub flags: NetFlags,
    pub channel: u8,
}

impl Outgoing {
    fn event(target: Target, message: Message) -> Self {
        Self {
            target,
            message,
            flags: NetFlags::RELIABLE,
            channel: CHANNEL_EVENTS,
        }
    }

    /// Updates carry their own sequence, so arrival order does not matter.
    fn state(message: Message) -> Self {
        Self {
            target: Target::All,
            message,
            flags: NetFlags::UNSEQUENCED,
            channel: CHANNEL_STATE,
        }
    }

    pub fn packet(&self) -> Packet {
        self.message.encode()
    }
}

#[derive(Debug, Clone)]
pub struct ConnectedClient {
    pub client_id: u32,
    pub addr: SocketAddr,
    pub name: Option<String>,
    pub paddle: Option<EntityId>,
}

/// Host-side game state: the authoritative simulation plus everything
/// known about connected clients. Has no sockets of its own; network
/// events go in, outgoing messages come out.
pub struct ServerState<P> {
    simulation: Simulation<P>,
    arena: ArenaConfig,
    clients: HashMap<PeerId, ConnectedClient>,
    kicked: HashSet<PeerId>,
    scheduler: SendScheduler,
    paddles_spawned: usize,
    pending_events: VecDeque<ServerEvent>,
    started: Instant,
}

impl<P: PhysicsBackend> ServerState<P> {
    pub fn new(config: &ServerConfig, physics: P) -> Self {
        let mut simulation = Simulation::new(config.simulation(), physics);
        populate_arena(&mut simulation, &config.arena);

        Self {
            simulation,
            arena: config.arena.clone(),
            clients: HashMap::new(),
            kicked: HashSet::new(),
            scheduler: SendScheduler::new(config.send_rate),
            paddles_spawned: 0,
            pending_events: VecDeque::new(),
            started: Instant::now(),
        }
    }

    pub fn simulation(&self) -> &Simulation<P> {
        &self.simulation
    }

    #[cfg(test)]
    pub fn simulation_mut(&mut self) -> &mut Simulation<P> {
        &mut self.simulation
    }

    pub fn client(&self, peer: PeerId) -> Option<&ConnectedClient> {
        self.clients.get(&peer)
    }

    pub fn peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self.clients.keys().copied().collect();
        peers.sort();
        peers
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = ServerEvent> + '_ {
        self.pending_events.drain(..)
    }

    /// The next disconnect of `peer` is reported as a kick.
    pub fn mark_kicked(&mut self, peer: PeerId) {
        self.kicked.insert(peer);
    }

    pub fn handle_event(&mut self, event: NetworkEvent) -> Vec<Outgoing> {
        match event {
            // Hosts never initiate connections.
            NetworkEvent::None | NetworkEvent::ConnectFailed(_) => Vec::new(),
            NetworkEvent::PeerConnected(handle) => self.on_connected(handle),
            NetworkEvent::PeerDisconnected(handle) => {
                self.on_disconnected(handle);
                Vec::new()
            }
            NetworkEvent::PacketReceived { packet, peer, .. } => match Message::decode(&packet) {
                Ok(message) => self.on_message(peer.id, message),
                Err(e) => {
                    warn!("Dropping packet from {}: {}", peer.id, e);
                    Vec::new()
                }
            },
        }
    }

    /// Advances the simulation by a frame delta and collects what clients
    /// need to hear about it.
    pub fn tick(&mut self, delta: f32) -> Vec<Outgoing> {
        let mut out = Vec::new();

        for event in self.simulation.update(delta) {
            match event {
                TickEvent::Destroyed { id, position, .. } => {
                    out.push(Outgoing::event(Target::All, destroyed_message(id, position)));
                }
                TickEvent::Spawned(id) => {
                    if let Some(entity) = self.simulation.registry().get(id) {
                        out.push(Outgoing::event(Target::All, spawn_message(entity)));
                    }
                }
            }
        }

        if self.scheduler.advance(delta) > 0 && !self.clients.is_empty() {
            let tick = self.simulation.tick();
            out.extend(
                self.simulation
                    .registry()
                    .iter()
                    .map(|entity| Outgoing::state(update_message(entity, tick))),
            );
        }

        out
    }

    fn on_connected(&mut self, handle: PeerHandle) -> Vec<Outgoing> {
        let client_id = handle.id.0;
        info!("Client {} connected from {}", client_id, handle.addr);

        self.clients.insert(
            handle.id,
            ConnectedClient {
                client_id,
                addr: handle.addr,
                name: None,
                paddle: None,
            },
        );
        self.pending_events.push_back(ServerEvent::ClientConnected {
            client_id,
            addr: handle.addr,
        });

        vec![Outgoing::event(
            Target::Peer(handle.id),
            Message::Handshake {
                client_id,
                tick_rate: self.simulation.config().tick_rate,
                server_time_ms: self.started.elapsed().as_millis() as u64,
            },
        )]
    }

    fn on_disconnected(&mut self, handle: PeerHandle) {
        let kicked = self.kicked.remove(&handle.id);
        let Some(client) = self.clients.remove(&handle.id) else {
            return;
        };

        let reason = DisconnectReason::from_state(handle.state, kicked);
        info!(
            "Client {} ({}) at {} {}",
            client.client_id,
            client.name.as_deref().unwrap_or("unnamed"),
            client.addr,
            reason.as_str()
        );

        let released = self
            .simulation
            .registry_mut()
            .release_owner(Owner(client.client_id));
        debug!("Released {} entities of client {}", released, client.client_id);

        // Queued behind whatever the client already sent; the tick reports
        // the removal to everyone else.
        if let Some(paddle) = client.paddle {
            self.simulation.send_command(paddle, |entity, _| entity.mark_destroyed());
        }

        self.pending_events.push_back(ServerEvent::ClientDisconnected {
            client_id: client.client_id,
            reason,
        });
    }

    fn on_message(&mut self, peer: PeerId, message: Message) -> Vec<Outgoing> {
        match message {
            Message::PlayerDetails { client_id, name } => self.on_details(peer, client_id, name),
            Message::PlayerInput(input) => {
                self.on_input(peer, input);
                Vec::new()
            }
            other => {
                debug!("Ignoring {:?} from {}", other.packet_id(), peer);
                Vec::new()
            }
        }
    }

    fn on_details(&mut self, peer: PeerId, client_id: u32, name: String) -> Vec<Outgoing> {
        let Some(client) = self.clients.get_mut(&peer) else {
            warn!("Player details from unknown {}", peer);
            return Vec::new();
        };
        if client.client_id != client_id {
            warn!(
                "{} claimed client id {} but was assigned {}",
                peer, client_id, client.client_id
            );
            return Vec::new();
        }
        if client.paddle.is_some() {
            debug!("Client {} sent details twice", client_id);
            return Vec::new();
        }

        client.name = Some(name.clone());
        let position = paddle_spawn(&self.arena, self.paddles_spawned);
        self.paddles_spawned += 1;

        let mut out: Vec<Outgoing> = self
            .simulation
            .registry()
            .iter()
            .map(|entity| Outgoing::event(Target::Peer(peer), spawn_message(entity)))
            .collect();

        let paddle = self.simulation.registry_mut().spawn_with(|id| {
            tether::Entity::paddle(id, Owner(client_id), position)
        });
        client.paddle = Some(paddle);

        if let Some(entity) = self.simulation.registry().get(paddle) {
            out.push(Outgoing::event(Target::All, spawn_message(entity)));
        }

        info!("{} joined as client {} with paddle {}", name, client_id, paddle);
        self.pending_events.push_back(ServerEvent::PlayerJoined {
            client_id,
            name,
            paddle,
        });

        out
    }

    fn on_input(&mut self, peer: PeerId, input: PlayerInput) {
        let Some(client) = self.clients.get(&peer) else {
            return;
        };
        if input.client_id != client.client_id {
            warn!("Input for client {} arrived from {}", input.client_id, peer);
            return;
        }
        let Some(paddle) = client.paddle else {
            debug!("Input from client {} before it joined", client.client_id);
            return;
        };

        let speed = self.simulation.config().paddle_speed;
        self.simulation.send_command(paddle, move |entity, _| {
            apply_input(entity, &input, speed);
        });
    }
}
