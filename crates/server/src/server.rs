use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use log::warn;

use tether::net::worker;
use tether::{ArenaPhysics, NetError, NetHandle, NetHost, PeerId};

use crate::config::ServerConfig;
use crate::events::ServerEvent;
use crate::state::{Outgoing, ServerState, Target};

#[derive(Debug, Clone, Copy)]
pub struct ServerStats {
    pub tick: u64,
    pub entity_count: usize,
    pub client_count: usize,
    pub pending_respawns: usize,
    /// Commands aimed at missing entities during the last tick.
    pub dropped_commands: usize,
}

/// Runs the simulation on the calling thread and the host on a worker
/// thread. The two only meet at `tick_once`.
pub struct GameServer {
    net: NetHandle,
    state: ServerState<ArenaPhysics>,
    local_addr: SocketAddr,
    last_tick_time: Instant,
    running: Arc<AtomicBool>,
    pending_events: Vec<ServerEvent>,
}

impl GameServer {
    pub fn new(bind_addr: &str, config: ServerConfig) -> Result<Self, NetError> {
        let host = NetHost::bind(bind_addr, config.host())?;
        let local_addr = host.local_addr();
        let net = worker::spawn(host, config.channel_capacity)?;
        let physics = ArenaPhysics::new(&config.arena);

        Ok(Self {
            net,
            state: ServerState::new(&config, physics),
            local_addr,
            last_tick_time: Instant::now(),
            running: Arc::new(AtomicBool::new(true)),
            pending_events: Vec::new(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = ServerEvent> + '_ {
        self.pending_events.extend(self.state.drain_events());
        self.pending_events.drain(..)
    }

    /// Drains network events into the simulation, then advances it by the
    /// wall time since the last call.
    pub fn tick_once(&mut self) {
        let now = Instant::now();
        let delta = (now - self.last_tick_time).as_secs_f32();
        self.last_tick_time = now;

        if !self.net.is_running() {
            self.pending_events.push(ServerEvent::Error {
                message: "network worker stopped".to_string(),
            });
            self.running.store(false, Ordering::SeqCst);
            return;
        }

        while let Some(event) = self.net.poll() {
            let out = self.state.handle_event(event);
            self.dispatch(out);
        }

        let out = self.state.tick(delta);
        self.dispatch(out);
    }

    fn dispatch(&mut self, out: Vec<Outgoing>) {
        for outgoing in out {
            let packet = outgoing.packet();
            let result = match outgoing.target {
                Target::All => self.net.broadcast(packet, outgoing.flags, outgoing.channel),
                Target::Peer(peer) => self.net.send(peer, packet, outgoing.flags, outgoing.channel),
            };
            if let Err(e) = result {
                warn!("Failed to queue {:?}: {}", outgoing.message.packet_id(), e);
                self.pending_events.push(ServerEvent::Error {
                    message: format!("Network error: {}", e),
                });
            }
        }
    }

    pub fn kick_client(&mut self, peer: PeerId) {
        self.state.mark_kicked(peer);
        if let Err(e) = self.net.disconnect(peer) {
            warn!("Failed to kick {}: {}", peer, e);
        }
    }

    pub fn shutdown_connections(&mut self) {
        for peer in self.state.peers() {
            self.kick_client(peer);
        }
    }

    /// Kicks everyone, then stops the worker. The host sends its own
    /// disconnects for anything still connected when it closes.
    pub fn shutdown(&mut self) {
        self.shutdown_connections();
        self.net.shutdown();
    }

    pub fn stats(&self) -> ServerStats {
        let simulation = self.state.simulation();
        ServerStats {
            tick: simulation.tick(),
            entity_count: simulation.registry().len(),
            client_count: self.state.client_count(),
            pending_respawns: simulation.respawns().len(),
            dropped_commands: simulation.last_report().dropped,
        }
    }
}
