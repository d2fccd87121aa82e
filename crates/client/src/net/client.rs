use std::net::SocketAddr;
use std::time::Instant;

use log::{debug, info, warn};

use tether::net::{CHANNEL_EVENTS, CHANNEL_STATE, worker};
use tether::{
    ConnectError, Message, NetClient, NetError, NetFlags, NetHandle, NetworkEvent, PeerId,
    PeerState, SendScheduler,
};

use super::config::ClientConfig;
use super::input::InputState;
use super::replica::{ClientWorld, ReplicaEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    /// Transport is up; waiting for the host's handshake.
    Connected,
    /// Handshake answered with our details.
    Joined,
    Disconnected,
    TimedOut,
    /// The host refused us or never answered.
    Failed(ConnectError),
}

impl ConnectionState {
    /// True once the session has ended for any reason.
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Disconnected | Self::TimedOut | Self::Failed(_))
    }
}

/// A client session only talks to the host, so outgoing messages use
/// `broadcast` and the worker needs no peer id.
pub struct GameClient {
    net: NetHandle,
    world: ClientWorld,
    config: ClientConfig,
    state: ConnectionState,
    scheduler: SendScheduler,
    input_sequence: u32,
    server_tick_rate: Option<u16>,
    last_error: Option<ConnectError>,
    started: Instant,
}

impl GameClient {
    pub fn connect(server_addr: SocketAddr, config: ClientConfig) -> Result<Self, NetError> {
        info!("Connecting to {}", server_addr);

        let mut session = NetClient::new(config.session.clone());
        session.connect(server_addr)?;
        let net = worker::spawn(session, config.channel_capacity)?;

        Ok(Self {
            net,
            world: ClientWorld::new(config.paddle_speed, config.channel_capacity),
            scheduler: SendScheduler::new(config.send_rate),
            state: ConnectionState::Connecting,
            input_sequence: 0,
            server_tick_rate: None,
            last_error: None,
            started: Instant::now(),
            config,
        })
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Why the last connection attempt failed, if it did.
    pub fn last_error(&self) -> Option<&ConnectError> {
        self.last_error.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Connected | ConnectionState::Joined
        )
    }

    pub fn world(&self) -> &ClientWorld {
        &self.world
    }

    pub fn server_tick_rate(&self) -> Option<u16> {
        self.server_tick_rate
    }

    /// Drains the network, sends input at the configured rate and advances
    /// the replicated world by `delta_time`.
    pub fn update(&mut self, delta_time: f32, input: &InputState) -> Vec<ReplicaEvent> {
        let mut replica_events = Vec::new();

        while let Some(event) = self.net.poll() {
            match event {
                NetworkEvent::PeerConnected(handle) => {
                    info!("Transport connected ({} ms rtt)", handle.rtt_ms);
                    self.state = ConnectionState::Connected;
                }
                NetworkEvent::ConnectFailed(error) => {
                    warn!("Could not connect: {}", error);
                    self.state = ConnectionState::Failed(error.clone());
                    self.last_error = Some(error);
                }
                NetworkEvent::PeerDisconnected(_)
                    if matches!(self.state, ConnectionState::Failed(_)) =>
                {
                    self.world.clear();
                }
                NetworkEvent::PeerDisconnected(handle) => {
                    self.state = if handle.state == PeerState::Zombie {
                        warn!("Connection to server timed out");
                        ConnectionState::TimedOut
                    } else {
                        info!("Disconnected from server");
                        ConnectionState::Disconnected
                    };
                    self.world.clear();
                }
                NetworkEvent::PacketReceived { packet, .. } => match Message::decode(&packet) {
                    Ok(message) => replica_events.extend(self.handle_message(message)),
                    Err(e) => warn!("Dropping server packet: {}", e),
                },
                NetworkEvent::None => {}
            }
        }

        if self.state == ConnectionState::Joined {
            let sends = self.scheduler.advance(delta_time);
            if sends > 0 {
                self.send_input(input, sends as f32 * self.scheduler.interval());
            }
        }

        let report = self.world.step(delta_time);
        if report.dropped > 0 {
            debug!("{} updates for unknown entities", report.dropped);
        }

        replica_events
    }

    fn handle_message(&mut self, message: Message) -> Option<ReplicaEvent> {
        match message {
            Message::Handshake {
                client_id,
                tick_rate,
                server_time_ms,
            } => {
                info!(
                    "Handshake: client {} at {} Hz (server clock {} ms)",
                    client_id, tick_rate, server_time_ms
                );
                self.world.set_client_id(client_id);
                self.server_tick_rate = Some(tick_rate);

                let details = Message::PlayerDetails {
                    client_id,
                    name: self.config.name.clone(),
                };
                match self
                    .net
                    .broadcast(details.encode(), NetFlags::RELIABLE, CHANNEL_EVENTS)
                {
                    Ok(()) => self.state = ConnectionState::Joined,
                    Err(e) => warn!("Failed to send player details: {}", e),
                }
                None
            }
            other => {
                let event = self.world.apply(other);
                if let Some(ReplicaEvent::LocalPaddle(id)) = event {
                    info!("Controlling paddle {}", id);
                }
                event
            }
        }
    }

    fn send_input(&mut self, input: &InputState, duration: f32) {
        let Some(client_id) = self.world.client_id() else {
            return;
        };
        if self.world.local_paddle().is_none() {
            return;
        }

        self.input_sequence = self.input_sequence.wrapping_add(1);
        let message = input.to_input(
            client_id,
            self.input_sequence,
            self.started.elapsed().as_millis() as u64,
        );
        self.world.predict(message, duration);

        let packet = Message::PlayerInput(message).encode();
        if let Err(e) = self.net.broadcast(packet, NetFlags::UNRELIABLE, CHANNEL_STATE) {
            warn!("Failed to send input: {}", e);
        }
    }

    pub fn disconnect(&mut self) {
        // The session has a single peer, so the id is not looked at.
        if let Err(e) = self.net.disconnect(PeerId::default()) {
            debug!("Disconnect request failed: {}", e);
        }
        self.state = ConnectionState::Disconnected;
    }

    pub fn shutdown(&mut self) {
        self.net.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::net::UdpSocket;
    use std::time::Duration;

    use tether::ClientSessionConfig;

    use super::*;

    fn short_config() -> ClientConfig {
        ClientConfig {
            session: ClientSessionConfig {
                connect_timeout: Duration::from_millis(300),
                connect_retry: Duration::from_millis(50),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn run_until_finished(client: &mut GameClient) {
        let input = InputState::default();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !client.state().is_finished() && Instant::now() < deadline {
            client.update(0.01, &input);
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn silent_host_reports_unreachable() {
        let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = silent.local_addr().unwrap();

        let mut client = GameClient::connect(addr, short_config()).unwrap();
        run_until_finished(&mut client);

        assert_eq!(
            client.state(),
            &ConnectionState::Failed(ConnectError::HostUnreachable)
        );
        assert_eq!(client.last_error(), Some(&ConnectError::HostUnreachable));
        assert!(!client.is_connected());
        client.shutdown();
    }

    #[test]
    fn closed_port_reports_a_connect_error() {
        let addr = {
            let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
            socket.local_addr().unwrap()
        };

        let mut client = GameClient::connect(addr, short_config()).unwrap();
        run_until_finished(&mut client);

        assert!(matches!(client.state(), ConnectionState::Failed(_)));
        assert!(client.last_error().is_some());
        client.shutdown();
    }
}
