use std::collections::VecDeque;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Instant;

use log::{debug, info, trace, warn};

use super::config::ClientSessionConfig;
use super::error::{ConnectError, NetError};
use super::event::NetworkEvent;
use super::flags::NetFlags;
use super::frame::{DatagramHeader, Frame, MAX_DATAGRAM_SIZE, decode_datagram};
use super::packet::Packet;
use super::peer::{Inbound, Peer, PeerHandle, PeerId, PeerState};
use super::stats::{NetworkStats, rand_u64};

/// Connecting end of the transport: a single peer towards one host.
pub struct NetClient {
    config: ClientSessionConfig,
    socket: Option<UdpSocket>,
    peer: Option<Peer>,
    salt: u64,
    connect_started: Instant,
    last_attempt: Instant,
    events: VecDeque<NetworkEvent>,
    early: Vec<(Packet, u8)>,
    last_error: Option<ConnectError>,
    recv_buffer: [u8; MAX_DATAGRAM_SIZE],
}

impl Default for NetClient {
    fn default() -> Self {
        Self::new(ClientSessionConfig::default())
    }
}

impl NetClient {
    pub fn new(config: ClientSessionConfig) -> Self {
        let now = Instant::now();
        Self {
            config,
            socket: None,
            peer: None,
            salt: 0,
            connect_started: now,
            last_attempt: now,
            events: VecDeque::new(),
            early: Vec::new(),
            last_error: None,
            recv_buffer: [0u8; MAX_DATAGRAM_SIZE],
        }
    }

    /// Binds a local socket and sends the connection request. Progress and
    /// failure are reported through `poll`.
    pub fn connect<A: ToSocketAddrs>(&mut self, addr: A) -> Result<(), NetError> {
        let server = addr.to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "no address to connect to")
        })?;

        let local: SocketAddr = if server.is_ipv4() {
            "0.0.0.0:0".parse().map_err(io::Error::other)?
        } else {
            "[::]:0".parse().map_err(io::Error::other)?
        };
        let socket = UdpSocket::bind(local)?;
        socket.connect(server)?;
        socket.set_nonblocking(true)?;

        let now = Instant::now();
        self.salt = rand_u64();
        let mut peer = Peer::new(
            PeerId::default(),
            server,
            self.config.channel_count,
            self.salt,
            self.config.timeouts.clone(),
            self.config.max_packet_size,
            now,
        );
        peer.set_state(PeerState::Connecting);
        peer.queue_control(Frame::Connect {
            salt: self.salt,
            channels: self.config.channel_count,
        });

        info!("Connecting to {}", server);
        self.socket = Some(socket);
        self.peer = Some(peer);
        self.connect_started = now;
        self.last_attempt = now;
        self.last_error = None;
        self.early.clear();
        self.flush_at(now);
        Ok(())
    }

    pub fn service(&mut self) -> Result<(), NetError> {
        if self.socket.is_none() {
            return Ok(());
        }
        let now = Instant::now();
        self.receive(now)?;
        self.update(now);
        self.flush_at(now);
        Ok(())
    }

    pub fn poll(&mut self) -> Result<NetworkEvent, NetError> {
        if self.events.is_empty() {
            self.service()?;
        }
        Ok(self.events.pop_front().unwrap_or(NetworkEvent::None))
    }

    pub fn pop_event(&mut self) -> Option<NetworkEvent> {
        self.events.pop_front()
    }

    pub fn send(&mut self, packet: &Packet, flags: NetFlags, channel: u8) -> Result<(), NetError> {
        match self.peer.as_mut() {
            Some(peer) => peer.queue(packet, flags, channel),
            None => Err(NetError::NotConnected),
        }
    }

    /// Starts a graceful disconnect, or abandons a handshake still in progress.
    pub fn disconnect(&mut self) {
        let now = Instant::now();
        match self.peer.as_mut() {
            Some(peer) if peer.state().is_connected() => {
                info!("Disconnecting from {}", peer.addr());
                peer.begin_disconnect(now);
                self.flush_at(now);
            }
            Some(_) => self.teardown(),
            None => {}
        }
    }

    pub fn is_connected(&self) -> bool {
        self.peer.as_ref().is_some_and(|p| p.state().is_connected())
    }

    pub fn state(&self) -> PeerState {
        self.peer
            .as_ref()
            .map_or(PeerState::Disconnected, Peer::state)
    }

    pub fn peer(&self) -> Option<PeerHandle> {
        self.peer.as_ref().map(Peer::handle)
    }

    pub fn stats(&self) -> Option<&NetworkStats> {
        self.peer.as_ref().map(Peer::stats)
    }

    pub fn last_error(&self) -> Option<&ConnectError> {
        self.last_error.as_ref()
    }

    /// Milliseconds since `connect` was called.
    pub fn time_ms(&self) -> u64 {
        self.connect_started.elapsed().as_millis() as u64
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    fn receive(&mut self, now: Instant) -> Result<(), NetError> {
        loop {
            let Some(socket) = self.socket.as_ref() else {
                return Ok(());
            };
            match socket.recv(&mut self.recv_buffer) {
                Ok(size) => {
                    let Some((header, frame)) = decode_datagram(&self.recv_buffer[..size]) else {
                        trace!("Discarding {} byte datagram", size);
                        continue;
                    };
                    self.handle(header, frame, size, now);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(ref e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                    self.fail(ConnectError::ConnectionRefused("port unreachable".to_string()));
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn handle(
        &mut self,
        header: DatagramHeader,
        frame: Frame,
        size: usize,
        now: Instant,
    ) {
        let Some(peer) = self.peer.as_mut() else {
            return;
        };
        let state = peer.state();

        match frame {
            Frame::Challenge {
                server_salt,
                challenge,
            } if state == PeerState::Connecting => {
                if challenge != self.salt ^ server_salt {
                    debug!("Ignoring challenge with mismatched salt");
                    return;
                }
                let combined = self.salt ^ server_salt;
                peer.set_salt(combined);
                peer.set_state(PeerState::AcknowledgingConnect);
                peer.queue_control(Frame::Response { combined });
                self.last_attempt = now;
            }
            Frame::Accept { peer_id, channels }
                if matches!(
                    state,
                    PeerState::Connecting | PeerState::AcknowledgingConnect
                ) =>
            {
                peer.set_id(PeerId(peer_id));
                peer.limit_channels(channels);
                peer.set_state(PeerState::Connected);
                info!("Connected to {} as {}", peer.addr(), peer.id());

                let handle = peer.handle();
                self.events.push_back(NetworkEvent::PeerConnected(handle));
                for (packet, channel) in self.early.drain(..) {
                    self.events.push_back(NetworkEvent::PacketReceived {
                        packet,
                        peer: handle,
                        channel,
                    });
                }
            }
            Frame::Deny { reason }
                if matches!(
                    state,
                    PeerState::Connecting | PeerState::AcknowledgingConnect
                ) =>
            {
                self.fail(ConnectError::ConnectionRefused(reason));
            }
            frame if frame.is_handshake() => trace!("Ignoring handshake frame in {:?}", state),
            frame => {
                if !peer.on_header(&header, size, now) {
                    return;
                }
                match peer.on_frame(frame, now) {
                    Inbound::Packets(packets) if state.is_connected() => {
                        let handle = peer.handle();
                        for (packet, channel) in packets {
                            self.events.push_back(NetworkEvent::PacketReceived {
                                packet,
                                peer: handle,
                                channel,
                            });
                        }
                    }
                    // Accept was lost but the host is already talking to us.
                    Inbound::Packets(packets) => self.early.extend(packets),
                    Inbound::Disconnected => {
                        info!("Host closed the connection");
                        self.flush_at(now);
                        self.finish(PeerState::Disconnected);
                    }
                    Inbound::DisconnectAcked => self.finish(PeerState::Disconnected),
                    Inbound::Nothing | Inbound::Handshake => {}
                }
            }
        }
    }

    fn update(&mut self, now: Instant) {
        let Some(peer) = self.peer.as_mut() else {
            return;
        };

        match peer.state() {
            PeerState::Connecting | PeerState::AcknowledgingConnect => {
                if now.duration_since(self.connect_started) >= self.config.connect_timeout {
                    self.fail(ConnectError::HostUnreachable);
                } else if now.duration_since(self.last_attempt) >= self.config.connect_retry {
                    let frame = if peer.state() == PeerState::Connecting {
                        Frame::Connect {
                            salt: self.salt,
                            channels: self.config.channel_count,
                        }
                    } else {
                        Frame::Response {
                            combined: peer.salt(),
                        }
                    };
                    trace!("Retrying handshake");
                    peer.queue_control(frame);
                    self.last_attempt = now;
                }
            }
            PeerState::Disconnecting => {
                if peer.check_timeout(now) {
                    self.finish(PeerState::Disconnected);
                }
            }
            _ => {
                if peer.check_timeout(now) {
                    warn!("Connection to {} timed out", peer.addr());
                    self.finish(PeerState::Zombie);
                }
            }
        }
    }

    fn flush_at(&mut self, now: Instant) {
        let (Some(socket), Some(peer)) = (self.socket.as_ref(), self.peer.as_mut()) else {
            return;
        };
        for datagram in peer.flush(now) {
            if let Err(e) = socket.send(&datagram) {
                debug!("Send failed: {}", e);
            }
        }
    }

    fn fail(&mut self, error: ConnectError) {
        warn!("Connection failed: {}", error);
        self.events.push_back(NetworkEvent::ConnectFailed(error.clone()));
        self.last_error = Some(error);
        self.finish(PeerState::Disconnected);
    }

    fn finish(&mut self, state: PeerState) {
        if let Some(peer) = self.peer.as_mut() {
            peer.set_state(state);
            let handle = peer.handle();
            self.events.push_back(NetworkEvent::PeerDisconnected(handle));
        }
        self.teardown();
    }

    fn teardown(&mut self) {
        self.peer = None;
        self.socket = None;
        self.early.clear();
    }
}
