use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Instant;

use log::{debug, info, trace, warn};

use super::config::HostConfig;
use super::error::NetError;
use super::event::NetworkEvent;
use super::flags::NetFlags;
use super::frame::{DatagramHeader, Frame, MAX_DATAGRAM_SIZE, decode_datagram, encode_datagram};
use super::packet::Packet;
use super::peer::{Inbound, Peer, PeerHandle, PeerId, PeerState};
use super::stats::{NetworkStats, rand_u64};

struct Challenge {
    client_salt: u64,
    server_salt: u64,
    channels: u8,
    issued: Instant,
}

struct Verified {
    addr: SocketAddr,
    salt: u64,
    channels: u8,
}

/// Listening end of the transport. Owns every connected peer and the queue
/// of events produced while servicing the socket.
pub struct NetHost {
    socket: UdpSocket,
    local_addr: SocketAddr,
    config: HostConfig,
    peers: HashMap<PeerId, Peer>,
    by_addr: HashMap<SocketAddr, PeerId>,
    challenges: HashMap<SocketAddr, Challenge>,
    verified: VecDeque<Verified>,
    events: VecDeque<NetworkEvent>,
    next_peer_id: u32,
    recv_buffer: [u8; MAX_DATAGRAM_SIZE],
}

impl NetHost {
    pub fn bind<A: ToSocketAddrs>(addr: A, config: HostConfig) -> Result<Self, NetError> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        let local_addr = socket.local_addr()?;

        info!("Host listening on {}", local_addr);

        Ok(Self {
            socket,
            local_addr,
            config,
            peers: HashMap::new(),
            by_addr: HashMap::new(),
            challenges: HashMap::new(),
            verified: VecDeque::new(),
            events: VecDeque::new(),
            next_peer_id: 1,
            recv_buffer: [0u8; MAX_DATAGRAM_SIZE],
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Reads every pending datagram, completes handshakes, checks timeouts
    /// and sends whatever is due.
    pub fn service(&mut self) -> Result<(), NetError> {
        let now = Instant::now();
        self.receive(now)?;
        self.accept();
        self.update(now);
        self.flush_at(now);
        Ok(())
    }

    /// Pumps the socket once if no event is waiting, then pops one event.
    pub fn poll(&mut self) -> Result<NetworkEvent, NetError> {
        if self.events.is_empty() {
            self.service()?;
        }
        Ok(self.events.pop_front().unwrap_or(NetworkEvent::None))
    }

    pub fn pop_event(&mut self) -> Option<NetworkEvent> {
        self.events.pop_front()
    }

    /// Promotes verified handshakes to connected peers, denying any beyond
    /// `max_peers`. Returns how many were accepted.
    pub fn accept(&mut self) -> usize {
        let now = Instant::now();
        let mut accepted = 0;

        while let Some(verified) = self.verified.pop_front() {
            if self.by_addr.contains_key(&verified.addr) {
                continue;
            }
            if self.peers.len() >= self.config.max_peers {
                self.deny(verified.addr, "server full");
                continue;
            }

            let id = PeerId(self.next_peer_id);
            self.next_peer_id = self.next_peer_id.wrapping_add(1).max(1);
            let channels = verified.channels.min(self.config.channel_count);

            let mut peer = Peer::new(
                id,
                verified.addr,
                channels,
                verified.salt,
                self.config.timeouts.clone(),
                self.config.max_packet_size,
                now,
            );
            peer.set_state(PeerState::PendingConnect);
            peer.queue_control(Frame::Accept {
                peer_id: id.0,
                channels,
            });
            peer.set_state(PeerState::Succeeded);

            info!("{} connected from {}", id, verified.addr);
            peer.set_state(PeerState::Connected);
            self.events.push_back(NetworkEvent::PeerConnected(peer.handle()));

            self.by_addr.insert(verified.addr, id);
            self.peers.insert(id, peer);
            accepted += 1;
        }

        accepted
    }

    pub fn send(
        &mut self,
        peer: PeerId,
        packet: &Packet,
        flags: NetFlags,
        channel: u8,
    ) -> Result<(), NetError> {
        self.peers
            .get_mut(&peer)
            .ok_or(NetError::UnknownPeer(peer))?
            .queue(packet, flags, channel)
    }

    /// Queues `packet` for every connected peer. The buffer is shared, not
    /// re-encoded per peer.
    pub fn broadcast(&mut self, packet: &Packet, flags: NetFlags, channel: u8) -> Result<(), NetError> {
        flags.delivery()?;
        if channel >= self.config.channel_count {
            return Err(NetError::InvalidChannel {
                channel,
                count: self.config.channel_count,
            });
        }

        for peer in self
            .peers
            .values_mut()
            .filter(|p| p.state() == PeerState::Connected)
        {
            if let Err(err) = peer.queue(packet, flags, channel) {
                debug!("Broadcast skipped {}: {}", peer.id(), err);
            }
        }
        Ok(())
    }

    /// Drops the peer's unsent data and starts the disconnect exchange.
    pub fn disconnect(&mut self, peer: PeerId) -> Result<(), NetError> {
        let peer = self.peers.get_mut(&peer).ok_or(NetError::UnknownPeer(peer))?;
        info!("Disconnecting {}", peer.id());
        peer.begin_disconnect(Instant::now());
        Ok(())
    }

    /// Disconnects once every queued reliable frame has been acknowledged.
    pub fn disconnect_later(&mut self, peer: PeerId) -> Result<(), NetError> {
        let peer = self.peers.get_mut(&peer).ok_or(NetError::UnknownPeer(peer))?;
        if peer.state() == PeerState::Connected {
            peer.set_state(PeerState::DisconnectLater);
        }
        Ok(())
    }

    /// Disconnects everyone and pushes the disconnect frames out.
    pub fn close(&mut self) {
        let now = Instant::now();
        for peer in self.peers.values_mut() {
            if peer.state().is_connected() {
                peer.begin_disconnect(now);
            }
        }
        self.flush_at(now);
    }

    pub fn flush(&mut self) {
        self.flush_at(Instant::now());
    }

    pub fn peer(&self, id: PeerId) -> Option<PeerHandle> {
        self.peers.get(&id).map(Peer::handle)
    }

    pub fn peers(&self) -> Vec<PeerHandle> {
        let mut handles: Vec<_> = self.peers.values().map(Peer::handle).collect();
        handles.sort_by_key(|h| h.id);
        handles
    }

    pub fn peer_stats(&self, id: PeerId) -> Option<&NetworkStats> {
        self.peers.get(&id).map(Peer::stats)
    }

    pub fn connected_count(&self) -> usize {
        self.peers
            .values()
            .filter(|p| p.state().is_connected())
            .count()
    }

    fn receive(&mut self, now: Instant) -> Result<(), NetError> {
        loop {
            match self.socket.recv_from(&mut self.recv_buffer) {
                Ok((size, addr)) => {
                    let Some((header, frame)) = decode_datagram(&self.recv_buffer[..size]) else {
                        trace!("Discarding {} byte datagram from {}", size, addr);
                        continue;
                    };
                    self.handle_datagram(addr, size, header, frame, now);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::ConnectionReset => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn handle_datagram(
        &mut self,
        addr: SocketAddr,
        size: usize,
        header: DatagramHeader,
        frame: Frame,
        now: Instant,
    ) {
        let Some(&id) = self.by_addr.get(&addr) else {
            self.handle_unconnected(addr, frame, now);
            return;
        };
        let Some(peer) = self.peers.get_mut(&id) else {
            return;
        };

        if frame.is_handshake() {
            // Lost accept: the client is still answering our challenge.
            if let Frame::Response { combined } = frame {
                if combined == peer.salt() && peer.state() == PeerState::Connected {
                    peer.queue_control(Frame::Accept {
                        peer_id: id.0,
                        channels: peer.channel_count(),
                    });
                }
            }
            return;
        }

        if !peer.on_header(&header, size, now) {
            return;
        }

        match peer.on_frame(frame, now) {
            Inbound::Packets(packets) => {
                let handle = peer.handle();
                for (packet, channel) in packets {
                    self.events.push_back(NetworkEvent::PacketReceived {
                        packet,
                        peer: handle,
                        channel,
                    });
                }
            }
            Inbound::Disconnected => {
                info!("{} disconnected", id);
                let mut handle = peer.handle();
                handle.state = PeerState::Disconnected;
                self.events.push_back(NetworkEvent::PeerDisconnected(handle));
            }
            Inbound::DisconnectAcked => {
                info!("{} acknowledged disconnect", id);
                if let Some(mut peer) = self.remove_peer(id) {
                    peer.set_state(PeerState::Disconnected);
                    self.events
                        .push_back(NetworkEvent::PeerDisconnected(peer.handle()));
                }
            }
            Inbound::Nothing | Inbound::Handshake => {}
        }
    }

    fn handle_unconnected(&mut self, addr: SocketAddr, frame: Frame, now: Instant) {
        match frame {
            Frame::Connect { salt, channels } => {
                if channels == 0 {
                    return;
                }
                if self.peers.len() >= self.config.max_peers {
                    self.deny(addr, "server full");
                    return;
                }

                let challenge = self
                    .challenges
                    .entry(addr)
                    .and_modify(|c| {
                        if c.client_salt != salt {
                            c.client_salt = salt;
                            c.server_salt = rand_u64();
                        }
                        c.issued = now;
                    })
                    .or_insert_with(|| Challenge {
                        client_salt: salt,
                        server_salt: rand_u64(),
                        channels,
                        issued: now,
                    });

                debug!("Challenging {}", addr);
                let frame = Frame::Challenge {
                    server_salt: challenge.server_salt,
                    challenge: challenge.client_salt ^ challenge.server_salt,
                };
                self.send_unconnected(addr, &frame);
            }
            Frame::Response { combined } => {
                let valid = self
                    .challenges
                    .get(&addr)
                    .is_some_and(|c| c.client_salt ^ c.server_salt == combined);
                if !valid {
                    debug!("Bad challenge response from {}", addr);
                    return;
                }
                if let Some(challenge) = self.challenges.remove(&addr) {
                    self.verified.push_back(Verified {
                        addr,
                        salt: combined,
                        channels: challenge.channels,
                    });
                }
            }
            _ => trace!("Ignoring frame from unknown address {}", addr),
        }
    }

    fn update(&mut self, now: Instant) {
        let handshake_timeout = self.config.handshake_timeout;
        self.challenges
            .retain(|_, c| now.duration_since(c.issued) < handshake_timeout);

        let expired: Vec<PeerId> = self
            .peers
            .values()
            .filter(|p| p.check_timeout(now))
            .map(Peer::id)
            .collect();

        for id in expired {
            let Some(mut peer) = self.remove_peer(id) else {
                continue;
            };
            if peer.state() == PeerState::Disconnecting {
                debug!("{} never acknowledged disconnect", id);
                peer.set_state(PeerState::Disconnected);
            } else {
                warn!("{} timed out", id);
                peer.set_state(PeerState::Zombie);
            }
            self.events
                .push_back(NetworkEvent::PeerDisconnected(peer.handle()));
        }
    }

    fn flush_at(&mut self, now: Instant) {
        let mut finished = Vec::new();

        for peer in self.peers.values_mut() {
            for datagram in peer.flush(now) {
                if let Err(e) = self.socket.send_to(&datagram, peer.addr()) {
                    debug!("Send to {} failed: {}", peer.addr(), e);
                }
            }
            if peer.state() == PeerState::AcknowledgingDisconnect {
                finished.push(peer.id());
            }
        }

        for id in finished {
            self.remove_peer(id);
        }
    }

    fn remove_peer(&mut self, id: PeerId) -> Option<Peer> {
        let peer = self.peers.remove(&id)?;
        self.by_addr.remove(&peer.addr());
        Some(peer)
    }

    fn deny(&mut self, addr: SocketAddr, reason: &str) {
        warn!("Denying {}: {}", addr, reason);
        self.challenges.remove(&addr);
        self.send_unconnected(
            addr,
            &Frame::Deny {
                reason: reason.to_string(),
            },
        );
    }

    fn send_unconnected(&self, addr: SocketAddr, frame: &Frame) {
        let header = DatagramHeader {
            sequence: 0,
            ack: 0,
            ack_bitfield: 0,
        };
        if let Err(e) = self.socket.send_to(&encode_datagram(&header, frame), addr) {
            debug!("Send to {} failed: {}", addr, e);
        }
    }
}
