use std::collections::VecDeque;
use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;

use bytes::Bytes;
use log::{debug, trace};
use serde::{Deserialize, Serialize};

use super::channel::Channel;
use super::config::TimeoutConfig;
use super::error::NetError;
use super::flags::{Delivery, NetFlags};
use super::fragment::{Reassembler, split};
use super::frame::{DatagramHeader, Frame, MAX_FRAGMENT_BODY, PayloadFrame, encode_datagram};
use super::packet::Packet;
use super::stats::NetworkStats;
use super::tracking::{AckTracker, ReceiveTracker};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct PeerId(pub u32);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer {}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeerState {
    Disconnected,
    Connecting,
    AcknowledgingConnect,
    PendingConnect,
    Succeeded,
    Connected,
    DisconnectLater,
    Disconnecting,
    AcknowledgingDisconnect,
    Zombie,
}

impl PeerState {
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected | Self::DisconnectLater)
    }
}

/// Copyable view of a peer, handed out in events and queries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeerHandle {
    pub id: PeerId,
    pub addr: SocketAddr,
    pub rtt_ms: f32,
    pub state: PeerState,
}

struct InFlight {
    frame: PayloadFrame,
    datagram: u32,
    first_sent: Instant,
    last_sent: Instant,
}

/// What a received frame meant for the owner of the peer.
pub(crate) enum Inbound {
    Nothing,
    Packets(Vec<(Packet, u8)>),
    Handshake,
    Disconnected,
    DisconnectAcked,
}

/// One end of a session: sequencing, reliability, fragmentation and
/// liveness for a single remote address. Sockets stay with the owner;
/// `flush` hands back encoded datagrams.
pub(crate) struct Peer {
    id: PeerId,
    addr: SocketAddr,
    state: PeerState,
    salt: u64,
    channels: Vec<Channel>,
    send_sequence: u32,
    acks: AckTracker,
    received: ReceiveTracker,
    queued: VecDeque<PayloadFrame>,
    control: VecDeque<Frame>,
    in_flight: Vec<InFlight>,
    reassembler: Reassembler,
    next_send_id: u32,
    next_group: u16,
    needs_ack: bool,
    last_receive: Instant,
    last_ping: Instant,
    disconnect_started: Option<Instant>,
    disconnect_sent: Option<Instant>,
    timeouts: TimeoutConfig,
    max_packet_size: usize,
    stats: NetworkStats,
    epoch: Instant,
}

impl Peer {
    pub fn new(
        id: PeerId,
        addr: SocketAddr,
        channel_count: u8,
        salt: u64,
        timeouts: TimeoutConfig,
        max_packet_size: usize,
        now: Instant,
    ) -> Self {
        Self {
            id,
            addr,
            state: PeerState::Disconnected,
            salt,
            channels: (0..channel_count.max(1)).map(|_| Channel::default()).collect(),
            send_sequence: 0,
            acks: AckTracker::new(256),
            received: ReceiveTracker::new(),
            queued: VecDeque::new(),
            control: VecDeque::new(),
            in_flight: Vec::new(),
            reassembler: Reassembler::new(
                timeouts.fragment_timeout,
                Reassembler::fragment_limit(max_packet_size, MAX_FRAGMENT_BODY),
            ),
            next_send_id: 1,
            next_group: 1,
            needs_ack: false,
            last_receive: now,
            last_ping: now,
            disconnect_started: None,
            disconnect_sent: None,
            timeouts,
            max_packet_size,
            stats: NetworkStats::default(),
            epoch: now,
        }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn set_id(&mut self, id: PeerId) {
        self.id = id;
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn state(&self) -> PeerState {
        self.state
    }

    pub fn set_state(&mut self, state: PeerState) {
        if self.state != state {
            trace!("{} {:?} -> {:?}", self.id, self.state, state);
            self.state = state;
        }
    }

    pub fn salt(&self) -> u64 {
        self.salt
    }

    pub fn set_salt(&mut self, salt: u64) {
        self.salt = salt;
    }

    pub fn channel_count(&self) -> u8 {
        self.channels.len() as u8
    }

    pub fn limit_channels(&mut self, count: u8) {
        self.channels.truncate(count.max(1) as usize);
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    pub fn handle(&self) -> PeerHandle {
        PeerHandle {
            id: self.id,
            addr: self.addr,
            rtt_ms: self.acks.srtt(),
            state: self.state,
        }
    }

    /// Splits `packet` into payload frames and queues them for the next flush.
    pub fn queue(&mut self, packet: &Packet, flags: NetFlags, channel: u8) -> Result<(), NetError> {
        if self.state != PeerState::Connected {
            return Err(NetError::NotConnected);
        }
        let delivery = flags.delivery()?;
        let count = self.channel_count();
        let Some(state) = self.channels.get_mut(channel as usize) else {
            return Err(NetError::InvalidChannel { channel, count });
        };
        if packet.len() > self.max_packet_size {
            return Err(NetError::PacketTooLarge {
                size: packet.len(),
                limit: self.max_packet_size,
            });
        }

        let parts = split(packet.bytes(), MAX_FRAGMENT_BODY);
        let fragments = u16::try_from(parts.len()).map_err(|_| NetError::PacketTooLarge {
            size: packet.len(),
            limit: MAX_FRAGMENT_BODY * u16::MAX as usize,
        })?;

        let order = state.next_order(delivery);
        let send_id = self.next_send_id;
        self.next_send_id = self.next_send_id.wrapping_add(1);
        let group = if fragments > 1 {
            let group = self.next_group;
            self.next_group = self.next_group.wrapping_add(1).max(1);
            group
        } else {
            0
        };

        for (index, body) in parts.into_iter().enumerate() {
            self.queued.push_back(PayloadFrame {
                channel,
                flags,
                send_id,
                order,
                group,
                index: index as u16,
                count: fragments,
                body,
            });
        }

        Ok(())
    }

    pub fn queue_control(&mut self, frame: Frame) {
        self.control.push_back(frame);
    }

    /// Duplicate filter and ack processing. Returns false if the datagram
    /// was already seen.
    pub fn on_header(&mut self, header: &DatagramHeader, size: usize, now: Instant) -> bool {
        if !self.received.record(header.sequence) {
            trace!("{} duplicate datagram {}", self.id, header.sequence);
            return false;
        }

        self.stats.record_received(size);
        self.last_receive = now;

        let acked = self.acks.process_ack(header.ack, header.ack_bitfield, now);
        if !acked.is_empty() {
            self.in_flight.retain(|f| !acked.contains(&f.datagram));
        }
        self.stats.rtt_ms = self.acks.srtt();
        self.stats.rtt_variance = self.acks.rtt_var();

        true
    }

    pub fn on_frame(&mut self, frame: Frame, now: Instant) -> Inbound {
        match frame {
            Frame::Payload(payload) => self.on_payload(payload, now),
            Frame::Ping { timestamp_ms } => {
                self.control.push_back(Frame::Pong { timestamp_ms });
                Inbound::Nothing
            }
            Frame::Pong { .. } | Frame::Ack => Inbound::Nothing,
            Frame::Disconnect => {
                debug!("{} requested disconnect", self.id);
                self.discard_outbound();
                self.control.push_back(Frame::DisconnectAck);
                self.set_state(PeerState::AcknowledgingDisconnect);
                Inbound::Disconnected
            }
            Frame::DisconnectAck => {
                if self.state == PeerState::Disconnecting {
                    Inbound::DisconnectAcked
                } else {
                    Inbound::Nothing
                }
            }
            _ => Inbound::Handshake,
        }
    }

    fn on_payload(&mut self, payload: PayloadFrame, now: Instant) -> Inbound {
        let Ok(delivery) = payload.flags.delivery() else {
            return Inbound::Nothing;
        };
        let channel = payload.channel;
        if channel as usize >= self.channels.len() {
            debug!("{} sent on unknown channel {}", self.id, channel);
            return Inbound::Nothing;
        }
        if delivery == Delivery::Reliable {
            self.needs_ack = true;
        }

        let body = if payload.count > 1 {
            self.reassembler.insert(
                channel,
                payload.group,
                payload.index,
                payload.count,
                payload.body,
                now,
            )
        } else {
            Some(payload.body)
        };
        let Some(body) = body else {
            return Inbound::Nothing;
        };

        let ready = self.channels[channel as usize].receive(
            delivery,
            payload.order,
            payload.send_id,
            body,
        );
        if ready.is_empty() {
            return Inbound::Nothing;
        }

        Inbound::Packets(
            ready
                .into_iter()
                .map(|(send_id, body)| (Packet::with_id(send_id, body), channel))
                .collect(),
        )
    }

    /// Drops everything queued or awaiting acknowledgement.
    pub fn discard_outbound(&mut self) {
        self.queued.clear();
        self.control.clear();
        self.in_flight.clear();
    }

    pub fn begin_disconnect(&mut self, now: Instant) {
        self.discard_outbound();
        self.disconnect_started = Some(now);
        self.disconnect_sent = None;
        self.set_state(PeerState::Disconnecting);
    }

    pub fn has_pending_reliable(&self) -> bool {
        !self.in_flight.is_empty()
            || self
                .queued
                .iter()
                .any(|f| f.flags.contains(NetFlags::RELIABLE))
    }

    /// Encodes everything due now: control frames, queued payloads,
    /// retransmissions, keepalive pings and a bare ack if nothing else
    /// carried one.
    pub fn flush(&mut self, now: Instant) -> Vec<Bytes> {
        let mut out = Vec::new();

        if self.state == PeerState::DisconnectLater && !self.has_pending_reliable() {
            self.begin_disconnect(now);
        }

        while let Some(frame) = self.control.pop_front() {
            out.push(self.datagram(&frame, now).1);
        }

        match self.state {
            PeerState::Disconnecting => {
                let rto = self.acks.rto();
                if self
                    .disconnect_sent
                    .is_none_or(|sent| now.duration_since(sent) >= rto)
                {
                    out.push(self.datagram(&Frame::Disconnect, now).1);
                    self.disconnect_sent = Some(now);
                }
            }
            PeerState::Connected | PeerState::DisconnectLater => {
                while let Some(payload) = self.queued.pop_front() {
                    let kept = payload
                        .flags
                        .contains(NetFlags::RELIABLE)
                        .then(|| payload.clone());
                    let (sequence, bytes) = self.datagram(&Frame::Payload(payload), now);
                    out.push(bytes);

                    if let Some(frame) = kept {
                        self.in_flight.push(InFlight {
                            frame,
                            datagram: sequence,
                            first_sent: now,
                            last_sent: now,
                        });
                    }
                }

                let rto = self.acks.rto();
                for i in 0..self.in_flight.len() {
                    if now.duration_since(self.in_flight[i].last_sent) < rto {
                        continue;
                    }
                    let frame = Frame::Payload(self.in_flight[i].frame.clone());
                    let (sequence, bytes) = self.datagram(&frame, now);
                    out.push(bytes);
                    self.in_flight[i].datagram = sequence;
                    self.in_flight[i].last_sent = now;
                    self.stats.reliable_resent += 1;
                }

                if now.duration_since(self.last_ping) >= self.timeouts.ping_interval {
                    let timestamp_ms = now.duration_since(self.epoch).as_millis() as u64;
                    out.push(self.datagram(&Frame::Ping { timestamp_ms }, now).1);
                    self.last_ping = now;
                }
            }
            _ => {}
        }

        if self.needs_ack && out.is_empty() {
            out.push(self.datagram(&Frame::Ack, now).1);
        }
        self.needs_ack = false;

        self.reassembler.expire(now);
        out
    }

    fn datagram(&mut self, frame: &Frame, now: Instant) -> (u32, Bytes) {
        self.send_sequence = self.send_sequence.wrapping_add(1);
        let sequence = self.send_sequence;
        let (ack, ack_bitfield) = self.received.ack_data();
        let bytes = encode_datagram(
            &DatagramHeader {
                sequence,
                ack,
                ack_bitfield,
            },
            frame,
        );

        self.acks.track(sequence, now);
        self.stats.record_sent(bytes.len());
        self.stats.packets_lost = self.acks.lost();
        self.stats.update_loss();
        (sequence, bytes)
    }

    /// True once the peer should be considered gone: a disconnect that was
    /// never acknowledged, a reliable frame outstanding past the timeout
    /// window, or silence longer than `timeout_max`.
    pub fn check_timeout(&self, now: Instant) -> bool {
        let window = self.timeouts.window(self.acks.srtt(), self.acks.rtt_var());

        if let Some(started) = self.disconnect_started {
            return now.duration_since(started) >= window;
        }
        if self
            .in_flight
            .iter()
            .any(|f| now.duration_since(f.first_sent) >= window)
        {
            return true;
        }
        now.duration_since(self.last_receive) >= self.timeouts.timeout_max
    }
}
