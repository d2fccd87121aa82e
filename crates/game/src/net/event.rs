use super::error::ConnectError;
use super::packet::Packet;
use super::peer::PeerHandle;

#[derive(Debug, Clone)]
pub enum NetworkEvent {
    None,
    PeerConnected(PeerHandle),
    /// The handle's state is `Zombie` when the peer timed out.
    PeerDisconnected(PeerHandle),
    /// An outgoing connection attempt gave up. Always followed by
    /// `PeerDisconnected`.
    ConnectFailed(ConnectError),
    PacketReceived {
        packet: Packet,
        peer: PeerHandle,
        channel: u8,
    },
}

impl NetworkEvent {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Payload events may be shed under backpressure; everything else
    /// changes connection state and must reach the simulation.
    pub fn is_payload(&self) -> bool {
        matches!(self, Self::PacketReceived { .. })
    }
}
