use std::io;

use super::flags::NetFlags;
use super::peer::PeerId;

#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("socket error: {0}")]
    Io(#[from] io::Error),
    #[error("not connected")]
    NotConnected,
    #[error("unknown peer {0}")]
    UnknownPeer(PeerId),
    #[error("channel {channel} out of range, session has {count} channels")]
    InvalidChannel { channel: u8, count: u8 },
    #[error("invalid send flags {0:?}")]
    InvalidFlags(NetFlags),
    #[error("packet of {size} bytes exceeds the {limit} byte limit")]
    PacketTooLarge { size: usize, limit: usize },
    #[error("network worker has shut down")]
    WorkerClosed,
}

/// Why an outgoing connection attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    #[error("connection refused: {0}")]
    ConnectionRefused(String),
    #[error("host unreachable")]
    HostUnreachable,
}
