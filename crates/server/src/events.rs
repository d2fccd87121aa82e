use std::net::SocketAddr;

use tether::{EntityId, PeerState};

#[derive(Debug, Clone)]
pub enum ServerEvent {
    ClientConnected {
        client_id: u32,
        addr: SocketAddr,
    },
    PlayerJoined {
        client_id: u32,
        name: String,
        paddle: EntityId,
    },
    ClientDisconnected {
        client_id: u32,
        reason: DisconnectReason,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    Graceful,
    Timeout,
    Kicked,
}

impl DisconnectReason {
    /// A zombie peer timed out; every other teardown was an exchange.
    pub fn from_state(state: PeerState, kicked: bool) -> Self {
        match state {
            PeerState::Zombie => Self::Timeout,
            _ if kicked => Self::Kicked,
            _ => Self::Graceful,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::Graceful => "disconnected",
            DisconnectReason::Timeout => "timed out",
            DisconnectReason::Kicked => "kicked",
        }
    }
}
