mod channel;
mod client;
pub mod codec;
mod config;
mod error;
mod event;
mod flags;
mod fragment;
pub(crate) mod frame;
mod host;
mod packet;
mod peer;
mod scheduler;
mod stats;
mod tracking;
pub mod worker;

pub use client::NetClient;
pub use codec::{
    ActorSpawn, ActorUpdate, CHANNEL_EVENTS, CHANNEL_STATE, Message, PacketError, PacketId,
    PlayerInput,
};
pub use config::{ClientSessionConfig, HostConfig, TimeoutConfig};
pub use error::{ConnectError, NetError};
pub use event::NetworkEvent;
pub use flags::{Delivery, NetFlags};
pub use frame::{MAX_DATAGRAM_SIZE, MAX_FRAGMENT_BODY, PROTOCOL_MAGIC};
pub use host::NetHost;
pub use packet::Packet;
pub use peer::{PeerHandle, PeerId, PeerState};
pub use scheduler::SendScheduler;
pub use stats::{NetworkStats, rand_u64};
pub use tracking::{AckTracker, ReceiveTracker, sequence_greater_than};
pub use worker::{NetHandle, Outbound, Session};

pub const DEFAULT_PORT: u16 = 27015;
pub const DEFAULT_TICK_RATE: u16 = 60;
