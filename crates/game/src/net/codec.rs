use bytes::{Buf, BufMut, BytesMut};
use glam::Vec2;

use crate::world::{ActorKind, EntityId};

use super::packet::Packet;

/// Unreliable channel carrying per-tick state.
pub const CHANNEL_STATE: u8 = 0;
/// Reliable channel carrying handshakes, spawns and destroys.
pub const CHANNEL_EVENTS: u8 = 1;

const MAX_NAME_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketId {
    Handshake = 0,
    PlayerDetails = 1,
    ActorSpawned = 2,
    ActorUpdate = 3,
    PlayerInput = 4,
    EntityDestroyed = 5,
}

impl PacketId {
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Handshake),
            1 => Some(Self::PlayerDetails),
            2 => Some(Self::ActorSpawned),
            3 => Some(Self::ActorUpdate),
            4 => Some(Self::PlayerInput),
            5 => Some(Self::EntityDestroyed),
            _ => None,
        }
    }

    /// Bytes of fixed-width fields following the tag.
    pub const fn fixed_len(self) -> usize {
        match self {
            Self::Handshake => 4 + 2 + 8,
            Self::PlayerDetails => 4 + 2,
            Self::ActorSpawned => 8 + 1 + 4 + 8 + 8,
            Self::ActorUpdate => 8 + 8 + 8 + 4,
            Self::PlayerInput => 4 + 8 + 4 + 8,
            Self::EntityDestroyed => 8 + 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    #[error("malformed {packet:?} packet: needed {needed} bytes, {available} available")]
    Malformed {
        packet: Option<PacketId>,
        needed: usize,
        available: usize,
    },
    #[error("unknown packet type {0}")]
    UnknownPacketType(u8),
    #[error("invalid {field} in {packet:?} packet")]
    InvalidField {
        packet: PacketId,
        field: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActorSpawn {
    pub entity: EntityId,
    pub kind: ActorKind,
    pub owner: u32,
    pub position: Vec2,
    pub velocity: Vec2,
}

/// Authoritative state for one entity. `sequence` is the last input the host
/// applied for player-driven entities and the host tick for everything else.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActorUpdate {
    pub entity: EntityId,
    pub position: Vec2,
    pub velocity: Vec2,
    pub sequence: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerInput {
    pub client_id: u32,
    pub timestamp_ms: u64,
    pub sequence: u32,
    pub movement: Vec2,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Handshake {
        client_id: u32,
        tick_rate: u16,
        server_time_ms: u64,
    },
    PlayerDetails {
        client_id: u32,
        name: String,
    },
    ActorSpawned(ActorSpawn),
    ActorUpdate(ActorUpdate),
    PlayerInput(PlayerInput),
    EntityDestroyed {
        entity: EntityId,
        position: Vec2,
    },
}

impl Message {
    pub fn packet_id(&self) -> PacketId {
        match self {
            Self::Handshake { .. } => PacketId::Handshake,
            Self::PlayerDetails { .. } => PacketId::PlayerDetails,
            Self::ActorSpawned(_) => PacketId::ActorSpawned,
            Self::ActorUpdate(_) => PacketId::ActorUpdate,
            Self::PlayerInput(_) => PacketId::PlayerInput,
            Self::EntityDestroyed { .. } => PacketId::EntityDestroyed,
        }
    }

    pub fn encode(&self) -> Packet {
        let id = self.packet_id();
        let mut buf = BytesMut::with_capacity(1 + id.fixed_len() + MAX_NAME_LEN);
        buf.put_u8(id as u8);

        match self {
            Self::Handshake {
                client_id,
                tick_rate,
                server_time_ms,
            } => {
                buf.put_u32_le(*client_id);
                buf.put_u16_le(*tick_rate);
                buf.put_u64_le(*server_time_ms);
            }
            Self::PlayerDetails { client_id, name } => {
                buf.put_u32_le(*client_id);
                put_string(&mut buf, name);
            }
            Self::ActorSpawned(spawn) => {
                buf.put_u64_le(spawn.entity.0);
                buf.put_u8(spawn.kind as u8);
                buf.put_u32_le(spawn.owner);
                put_vec2(&mut buf, spawn.position);
                put_vec2(&mut buf, spawn.velocity);
            }
            Self::ActorUpdate(update) => {
                buf.put_u64_le(update.entity.0);
                put_vec2(&mut buf, update.position);
                put_vec2(&mut buf, update.velocity);
                buf.put_u32_le(update.sequence);
            }
            Self::PlayerInput(input) => {
                buf.put_u32_le(input.client_id);
                buf.put_u64_le(input.timestamp_ms);
                buf.put_u32_le(input.sequence);
                put_vec2(&mut buf, input.movement);
            }
            Self::EntityDestroyed { entity, position } => {
                buf.put_u64_le(entity.0);
                put_vec2(&mut buf, *position);
            }
        }

        Packet::new(buf.freeze())
    }

    pub fn decode(packet: &Packet) -> Result<Self, PacketError> {
        Self::decode_bytes(packet.data())
    }

    pub fn decode_bytes(data: &[u8]) -> Result<Self, PacketError> {
        let Some((&tag, mut buf)) = data.split_first() else {
            return Err(PacketError::Malformed {
                packet: None,
                needed: 1,
                available: 0,
            });
        };

        let id = PacketId::from_u8(tag).ok_or(PacketError::UnknownPacketType(tag))?;
        ensure(id, &buf, id.fixed_len())?;

        let message = match id {
            PacketId::Handshake => Self::Handshake {
                client_id: buf.get_u32_le(),
                tick_rate: buf.get_u16_le(),
                server_time_ms: buf.get_u64_le(),
            },
            PacketId::PlayerDetails => {
                let client_id = buf.get_u32_le();
                let name = get_string(id, &mut buf)?;
                Self::PlayerDetails { client_id, name }
            }
            PacketId::ActorSpawned => {
                let entity = EntityId(buf.get_u64_le());
                let kind = ActorKind::from_u8(buf.get_u8()).ok_or(PacketError::InvalidField {
                    packet: id,
                    field: "actor kind",
                })?;
                Self::ActorSpawned(ActorSpawn {
                    entity,
                    kind,
                    owner: buf.get_u32_le(),
                    position: get_vec2(&mut buf),
                    velocity: get_vec2(&mut buf),
                })
            }
            PacketId::ActorUpdate => Self::ActorUpdate(ActorUpdate {
                entity: EntityId(buf.get_u64_le()),
                position: get_vec2(&mut buf),
                velocity: get_vec2(&mut buf),
                sequence: buf.get_u32_le(),
            }),
            PacketId::PlayerInput => Self::PlayerInput(PlayerInput {
                client_id: buf.get_u32_le(),
                timestamp_ms: buf.get_u64_le(),
                sequence: buf.get_u32_le(),
                movement: get_vec2(&mut buf),
            }),
            PacketId::EntityDestroyed => Self::EntityDestroyed {
                entity: EntityId(buf.get_u64_le()),
                position: get_vec2(&mut buf),
            },
        };

        Ok(message)
    }
}

fn ensure(id: PacketId, buf: &&[u8], needed: usize) -> Result<(), PacketError> {
    if buf.remaining() < needed {
        return Err(PacketError::Malformed {
            packet: Some(id),
            needed,
            available: buf.remaining(),
        });
    }
    Ok(())
}

fn put_vec2(buf: &mut BytesMut, v: Vec2) {
    buf.put_f32_le(v.x);
    buf.put_f32_le(v.y);
}

fn get_vec2(buf: &mut &[u8]) -> Vec2 {
    let x = buf.get_f32_le();
    let y = buf.get_f32_le();
    Vec2::new(x, y)
}

fn put_string(buf: &mut BytesMut, s: &str) {
    let mut end = s.len().min(MAX_NAME_LEN);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    buf.put_u16_le(end as u16);
    buf.put_slice(&s.as_bytes()[..end]);
}

fn get_string(id: PacketId, buf: &mut &[u8]) -> Result<String, PacketError> {
    let len = buf.get_u16_le() as usize;
    ensure(id, buf, len)?;

    let text = std::str::from_utf8(&buf[..len]).map_err(|_| PacketError::InvalidField {
        packet: id,
        field: "string",
    })?;
    let text = text.to_owned();
    buf.advance(len);
    Ok(text)
}
