use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::flags::NetFlags;

pub const PROTOCOL_MAGIC: u32 = 0x5445_5448;
pub const MAX_DATAGRAM_SIZE: usize = 1200;
pub const HEADER_LEN: usize = 4 + 4 + 4 + 4 + 1;
pub const PAYLOAD_HEADER_LEN: usize = 1 + 1 + 4 + 2 + 2 + 2 + 2;
/// Largest body a single payload frame carries; bigger packets are fragmented.
pub const MAX_FRAGMENT_BODY: usize = MAX_DATAGRAM_SIZE - HEADER_LEN - PAYLOAD_HEADER_LEN;

const MAX_REASON_LEN: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatagramHeader {
    pub sequence: u32,
    pub ack: u32,
    pub ack_bitfield: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadFrame {
    pub channel: u8,
    pub flags: NetFlags,
    pub send_id: u32,
    pub order: u16,
    pub group: u16,
    pub index: u16,
    pub count: u16,
    pub body: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Connect { salt: u64, channels: u8 },
    Challenge { server_salt: u64, challenge: u64 },
    Response { combined: u64 },
    Accept { peer_id: u32, channels: u8 },
    Deny { reason: String },
    Disconnect,
    DisconnectAck,
    Ping { timestamp_ms: u64 },
    Pong { timestamp_ms: u64 },
    Ack,
    Payload(PayloadFrame),
}

impl Frame {
    fn kind(&self) -> u8 {
        match self {
            Self::Connect { .. } => 1,
            Self::Challenge { .. } => 2,
            Self::Response { .. } => 3,
            Self::Accept { .. } => 4,
            Self::Deny { .. } => 5,
            Self::Disconnect => 6,
            Self::DisconnectAck => 7,
            Self::Ping { .. } => 8,
            Self::Pong { .. } => 9,
            Self::Ack => 10,
            Self::Payload(_) => 11,
        }
    }

    pub fn is_handshake(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. }
                | Self::Challenge { .. }
                | Self::Response { .. }
                | Self::Accept { .. }
                | Self::Deny { .. }
        )
    }
}

pub fn encode_datagram(header: &DatagramHeader, frame: &Frame) -> Bytes {
    let mut buf = BytesMut::with_capacity(MAX_DATAGRAM_SIZE);
    buf.put_u32_le(PROTOCOL_MAGIC);
    buf.put_u32_le(header.sequence);
    buf.put_u32_le(header.ack);
    buf.put_u32_le(header.ack_bitfield);
    buf.put_u8(frame.kind());

    match frame {
        Frame::Connect { salt, channels } => {
            buf.put_u64_le(*salt);
            buf.put_u8(*channels);
        }
        Frame::Challenge {
            server_salt,
            challenge,
        } => {
            buf.put_u64_le(*server_salt);
            buf.put_u64_le(*challenge);
        }
        Frame::Response { combined } => buf.put_u64_le(*combined),
        Frame::Accept { peer_id, channels } => {
            buf.put_u32_le(*peer_id);
            buf.put_u8(*channels);
        }
        Frame::Deny { reason } => {
            let mut end = reason.len().min(MAX_REASON_LEN);
            while !reason.is_char_boundary(end) {
                end -= 1;
            }
            buf.put_u16_le(end as u16);
            buf.put_slice(&reason.as_bytes()[..end]);
        }
        Frame::Disconnect | Frame::DisconnectAck | Frame::Ack => {}
        Frame::Ping { timestamp_ms } | Frame::Pong { timestamp_ms } => {
            buf.put_u64_le(*timestamp_ms)
        }
        Frame::Payload(payload) => {
            buf.put_u8(payload.channel);
            buf.put_u8(payload.flags.bits());
            buf.put_u32_le(payload.send_id);
            buf.put_u16_le(payload.order);
            buf.put_u16_le(payload.group);
            buf.put_u16_le(payload.index);
            buf.put_u16_le(payload.count);
            buf.put_slice(&payload.body);
        }
    }

    buf.freeze()
}

/// Parses one datagram. Anything with a bad magic, an unknown frame kind or
/// truncated fields yields `None` and is discarded by the caller.
pub fn decode_datagram(data: &[u8]) -> Option<(DatagramHeader, Frame)> {
    let mut buf = data;
    if buf.remaining() < HEADER_LEN || buf.get_u32_le() != PROTOCOL_MAGIC {
        return None;
    }

    let header = DatagramHeader {
        sequence: buf.get_u32_le(),
        ack: buf.get_u32_le(),
        ack_bitfield: buf.get_u32_le(),
    };
    let kind = buf.get_u8();

    let frame = match kind {
        1 => {
            need(&buf, 9)?;
            Frame::Connect {
                salt: buf.get_u64_le(),
                channels: buf.get_u8(),
            }
        }
        2 => {
            need(&buf, 16)?;
            Frame::Challenge {
                server_salt: buf.get_u64_le(),
                challenge: buf.get_u64_le(),
            }
        }
        3 => {
            need(&buf, 8)?;
            Frame::Response {
                combined: buf.get_u64_le(),
            }
        }
        4 => {
            need(&buf, 5)?;
            Frame::Accept {
                peer_id: buf.get_u32_le(),
                channels: buf.get_u8(),
            }
        }
        5 => {
            need(&buf, 2)?;
            let len = buf.get_u16_le() as usize;
            need(&buf, len)?;
            let reason = String::from_utf8_lossy(&buf[..len]).into_owned();
            Frame::Deny { reason }
        }
        6 => Frame::Disconnect,
        7 => Frame::DisconnectAck,
        8 | 9 => {
            need(&buf, 8)?;
            let timestamp_ms = buf.get_u64_le();
            if kind == 8 {
                Frame::Ping { timestamp_ms }
            } else {
                Frame::Pong { timestamp_ms }
            }
        }
        10 => Frame::Ack,
        11 => {
            need(&buf, PAYLOAD_HEADER_LEN)?;
            let channel = buf.get_u8();
            let flags = NetFlags::from_wire(buf.get_u8())?;
            let send_id = buf.get_u32_le();
            let order = buf.get_u16_le();
            let group = buf.get_u16_le();
            let index = buf.get_u16_le();
            let count = buf.get_u16_le();
            if count == 0 || index >= count {
                return None;
            }
            Frame::Payload(PayloadFrame {
                channel,
                flags,
                send_id,
                order,
                group,
                index,
                count,
                body: Bytes::copy_from_slice(buf),
            })
        }
        _ => return None,
    };

    Some((header, frame))
}

fn need(buf: &&[u8], len: usize) -> Option<()> {
    (buf.remaining() >= len).then_some(())
}
