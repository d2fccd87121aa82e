use bytes::Bytes;

/// An immutable application packet. The first byte is the packet-type tag.
/// `id` is the sender's send counter, filled in by the transport on receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    id: u32,
    data: Bytes,
}

impl Packet {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            id: 0,
            data: data.into(),
        }
    }

    pub(crate) fn with_id(id: u32, data: Bytes) -> Self {
        Self { id, data }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn type_tag(&self) -> Option<u8> {
        self.data.first().copied()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn bytes(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
