use bitflags::bitflags;

use super::error::NetError;

bitflags! {
    /// Per-send delivery flags. Empty flags mean unreliable but sequenced.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct NetFlags: u8 {
        const RELIABLE = 1;
        const UNSEQUENCED = 2;
        const UNRELIABLE = 4;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Reliable,
    Sequenced,
    Unsequenced,
}

impl NetFlags {
    pub fn delivery(self) -> Result<Delivery, NetError> {
        if self.contains(Self::RELIABLE | Self::UNSEQUENCED)
            || self.contains(Self::RELIABLE | Self::UNRELIABLE)
        {
            return Err(NetError::InvalidFlags(self));
        }

        if self.contains(Self::RELIABLE) {
            Ok(Delivery::Reliable)
        } else if self.contains(Self::UNSEQUENCED) {
            Ok(Delivery::Unsequenced)
        } else {
            Ok(Delivery::Sequenced)
        }
    }

    pub(crate) fn from_wire(bits: u8) -> Option<Self> {
        let flags = Self::from_bits(bits)?;
        flags.delivery().ok().map(|_| flags)
    }
}
