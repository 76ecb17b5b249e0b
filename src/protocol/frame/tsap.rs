use super::super::error::{Error, Result};
use serde_repr::{Deserialize_repr, Serialize_repr};

/// Transport service access point, `(high, low)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tsap(pub u8, pub u8);

impl From<Tsap> for u16 {
    #[inline]
    fn from(tsap: Tsap) -> Self {
        ((tsap.0 as u16) << 8) | (tsap.1 as u16)
    }
}

impl From<u16> for Tsap {
    #[inline]
    fn from(v: u16) -> Self {
        Tsap((v >> 8) as u8, (v & 0xFF) as u8)
    }
}

/// Role the client announces in the remote TSAP high byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum ConnectionType {
    /// Programming device
    #[default]
    Pg = 1,
    /// Operator panel
    Op = 2,
    S7Basic = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TsapPair {
    pub local: Tsap,
    pub remote: Tsap,
}

impl Default for TsapPair {
    fn default() -> Self {
        Self {
            local: Tsap(0x01, 0x00),
            remote: Tsap(0x01, 0x00),
        }
    }
}

impl TsapPair {
    /// Local 0x0100, remote `(type << 8) | rack * 0x20 + slot`.
    pub fn from_rack_slot(connection_type: ConnectionType, rack: u8, slot: u8) -> Result<Self> {
        if rack > 0x0F {
            return Err(Error::InvalidRack(rack));
        }
        if slot > 0x1F {
            return Err(Error::InvalidSlot(slot));
        }
        // racks above 7 carry into the high byte
        let remote = ((connection_type as u16) << 8) + rack as u16 * 0x20 + slot as u16;
        Ok(TsapPair {
            local: Tsap(0x01, 0x00),
            remote: Tsap::from(remote),
        })
    }
}
