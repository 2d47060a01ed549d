//! The 16-bit metadata packing (`spec.md` §4.4):
//! `bits 0-5 = port_id`, `bits 6-7 = seq`, `bits 8-15 = port_data`.

use fitterbap_common::error::ParamError;

/// Highest valid port id, inclusive.
pub const PORT_MAX: u8 = 63;

/// A validated port id in `0..=PORT_MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortId(u8);

impl PortId {
    pub const fn new(value: u8) -> Result<Self, ParamError> {
        if value > PORT_MAX {
            Err(ParamError::PortIdOutOfRange)
        } else {
            Ok(PortId(value))
        }
    }

    /// Builds a `PortId` from the already-masked 6-bit field of a
    /// decoded metadata word, which is always in range by construction.
    const fn from_field(masked: u8) -> Self {
        PortId(masked & PORT_MAX)
    }

    pub const fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for PortId {
    type Error = ParamError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        PortId::new(value)
    }
}

/// The 2-bit segmentation marker packed alongside a message's metadata.
/// `spec.md` §4.4 names the field but not its use beyond pass-through;
/// a port handler that segments large messages across several
/// transfers decides what `Start`/`Middle`/`Stop` mean for its own
/// protocol, the way `dxkb-core`'s HID report plumbing treats an
/// opaque report-type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Seq {
    Middle = 0,
    Stop = 1,
    Start = 2,
    Single = 3,
}

impl Seq {
    const fn from_bits(bits: u8) -> Self {
        match bits & 0x3 {
            0 => Seq::Middle,
            1 => Seq::Stop,
            2 => Seq::Start,
            _ => Seq::Single,
        }
    }
}

/// The opaque 8-bit tag passed through to the port untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct PortData(pub u8);

/// Packs `(port_id, seq, port_data)` into the 16-bit metadata word
/// the datalink carries per `DATA` frame.
pub const fn pack_metadata(port_id: PortId, seq: Seq, port_data: PortData) -> u16 {
    (port_id.get() as u16) | ((seq as u16) << 6) | ((port_data.0 as u16) << 8)
}

/// The inverse of [`pack_metadata`]. Never fails: every 16-bit value
/// unpacks to some `(PortId, Seq, PortData)` triple, since the 6-bit
/// port field is always `<= PORT_MAX` once masked.
pub const fn unpack_metadata(metadata: u16) -> (PortId, Seq, PortData) {
    let port_id = PortId::from_field((metadata & 0x3F) as u8);
    let seq = Seq::from_bits(((metadata >> 6) & 0x3) as u8);
    let port_data = PortData((metadata >> 8) as u8);
    (port_id, seq, port_data)
}
