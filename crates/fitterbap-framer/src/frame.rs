//! Wire constants and the types that describe a decoded frame
//! (`spec.md` §4.1, §6).

/// First start-of-frame byte.
pub const SOF1: u8 = 0xAA;
/// Second start-of-frame byte.
pub const SOF2: u8 = 0x55;

/// Largest DATA payload, in bytes (`spec.md` §3).
pub const PAYLOAD_MAX: usize = 256;

/// Bytes of framing overhead around a DATA payload: 2 SOF + 2 header +
/// 1 length + 1 header CRC + 2 metadata + 4 payload CRC.
pub const DATA_OVERHEAD: usize = 12;

/// Largest a fully framed DATA frame can be (`spec.md` §6).
pub const DATA_FRAME_MAX: usize = PAYLOAD_MAX + DATA_OVERHEAD;

/// Every link frame (ACK/NACK/RESET) occupies exactly this many wire
/// bytes: 2 SOF + 2 header + 1 header CRC + 3 reserved padding bytes,
/// chosen so link frames can be queued and copied as fixed-size
/// records (`spec.md` §6, "so the implementation can queue them as
/// machine words").
pub const LINK_FRAME_SIZE: usize = 8;

/// Capacity of the decoder's resync buffer. Sized to hold exactly one
/// maximum-size DATA frame, matching `spec.md` §4.1's "small rotating
/// byte buffer of size `PAYLOAD_MAX + OVERHEAD`".
pub const RESYNC_BUFFER_CAP: usize = DATA_FRAME_MAX;

/// Highest valid 11-bit frame id, exclusive.
pub const FRAME_ID_MODULUS: u16 = 2048;

/// The 5-bit frame-type field packed into the header word alongside
/// the 11-bit frame id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    Data = 0,
    AckAll = 1,
    AckOne = 2,
    NackFrameId = 3,
    NackFramingError = 4,
    Reset = 5,
}

impl FrameType {
    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(FrameType::Data),
            1 => Some(FrameType::AckAll),
            2 => Some(FrameType::AckOne),
            3 => Some(FrameType::NackFrameId),
            4 => Some(FrameType::NackFramingError),
            5 => Some(FrameType::Reset),
            _ => None,
        }
    }

    pub const fn is_data(self) -> bool {
        matches!(self, FrameType::Data)
    }
}

/// Packs/unpacks the 16-bit header word: bits 0-10 are the frame id,
/// bits 11-15 are the frame type.
#[inline]
pub const fn pack_header(frame_type: FrameType, frame_id: u16) -> u16 {
    ((frame_type as u16) << 11) | (frame_id & 0x07FF)
}

#[inline]
pub const fn unpack_header(word: u16) -> (u8, u16) {
    ((word >> 11) as u8, word & 0x07FF)
}

/// A structural or CRC failure surfaced during decode. Never escapes
/// the framer as a `Result` error — see `spec.md` §7 — it is only used
/// to pick the `FramerEvent::FramingError` variant and bump a counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingErrorKind {
    HeaderCrcMismatch,
    PayloadCrcMismatch,
    UnknownFrameType,
}

/// One decoded wire event. Lifetime `'a` ties a `Data` payload to the
/// decoder's internal buffer for the duration of the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerEvent<'a> {
    Data {
        frame_id: u16,
        metadata: u16,
        payload: &'a [u8],
    },
    Link {
        frame_type: FrameType,
        frame_id: u16,
    },
    FramingError {
        kind: FramingErrorKind,
        /// Known only when the header CRC validated but something
        /// downstream of it (the payload CRC) failed.
        frame_id: Option<u16>,
    },
}
