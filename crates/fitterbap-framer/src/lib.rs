#![cfg_attr(not(test), no_std)]

//! The framer: construction of on-wire DATA and link frames, and the
//! decoder state machine that turns an arbitrarily-chopped byte stream
//! back into frame events. See `spec.md` §4.1.

pub mod crc;
pub mod decoder;
pub mod encoder;
pub mod frame;
pub mod status;

pub use decoder::FrameDecoder;
pub use encoder::{construct_data, construct_link};
pub use frame::{
    FrameType, FramerEvent, FramingErrorKind, DATA_FRAME_MAX, FRAME_ID_MODULUS, LINK_FRAME_SIZE,
    PAYLOAD_MAX, SOF1, SOF2,
};
pub use status::FramerStatus;
