//! Frame construction (`spec.md` §4.1, "Construct operations").

use fitterbap_common::error::ParamError;

use crate::crc::{header_crc8, payload_crc32};
use crate::frame::{pack_header, FrameType, FRAME_ID_MODULUS, LINK_FRAME_SIZE, PAYLOAD_MAX, SOF1, SOF2};

/// Writes a fully framed DATA frame into `buf` and returns the number
/// of bytes written. Fails without writing anything if `frame_id` is
/// out of range or the payload size is not in `1..=256`.
pub fn construct_data(
    buf: &mut [u8],
    frame_id: u16,
    metadata: u16,
    payload: &[u8],
) -> Result<usize, ParamError> {
    if frame_id >= FRAME_ID_MODULUS {
        return Err(ParamError::FrameIdOutOfRange);
    }
    if payload.is_empty() {
        return Err(ParamError::PayloadEmpty);
    }
    if payload.len() > PAYLOAD_MAX {
        return Err(ParamError::PayloadTooLarge);
    }

    let total = payload.len() + 12;
    if buf.len() < total {
        // Not a protocol error: the caller handed us too small a
        // scratch buffer. Treated the same as any other malformed
        // request, since there is nothing sensible to write.
        return Err(ParamError::PayloadTooLarge);
    }

    let header = pack_header(FrameType::Data, frame_id);
    let header_bytes = header.to_le_bytes();
    let length_byte = (payload.len() - 1) as u8;

    buf[0] = SOF1;
    buf[1] = SOF2;
    buf[2] = header_bytes[0];
    buf[3] = header_bytes[1];
    buf[4] = length_byte;
    buf[5] = header_crc8(&buf[2..5]);

    let metadata_bytes = metadata.to_le_bytes();
    buf[6] = metadata_bytes[0];
    buf[7] = metadata_bytes[1];
    buf[8..8 + payload.len()].copy_from_slice(payload);

    let crc = payload_crc32(&buf[6..8 + payload.len()]);
    let crc_bytes = crc.to_le_bytes();
    buf[8 + payload.len()..12 + payload.len()].copy_from_slice(&crc_bytes);

    Ok(total)
}

/// Writes a fully framed link (control) frame into `buf`. `frame_id`
/// doubles as the RESET `role` field for `FrameType::Reset`. Always
/// writes exactly [`LINK_FRAME_SIZE`] bytes on success.
pub fn construct_link(buf: &mut [u8], frame_type: FrameType, frame_id: u16) -> Result<usize, ParamError> {
    if frame_type.is_data() {
        return Err(ParamError::UnknownFrameType);
    }
    if frame_id >= FRAME_ID_MODULUS {
        return Err(ParamError::FrameIdOutOfRange);
    }
    if buf.len() < LINK_FRAME_SIZE {
        return Err(ParamError::PayloadTooLarge);
    }

    let header = pack_header(frame_type, frame_id);
    let header_bytes = header.to_le_bytes();

    buf[0] = SOF1;
    buf[1] = SOF2;
    buf[2] = header_bytes[0];
    buf[3] = header_bytes[1];
    buf[4] = header_crc8(&buf[2..4]);
    buf[5] = 0;
    buf[6] = 0;
    buf[7] = 0;

    Ok(LINK_FRAME_SIZE)
}
