//! The two CRCs the wire format relies on (`spec.md` §6). Grounded in
//! the teacher's own use of the `crc` crate for its single frame CRC-8
//! (`dxkb-split-link::SPLIT_BUS_CRC`), extended with the payload
//! CRC-32 this protocol additionally needs.

use crc::Table;

/// Header CRC-8. `spec.md` names "CRC-8-CCITT, poly 0x07, init 0",
/// which is exactly the parameter set the `crc` crate ships as
/// `CRC_8_SMBUS` (poly 0x07, init 0x00, no reflection, xorout 0x00).
const HEADER_CRC: crc::Crc<u8, Table<1>> = crc::Crc::<u8, Table<1>>::new(&crc::CRC_8_SMBUS);

/// Payload CRC-32. `spec.md` names "CRC-32 (IEEE 802.3 poly
/// 0x04C11DB7, init 0xFFFFFFFF, final XOR 0xFFFFFFFF)" without stating
/// bit reflection; `CRC_32_ISO_HDLC` is the parameter set universally
/// shipped under that description (Ethernet FCS, zlib's `crc32`), so
/// that is the one used here.
const PAYLOAD_CRC: crc::Crc<u32, Table<1>> = crc::Crc::<u32, Table<1>>::new(&crc::CRC_32_ISO_HDLC);

#[inline]
pub fn header_crc8(bytes: &[u8]) -> u8 {
    HEADER_CRC.checksum(bytes)
}

#[inline]
pub fn payload_crc32(bytes: &[u8]) -> u32 {
    PAYLOAD_CRC.checksum(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_crc_is_deterministic() {
        let a = header_crc8(&[1, 2, 3]);
        let b = header_crc8(&[1, 2, 3]);
        assert_eq!(a, b);
        assert_ne!(a, header_crc8(&[1, 2, 4]));
    }

    #[test]
    fn payload_crc_is_deterministic() {
        let a = payload_crc32(b"hello world");
        let b = payload_crc32(b"hello world");
        assert_eq!(a, b);
        assert_ne!(a, payload_crc32(b"hello worle"));
    }
}
