//! The byte-level decoder state machine (`spec.md` §4.1). Bytes are
//! fed in one slice at a time; every recognized frame, and every
//! framing error, is reported through a callback so the datalink never
//! has to buffer a second copy of anything.

use fitterbap_common::{dev_warn};

use crate::crc::{header_crc8, payload_crc32};
use crate::frame::{
    unpack_header, FrameType, FramerEvent, FramingErrorKind, LINK_FRAME_SIZE, RESYNC_BUFFER_CAP,
    SOF1, SOF2,
};
use crate::status::FramerStatus;

/// Decodes a byte stream into [`FramerEvent`]s. Stateless across
/// successfully decoded frames; the only state carried between `feed`
/// calls is the resync buffer holding bytes of an in-progress or
/// not-yet-aligned frame.
pub struct FrameDecoder {
    buf: [u8; RESYNC_BUFFER_CAP],
    len: usize,
    status: FramerStatus,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub const fn new() -> Self {
        FrameDecoder {
            buf: [0u8; RESYNC_BUFFER_CAP],
            len: 0,
            status: FramerStatus::new(),
        }
    }

    pub fn status(&self) -> FramerStatus {
        self.status
    }

    pub fn status_clear(&mut self) {
        self.status = FramerStatus::new();
    }

    /// Reports the frame id of an in-progress DATA frame whose header
    /// CRC already validated but whose payload hasn't fully arrived,
    /// for an optional caller-driven inactivity timeout
    /// (`SPEC_FULL.md` §4.3). Read-only: never mutates decoder state
    /// or bumps a counter.
    pub fn awaiting_payload_frame_id(&self) -> Option<u16> {
        if self.len < 6 {
            return None;
        }
        if self.buf[0] != SOF1 || self.buf[1] != SOF2 {
            return None;
        }
        let header = u16::from_le_bytes([self.buf[2], self.buf[3]]);
        let (type_bits, frame_id) = unpack_header(header);
        if FrameType::from_bits(type_bits) != Some(FrameType::Data) {
            return None;
        }
        if self.buf[5] != header_crc8(&self.buf[2..5]) {
            return None;
        }
        let length = self.buf[4] as usize + 1;
        let total = 6 + length + 4;
        if self.len < total {
            Some(frame_id)
        } else {
            None
        }
    }

    /// Discards whatever is currently buffered — an in-progress frame
    /// that hasn't completed — and resets to the search state. Used
    /// only by an optional inactivity timeout layered above this
    /// decoder; never invoked while a complete, CRC-valid frame sits
    /// in the buffer.
    pub fn flush(&mut self) {
        if self.len > 0 {
            self.status.ignored_bytes += self.len as u32;
            self.status.resync_count += 1;
        }
        self.len = 0;
    }

    /// Feeds `bytes` into the decoder, invoking `on_event` once per
    /// recognized frame or framing error. May call `on_event` any
    /// number of times (including zero) per call.
    pub fn feed(&mut self, bytes: &[u8], mut on_event: impl FnMut(FramerEvent)) {
        for &byte in bytes {
            self.push_byte(byte);
            self.status.total_bytes += 1;
            self.drain(&mut on_event);
        }
    }

    fn push_byte(&mut self, byte: u8) {
        if self.len == self.buf.len() {
            // The buffer is full of bytes we haven't been able to
            // align on a frame boundary with. Drop the oldest one to
            // make room rather than lose the newest.
            self.drop_front(1);
            self.status.resync_count += 1;
        }
        self.buf[self.len] = byte;
        self.len += 1;
    }

    fn drop_front(&mut self, n: usize) {
        debug_assert!(n <= self.len);
        self.buf.copy_within(n..self.len, 0);
        self.len -= n;
        self.status.ignored_bytes += n as u32;
    }

    /// Attempts to parse as many complete frames as currently sit in
    /// the buffer, reporting a framing error and advancing exactly one
    /// byte on any structural or CRC failure (`spec.md` §4.1).
    fn drain(&mut self, on_event: &mut impl FnMut(FramerEvent)) {
        loop {
            if self.len == 0 {
                return;
            }
            if self.buf[0] != SOF1 {
                self.drop_front(1);
                continue;
            }
            if self.len < 2 {
                return;
            }
            if self.buf[1] == SOF1 {
                // Two consecutive SOF1 bytes: the peer's idle flush
                // marker. Drop only the first one; the second stays
                // as the candidate start of the next frame.
                self.drop_front(1);
                continue;
            }
            if self.buf[1] != SOF2 {
                self.drop_front(1);
                continue;
            }
            // buf[0..2] == SOF1, SOF2: a real frame candidate.
            if self.len < 4 {
                return;
            }
            let header = u16::from_le_bytes([self.buf[2], self.buf[3]]);
            let (type_bits, frame_id) = unpack_header(header);
            let frame_type = match FrameType::from_bits(type_bits) {
                Some(t) => t,
                None => {
                    self.status.resync_count += 1;
                    dev_warn!("framer: unknown frame type {}", type_bits);
                    on_event(FramerEvent::FramingError {
                        kind: FramingErrorKind::UnknownFrameType,
                        frame_id: None,
                    });
                    self.drop_front(1);
                    continue;
                }
            };

            if frame_type.is_data() {
                if !self.try_parse_data(frame_id, on_event) {
                    return;
                }
            } else if !self.try_parse_link(frame_type, frame_id, on_event) {
                return;
            }
        }
    }

    /// Returns `false` if more bytes are needed before a decision can
    /// be made; `true` if it made progress (consumed bytes, whether by
    /// emitting a frame or a framing error).
    fn try_parse_data(&mut self, frame_id: u16, on_event: &mut impl FnMut(FramerEvent)) -> bool {
        if self.len < 6 {
            return false;
        }
        let length = self.buf[4] as usize + 1;
        let expected_crc = header_crc8(&self.buf[2..5]);
        if self.buf[5] != expected_crc {
            self.status.header_crc_errors += 1;
            self.status.resync_count += 1;
            dev_warn!("framer: header CRC mismatch for candidate frame {}", frame_id);
            on_event(FramerEvent::FramingError {
                kind: FramingErrorKind::HeaderCrcMismatch,
                frame_id: None,
            });
            self.drop_front(1);
            return true;
        }

        let total = 6 + length + 4;
        if self.len < total {
            return false;
        }

        let body_end = 6 + 2 + length;
        let expected_payload_crc = payload_crc32(&self.buf[6..body_end]);
        let actual_payload_crc = u32::from_le_bytes([
            self.buf[body_end],
            self.buf[body_end + 1],
            self.buf[body_end + 2],
            self.buf[body_end + 3],
        ]);

        if actual_payload_crc != expected_payload_crc {
            self.status.payload_crc_errors += 1;
            self.status.resync_count += 1;
            dev_warn!("framer: payload CRC mismatch for frame {}", frame_id);
            on_event(FramerEvent::FramingError {
                kind: FramingErrorKind::PayloadCrcMismatch,
                frame_id: Some(frame_id),
            });
            self.drop_front(1);
            return true;
        }

        let metadata = u16::from_le_bytes([self.buf[6], self.buf[7]]);
        {
            let payload = &self.buf[8..8 + length];
            on_event(FramerEvent::Data {
                frame_id,
                metadata,
                payload,
            });
        }
        self.drop_front(total);
        true
    }

    fn try_parse_link(
        &mut self,
        frame_type: FrameType,
        frame_id: u16,
        on_event: &mut impl FnMut(FramerEvent),
    ) -> bool {
        if self.len < 5 {
            return false;
        }
        let expected_crc = header_crc8(&self.buf[2..4]);
        if self.buf[4] != expected_crc {
            self.status.header_crc_errors += 1;
            self.status.resync_count += 1;
            dev_warn!("framer: header CRC mismatch for link frame {:?}", frame_type);
            on_event(FramerEvent::FramingError {
                kind: FramingErrorKind::HeaderCrcMismatch,
                frame_id: None,
            });
            self.drop_front(1);
            return true;
        }

        if self.len < LINK_FRAME_SIZE {
            return false;
        }

        on_event(FramerEvent::Link { frame_type, frame_id });
        self.drop_front(LINK_FRAME_SIZE);
        true
    }
}
