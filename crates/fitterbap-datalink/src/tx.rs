//! Transmit-window slot (`spec.md` §3, "Transmit slot").

use fitterbap_common::time::Timestamp;
use fitterbap_framer::DATA_FRAME_MAX;

/// Slots start `Idle`, are filled and marked `Send` by `Datalink::send`,
/// move to `Sent` once handed to the lower layer, and to `Ack` when a
/// selective ACK names them (final retirement still waits for every
/// older id to retire, per `spec.md` §5's ordering guarantee).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Idle,
    Send,
    Sent,
    Ack,
}

#[derive(Clone, Copy)]
pub struct TxSlot {
    pub state: TxState,
    pub last_send_time: Timestamp,
    pub send_count: u8,
    pub frame_bytes: [u8; DATA_FRAME_MAX],
    pub frame_len: u16,
}

impl TxSlot {
    pub const fn empty() -> Self {
        TxSlot {
            state: TxState::Idle,
            last_send_time: 0,
            send_count: 0,
            frame_bytes: [0u8; DATA_FRAME_MAX],
            frame_len: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = TxSlot::empty();
    }

    pub fn frame(&self) -> &[u8] {
        &self.frame_bytes[..self.frame_len as usize]
    }
}
