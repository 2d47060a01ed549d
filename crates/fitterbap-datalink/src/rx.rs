//! Receive-window slot (`spec.md` §3, "Receive slot").

use fitterbap_framer::PAYLOAD_MAX;

/// `Nack` marks a gap slot that has already been NACKed once, so the
/// RX path doesn't re-NACK it on every subsequent out-of-order arrival
/// (`spec.md` §4.3, RX path, "Otherwise future-in-window").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxState {
    Idle,
    Ack,
    Nack,
}

#[derive(Clone, Copy)]
pub struct RxSlot {
    pub state: RxState,
    pub frame_id: u16,
    pub metadata: u16,
    pub payload: [u8; PAYLOAD_MAX],
    pub payload_len: u16,
}

impl RxSlot {
    pub const fn empty() -> Self {
        RxSlot {
            state: RxState::Idle,
            frame_id: 0,
            metadata: 0,
            payload: [0u8; PAYLOAD_MAX],
            payload_len: 0,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.payload_len as usize]
    }
}
