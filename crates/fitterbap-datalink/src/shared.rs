//! The state guarded by the datalink's optional mutex (`spec.md` §5):
//! connection state, both sliding windows, and the link-frame egress
//! ring. Kept as one `Lock`-wrapped struct so `send` (possibly called
//! from another task) and `process`/`ll_recv` (the driver task) always
//! see a consistent snapshot.

use ringbuffer::{ConstGenericRingBuffer, RingBuffer};

use fitterbap_common::time::Timestamp;
use fitterbap_framer::LINK_FRAME_SIZE;

use crate::rx::RxSlot;
use crate::tx::TxSlot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Disconnected,
    Connected,
}

pub struct Shared<const TXN: usize, const RXN: usize, const RING: usize> {
    pub conn: ConnState,

    pub tx_frame_last_id: u16,
    pub tx_frame_next_id: u16,
    pub tx_frame_count: u16,
    pub tx_frame_count_max: u16,
    pub tx_slots: [TxSlot; TXN],

    pub rx_next_frame_id: u16,
    pub rx_max_frame_id: u16,
    pub rx_frame_count: u16,
    pub rx_slots: [RxSlot; RXN],

    pub link_ring: ConstGenericRingBuffer<[u8; LINK_FRAME_SIZE], RING>,
    pub tx_reset_last: Timestamp,

    /// Set while `ll_recv` notices a DATA frame whose header CRC
    /// validated but whose payload hasn't fully arrived; cleared once
    /// the frame completes. Backs the optional inactivity timeout
    /// (`SPEC_FULL.md` §4.3).
    pub header_stall_since: Option<Timestamp>,
}

impl<const TXN: usize, const RXN: usize, const RING: usize> Shared<TXN, RXN, RING> {
    pub fn new(tx_frame_count_max: u16, rx_frame_count: u16) -> Self {
        Shared {
            conn: ConnState::Disconnected,
            tx_frame_last_id: 0,
            tx_frame_next_id: 0,
            tx_frame_count: 1,
            tx_frame_count_max,
            tx_slots: [TxSlot::empty(); TXN],
            rx_next_frame_id: 0,
            rx_max_frame_id: 0,
            rx_frame_count,
            rx_slots: [RxSlot::empty(); RXN],
            link_ring: ConstGenericRingBuffer::new(),
            // `Timestamp::MIN` rather than `0` so the very first
            // `process` call sends RESET(0) immediately regardless of
            // what the clock reads at startup, rather than waiting a
            // full `reset_retry_interval`.
            tx_reset_last: Timestamp::MIN,
            header_stall_since: None,
        }
    }

    /// Restores both windows and frame ids to zero, as required after
    /// either side of the RESET handshake completes (`spec.md` §4.3).
    pub fn reset_windows(&mut self) {
        self.tx_frame_last_id = 0;
        self.tx_frame_next_id = 0;
        self.tx_frame_count = 1;
        for slot in self.tx_slots.iter_mut() {
            slot.reset();
        }
        self.rx_next_frame_id = 0;
        self.rx_max_frame_id = 0;
        for slot in self.rx_slots.iter_mut() {
            *slot = RxSlot::empty();
        }
        self.link_ring.clear();
        self.header_stall_since = None;
    }

    /// Slot index for `frame_id` within the *negotiated* TX window
    /// (`spec.md` §4.3: `frame_id & (tx_frame_count - 1)`), which may be
    /// smaller than the slot array's compile-time capacity `TXN` while
    /// the window hasn't been raised yet.
    pub fn tx_index(&self, frame_id: u16) -> usize {
        (frame_id & (self.tx_frame_count - 1)) as usize
    }

    /// Slot index for `frame_id` within the RX window
    /// (`spec.md` §4.3: `frame_id & (rx_window_size - 1)`).
    pub fn rx_index(&self, frame_id: u16) -> usize {
        (frame_id & (self.rx_frame_count - 1)) as usize
    }
}
