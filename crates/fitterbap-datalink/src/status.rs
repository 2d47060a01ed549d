//! Observability counters (`spec.md` §6, "Status structure").

use fitterbap_framer::FramerStatus;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxStatus {
    pub data_frames: u32,
    pub link_frames: u32,
    pub retransmissions: u32,
    pub resets: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RxStatus {
    pub data_frames: u32,
    pub link_frames: u32,
    pub duplicates: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DatalinkStatus {
    pub tx: TxStatus,
    pub rx: RxStatus,
    /// The framer's own byte-level counters, folded in so a caller can
    /// read everything through one `status_get` call.
    pub framer: FramerStatus,
}
