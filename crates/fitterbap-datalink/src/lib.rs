#![cfg_attr(not(test), no_std)]

//! The reliable-delivery layer: 11-bit wrapping frame ids, TX/RX
//! sliding windows, the RESET connection handshake, retransmission
//! timers, and link-frame egress, built on top of `fitterbap-framer`'s
//! wire format and `fitterbap-event`'s timer queue (`spec.md` §2, §4.3).

pub mod config;
pub mod datalink;
pub mod frame_id;
pub mod rx;
pub mod shared;
pub mod status;
pub mod tx;
pub mod upper;

pub use config::{DatalinkConfig, WindowSize};
pub use datalink::{Datalink, EventKind, NullDatalink};
pub use shared::{ConnState, Shared};
pub use status::{DatalinkStatus, RxStatus, TxStatus};
pub use upper::{UpperEvent, UpperLayer};
