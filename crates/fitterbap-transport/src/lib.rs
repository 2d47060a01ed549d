#![cfg_attr(not(test), no_std)]

//! The stateless demultiplexer above the datalink (`spec.md` §4.4): it
//! splits the 16-bit per-frame metadata field into `(port_id, seq,
//! port_data)` and dispatches to per-port handlers, with a default
//! handler fallback and pass-through for connection events.

pub mod metadata;
pub mod port;
pub mod sender;

pub use metadata::{PortData, PortId, Seq, PORT_MAX};
pub use port::{PortHandler, Transport, PORT_COUNT};
pub use sender::FrameSender;

// Re-exported so a consumer building a `PortHandler` only needs this
// one crate, not also `fitterbap-datalink`, for the event enum.
pub use fitterbap_datalink::UpperEvent;
