//! The sole capability `Transport::send` needs from whatever sits
//! below it: enqueueing an already-packed metadata word plus a
//! message. A dedicated trait (rather than naming `Datalink`'s full
//! generic signature at every call site) mirrors `fitterbap_common::link::LowerLink`'s
//! "smallest capability set" shape one layer up the stack.

use fitterbap_common::error::FitterbapError;
use fitterbap_common::link::LowerLink;
use fitterbap_common::lock::Lock;
use fitterbap_common::time::{Clock, Timestamp};
use fitterbap_datalink::{Datalink, Shared, UpperLayer};
use fitterbap_event::Inner as EventInner;

pub trait FrameSender {
    fn send_frame(&mut self, metadata: u16, msg: &[u8], timeout: Timestamp) -> Result<(), FitterbapError>;
}

impl<LL, CK, UP, SL, EL, const TXN: usize, const RXN: usize, const RING: usize, const EVN: usize> FrameSender
    for Datalink<LL, CK, UP, SL, EL, TXN, RXN, RING, EVN>
where
    LL: LowerLink,
    CK: Clock,
    UP: UpperLayer,
    SL: Lock<Shared<TXN, RXN, RING>>,
    EL: Lock<EventInner<fitterbap_datalink::EventKind, EVN>>,
{
    fn send_frame(&mut self, metadata: u16, msg: &[u8], timeout: Timestamp) -> Result<(), FitterbapError> {
        self.send(metadata, msg, timeout)
    }
}
