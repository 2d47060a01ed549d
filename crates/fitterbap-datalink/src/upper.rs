//! The callback surface the datalink drives (`spec.md` §2, §6): an
//! `event_fn` for connection-lifecycle notifications and a `recv_fn`
//! for in-order message delivery. Generalizes the teacher's
//! `SplitBus::poll(recvf)` closure-per-call pattern into a
//! long-lived, registered handler, since this protocol also needs to
//! deliver out-of-band connection events that a single closure
//! argument can't carry (`spec.md` §9: "replace [function pointers]
//! with trait objects or explicit enums").

/// Connection-lifecycle notifications a caller may see. `Disconnected`,
/// `Connected`, and `ResetRequest` are fired by the datalink itself on a
/// genuine local connection-state transition (`spec.md` §4.3, §7:
/// "the upper layer sees only connected, disconnected, reset_request,
/// and in-order `recv_fn` deliveries"). `TransportConnected` and
/// `AppConnected` are never emitted by the datalink itself — they exist
/// so `fitterbap-transport` (and layers above it) can inject synthetic
/// events through the same channel (`spec.md` §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpperEvent {
    Disconnected,
    Connected,
    ResetRequest,
    TransportConnected,
    AppConnected,
}

/// Implemented by whatever sits above the datalink — directly by
/// `fitterbap-transport`'s port demultiplexer, or by a test double
/// that just records calls.
pub trait UpperLayer {
    fn event_fn(&mut self, event: UpperEvent);
    fn recv_fn(&mut self, metadata: u16, msg: &[u8]);
}
