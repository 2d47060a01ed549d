//! The port table and the `Transport` demultiplexer itself
//! (`spec.md` §4.4). `Transport` is registered directly as a
//! `Datalink`'s `UpperLayer` (`SPEC_FULL.md` §4.4) — it never owns the
//! datalink, since `Datalink::register_upper_layer` takes its upper
//! layer by value and a `Transport` can't hold a reference back to its
//! own owner. Outbound sends instead go through [`crate::FrameSender`],
//! implemented on `Datalink` so `Transport::send` can be called with
//! whichever datalink instance the caller is holding.

use fitterbap_common::error::{FitterbapError, ParamError};
use fitterbap_common::time::Timestamp;
use fitterbap_datalink::UpperEvent;

use crate::metadata::{pack_metadata, unpack_metadata, PortData, PortId, Seq, PORT_MAX};
use crate::sender::FrameSender;

/// Number of addressable ports: `PORT_MAX + 1`.
pub const PORT_COUNT: usize = PORT_MAX as usize + 1;

/// Implemented by whatever a port registers to receive its traffic —
/// the per-port analogue of `fitterbap_datalink::UpperLayer` one layer
/// up (`SPEC_FULL.md` §4.4).
pub trait PortHandler {
    fn event_fn(&mut self, event: UpperEvent);
    fn recv_fn(&mut self, seq: Seq, port_data: PortData, msg: &[u8]);
}

struct PortEntry<H> {
    handler: H,
    meta_string: &'static str,
}

/// The port demultiplexer. `H` is the concrete `PortHandler` type every
/// registered port uses — like `Datalink`, there is no allocator to
/// box a heterogeneous handler set behind, so callers that need
/// different handler types per port compose them into one enum that
/// implements `PortHandler` and dispatches internally, the same way
/// `Datalink`'s own `UpperLayer` is a single concrete type.
pub struct Transport<H: PortHandler> {
    ports: [Option<PortEntry<H>>; PORT_COUNT],
    default_port: Option<PortEntry<H>>,
    /// The latest connection-state-changing event, replayed to a port
    /// immediately on `port_register` (`spec.md` §4.4: "On
    /// `port_register`, the latest known connection event is replayed
    /// to the new registrant immediately").
    last_event: Option<UpperEvent>,
}

impl<H: PortHandler> Default for Transport<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: PortHandler> Transport<H> {
    pub fn new() -> Self {
        Transport {
            ports: core::array::from_fn(|_| None),
            default_port: None,
            last_event: None,
        }
    }

    /// Registers `handler` for `port_id`, replacing anything previously
    /// registered there, and immediately replays the last known
    /// connection event to it if there is one.
    pub fn port_register(&mut self, port_id: PortId, handler: H, meta_string: &'static str) {
        let mut entry = PortEntry { handler, meta_string };
        if let Some(event) = self.last_event {
            entry.handler.event_fn(event);
        }
        self.ports[port_id.get() as usize] = Some(entry);
    }

    /// Registers the fallback handler for traffic addressed to an
    /// unregistered port id.
    pub fn port_register_default(&mut self, handler: H, meta_string: &'static str) {
        let mut entry = PortEntry { handler, meta_string };
        if let Some(event) = self.last_event {
            entry.handler.event_fn(event);
        }
        self.default_port = Some(entry);
    }

    pub fn port_meta_string(&self, port_id: PortId) -> Option<&'static str> {
        self.ports[port_id.get() as usize].as_ref().map(|e| e.meta_string)
    }

    /// Builds the metadata word and forwards `msg` to `sender`'s
    /// `send`. Enforces `port_id <= PORT_MAX` via `PortId`'s own
    /// construction, so a caller that only has a raw `u8` should go
    /// through `PortId::new` first and propagate its error here.
    pub fn send(
        &self,
        sender: &mut impl FrameSender,
        port_id: PortId,
        seq: Seq,
        port_data: PortData,
        msg: &[u8],
        timeout: Timestamp,
    ) -> Result<(), FitterbapError> {
        let metadata = pack_metadata(port_id, seq, port_data);
        sender.send_frame(metadata, msg, timeout)
    }

    /// Injects a synthetic event that did not originate from the
    /// datalink itself (`spec.md` §4.4: "Transport-originated synthetic
    /// events... may be injected by higher layers"), fanning it out to
    /// every registered port exactly like a real datalink event.
    pub fn inject_event(&mut self, event: UpperEvent) {
        self.event_fn(event);
    }

    fn event_fn(&mut self, event: UpperEvent) {
        self.last_event = Some(event);
        for slot in self.ports.iter_mut().flatten() {
            slot.handler.event_fn(event);
        }
        if let Some(default_port) = self.default_port.as_mut() {
            default_port.handler.event_fn(event);
        }
    }

    fn recv_fn(&mut self, metadata: u16, msg: &[u8]) {
        let (port_id, seq, port_data) = unpack_metadata(metadata);
        match self.ports[port_id.get() as usize].as_mut() {
            Some(entry) => entry.handler.recv_fn(seq, port_data, msg),
            None => {
                if let Some(default_port) = self.default_port.as_mut() {
                    default_port.handler.recv_fn(seq, port_data, msg);
                }
            }
        }
    }
}

impl<H: PortHandler> fitterbap_datalink::UpperLayer for Transport<H> {
    fn event_fn(&mut self, event: UpperEvent) {
        Transport::event_fn(self, event);
    }

    fn recv_fn(&mut self, metadata: u16, msg: &[u8]) {
        Transport::recv_fn(self, metadata, msg);
    }
}

/// Convenience used by callers validating a raw port id from, e.g., a
/// config file before calling [`Transport::send`].
pub fn checked_port_id(raw: u8) -> Result<PortId, ParamError> {
    PortId::new(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::vec::Vec;

    #[derive(Default)]
    struct Recorded {
        events: Vec<UpperEvent>,
        received: Vec<(Seq, u8, Vec<u8>)>,
    }

    #[derive(Clone, Default)]
    struct RecordingHandler(Rc<RefCell<Recorded>>);

    impl PortHandler for RecordingHandler {
        fn event_fn(&mut self, event: UpperEvent) {
            self.0.borrow_mut().events.push(event);
        }

        fn recv_fn(&mut self, seq: Seq, port_data: PortData, msg: &[u8]) {
            self.0.borrow_mut().received.push((seq, port_data.0, msg.to_vec()));
        }
    }

    struct FakeSender {
        sent: Vec<(u16, Vec<u8>)>,
    }

    impl FrameSender for FakeSender {
        fn send_frame(&mut self, metadata: u16, msg: &[u8], _timeout: Timestamp) -> Result<(), FitterbapError> {
            self.sent.push((metadata, msg.to_vec()));
            Ok(())
        }
    }

    #[test]
    fn dispatches_to_the_registered_port() {
        let mut transport: Transport<RecordingHandler> = Transport::new();
        let handler = RecordingHandler::default();
        transport.port_register(PortId::new(3).unwrap(), handler.clone(), "test-port");

        let metadata = pack_metadata(PortId::new(3).unwrap(), Seq::Single, PortData(7));
        transport.recv_fn(metadata, b"hi");

        assert_eq!(handler.0.borrow().received, std::vec![(Seq::Single, 7, b"hi".to_vec())]);
    }

    #[test]
    fn falls_back_to_the_default_port() {
        let mut transport: Transport<RecordingHandler> = Transport::new();
        let default_handler = RecordingHandler::default();
        transport.port_register_default(default_handler.clone(), "default");

        let metadata = pack_metadata(PortId::new(5).unwrap(), Seq::Start, PortData(0));
        transport.recv_fn(metadata, b"unrouted");

        assert_eq!(default_handler.0.borrow().received.len(), 1);
    }

    #[test]
    fn registering_a_port_replays_the_last_connection_event() {
        let mut transport: Transport<RecordingHandler> = Transport::new();
        transport.event_fn(UpperEvent::Connected);

        let handler = RecordingHandler::default();
        transport.port_register(PortId::new(1).unwrap(), handler.clone(), "late-joiner");

        assert_eq!(handler.0.borrow().events, std::vec![UpperEvent::Connected]);
    }

    #[test]
    fn send_packs_metadata_and_forwards_to_the_sender() {
        let transport: Transport<RecordingHandler> = Transport::new();
        let mut sender = FakeSender { sent: Vec::new() };
        transport
            .send(&mut sender, PortId::new(2).unwrap(), Seq::Middle, PortData(9), b"payload", 0)
            .unwrap();

        assert_eq!(sender.sent.len(), 1);
        let (metadata, msg) = &sender.sent[0];
        assert_eq!(unpack_metadata(*metadata), (PortId::new(2).unwrap(), Seq::Middle, PortData(9)));
        assert_eq!(msg, b"payload");
    }

    #[test]
    fn event_fn_fans_out_to_every_registered_port_and_the_default() {
        let mut transport: Transport<RecordingHandler> = Transport::new();
        let a = RecordingHandler::default();
        let b = RecordingHandler::default();
        let default_handler = RecordingHandler::default();
        transport.port_register(PortId::new(0).unwrap(), a.clone(), "a");
        transport.port_register(PortId::new(1).unwrap(), b.clone(), "b");
        transport.port_register_default(default_handler.clone(), "default");

        transport.event_fn(UpperEvent::Disconnected);

        assert_eq!(a.0.borrow().events, std::vec![UpperEvent::Disconnected]);
        assert_eq!(b.0.borrow().events, std::vec![UpperEvent::Disconnected]);
        assert_eq!(default_handler.0.borrow().events, std::vec![UpperEvent::Disconnected]);
    }
}
