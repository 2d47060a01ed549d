//! The six end-to-end scenarios from `spec.md` §8, each wiring two
//! `Datalink` instances through `fitterbap-testkit`'s `LossyLink` +
//! `MemoryClock` rather than the hand-rolled `TestLink`/`TestClock`
//! used by the colocated unit tests — this is the one place the repo
//! needs a shared fixture instead of a self-contained test
//! (`SPEC_FULL.md` §8).

use std::cell::RefCell;
use std::rc::Rc;

use fitterbap_common::time::{Clock, Timestamp};
use fitterbap_datalink::{DatalinkConfig, NullDatalink, UpperEvent, UpperLayer, WindowSize};
use fitterbap_framer::{FrameDecoder, FrameType, FramerEvent};
use fitterbap_testkit::{LossConfig, LossyLink, MemoryClock};

const TXN: usize = 16;
const RXN: usize = 16;
const RING: usize = 16;
const EVN: usize = 8;

type TestDatalink = NullDatalink<LossyLink, MemoryClock, RecordingUpper, TXN, RXN, RING, EVN>;

#[derive(Default)]
struct RecordingInner {
    events: Vec<UpperEvent>,
    received: Vec<(u16, Vec<u8>)>,
}

#[derive(Clone, Default)]
struct RecordingUpper(Rc<RefCell<RecordingInner>>);

impl UpperLayer for RecordingUpper {
    fn event_fn(&mut self, event: UpperEvent) {
        self.0.borrow_mut().events.push(event);
    }

    fn recv_fn(&mut self, metadata: u16, msg: &[u8]) {
        self.0.borrow_mut().received.push((metadata, msg.to_vec()));
    }
}

struct Peer {
    dl: TestDatalink,
    link: LossyLink,
    clock: MemoryClock,
    upper: RecordingUpper,
}

fn make_peer(tx_timeout: Timestamp, window: u16, seed: u64) -> Peer {
    let clock = MemoryClock::new(0);
    let link = LossyLink::new(seed, LossConfig::default());
    let upper = RecordingUpper::default();
    let config = DatalinkConfig::new(WindowSize::from_requested(window), WindowSize::from_requested(window), tx_timeout);
    let mut dl = TestDatalink::new(config, clock.clone(), link.clone());
    dl.register_upper_layer(upper.clone());
    Peer { dl, link, clock, upper }
}

/// Drives both peers' `process` and exchanges whatever bytes that
/// produced, in order, repeating until the channel goes quiet.
fn pump(a: &mut Peer, b: &mut Peer) {
    for _ in 0..16 {
        a.dl.process(a.clock.now());
        b.dl.process(b.clock.now());

        let a_to_b = a.link.drain();
        let b_to_a = b.link.drain();
        let idle = a_to_b.is_empty() && b_to_a.is_empty();
        if !a_to_b.is_empty() {
            b.dl.ll_recv(&a_to_b);
        }
        if !b_to_a.is_empty() {
            a.dl.ll_recv(&b_to_a);
        }
        if idle {
            break;
        }
    }
}

fn connect(a: &mut Peer, b: &mut Peer) {
    pump(a, b);
    assert!(a.dl.is_connected());
    assert!(b.dl.is_connected());
}

fn decode_link_events(bytes: &[u8]) -> Vec<(FrameType, u16)> {
    let mut decoder = FrameDecoder::new();
    let mut out = Vec::new();
    decoder.feed(bytes, |ev| {
        if let FramerEvent::Link { frame_type, frame_id } = ev {
            out.push((frame_type, frame_id));
        }
    });
    out
}

#[test]
fn scenario_1_happy_path() {
    let mut a = make_peer(10, 16, 1);
    let mut b = make_peer(10, 16, 2);
    connect(&mut a, &mut b);

    a.dl.send(0x0001, &[1, 2, 3, 4, 5, 6, 7, 8], 0).unwrap();
    pump(&mut a, &mut b);

    assert_eq!(b.upper.0.borrow().received, vec![(0x0001, vec![1, 2, 3, 4, 5, 6, 7, 8])]);
    assert_eq!(a.dl.status_get().tx.data_frames, 1);
}

#[test]
fn scenario_2_single_frame_loss_then_recovery() {
    let mut a = make_peer(10, 16, 3);
    let mut b = make_peer(10, 16, 4);
    connect(&mut a, &mut b);

    a.dl.send(0x10, b"first", 0).unwrap();
    a.dl.send(0x11, b"second", 0).unwrap();
    a.dl.send(0x12, b"third", 0).unwrap();
    a.dl.process(a.clock.now());

    // The channel drops the second frame (frame id 1) entirely: drain
    // what A queued, then replay only frames 0 and 2 to B. Every wire
    // frame is exactly `payload.len() + 12` bytes (`spec.md` §4.1).
    let wire = a.link.drain();
    let frame0_len = b"first".len() + 12;
    let frame1_len = b"second".len() + 12;
    let (frame0, rest) = wire.split_at(frame0_len);
    let (_frame1, frame2) = rest.split_at(frame1_len);
    b.dl.ll_recv(frame0);
    b.dl.ll_recv(frame2);

    a.clock.advance(10);
    pump(&mut a, &mut b);

    assert_eq!(
        b.upper.0.borrow().received,
        vec![(0x10, b"first".to_vec()), (0x11, b"second".to_vec()), (0x12, b"third".to_vec())]
    );
    assert_eq!(a.dl.status_get().tx.retransmissions, 1);
}

#[test]
fn scenario_3_out_of_order_reception_acks_match_spec() {
    let mut a = make_peer(10, 16, 5);
    let mut b = make_peer(10, 16, 6);
    connect(&mut a, &mut b);

    a.dl.send(0xA, b"a", 0).unwrap();
    a.dl.send(0xB, b"b", 0).unwrap();
    a.dl.send(0xC, b"c", 0).unwrap();
    a.dl.process(a.clock.now());
    let wire = a.link.drain();

    let la = b"a".len() + 12;
    let lb = b"b".len() + 12;
    let (frame_a, rest) = wire.split_at(la);
    let (frame_b, frame_c) = rest.split_at(lb);

    // Arrives A, C, B.
    b.dl.ll_recv(frame_a);
    b.dl.ll_recv(frame_c);
    b.dl.ll_recv(frame_b);

    assert_eq!(
        b.upper.0.borrow().received,
        vec![(0xA, b"a".to_vec()), (0xB, b"b".to_vec()), (0xC, b"c".to_vec())]
    );

    // The ACK/NACK frames queued by each `ll_recv` above only reach the
    // wire once `process` drains the link-frame ring.
    b.dl.process(b.clock.now());
    let egress = b.link.drain();
    let events = decode_link_events(&egress);
    assert_eq!(
        events,
        vec![
            (FrameType::AckAll, 0),
            (FrameType::NackFrameId, 1),
            (FrameType::AckOne, 2),
            (FrameType::AckAll, 2),
        ]
    );
}

#[test]
fn scenario_4_duplicate_frame_is_delivered_once_and_acked_twice() {
    let mut a = make_peer(10, 16, 7);
    let mut b = make_peer(10, 16, 8);
    connect(&mut a, &mut b);

    a.dl.send(0x99, b"dup", 0).unwrap();
    a.dl.process(a.clock.now());
    let frame = a.link.drain();

    // Drain and re-send the ACK between deliveries so the ring's
    // dedup-identical-AckAll check (it only looks at what's still
    // queued, not what's already hit the wire) doesn't collapse the
    // second delivery's ACK into the first.
    b.dl.ll_recv(&frame);
    b.dl.process(b.clock.now());
    let mut egress = b.link.drain();

    b.dl.ll_recv(&frame);
    b.dl.process(b.clock.now());
    egress.extend(b.link.drain());

    assert_eq!(b.upper.0.borrow().received, vec![(0x99, b"dup".to_vec())]);

    let events = decode_link_events(&egress);
    assert_eq!(events, vec![(FrameType::AckAll, 0), (FrameType::AckAll, 0)]);
}

#[test]
fn scenario_5_forced_reset_then_reconnect() {
    let mut a = make_peer(1, 16, 9);
    let mut b = make_peer(1, 16, 10);
    connect(&mut a, &mut b);

    a.dl.send(0x01, b"stuck", 0).unwrap();

    // The channel drops every transmission of this frame: advance past
    // 25 retry intervals without ever delivering anything to B.
    for _ in 0..40 {
        a.clock.advance(2);
        a.dl.process(a.clock.now());
        a.link.drain(); // discard: never reaches b
    }

    assert!(!a.dl.is_connected());
    assert!(a.upper.0.borrow().events.contains(&UpperEvent::Disconnected));
    assert!(a.upper.0.borrow().events.contains(&UpperEvent::ResetRequest));

    // The channel "recovers": resume normal pumping and both sides
    // should converge back to CONNECTED with zeroed windows.
    connect(&mut a, &mut b);
    assert_eq!(a.dl.frame_id_counters().0, 0);
    assert_eq!(b.dl.frame_id_counters().1, 0);
}

#[test]
fn scenario_6_framing_resync_recovers_a_frame_injected_mid_noise() {
    let mut a = make_peer(10, 16, 11);
    let mut b = make_peer(10, 16, 12);
    connect(&mut a, &mut b);

    let mut noise = vec![0x00u8, 0xFF, 0x37, 0xAA, 0x01, 0x99];
    let mut buf = [0u8; 268];
    let n = fitterbap_framer::construct_data(&mut buf, 0, 0x2222, b"mid-noise").unwrap();

    // Frame id 0 is what B already expects post-handshake, so this
    // lands as the very next in-order delivery once the noise is
    // skipped.
    noise.extend_from_slice(&buf[..n]);

    b.dl.ll_recv(&noise);

    assert_eq!(b.upper.0.borrow().received, vec![(0x2222, b"mid-noise".to_vec())]);
    assert!(b.dl.status_get().framer.ignored_bytes > 0);
}
