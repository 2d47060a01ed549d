//! The reliable-delivery engine itself (`spec.md` §2, §4.3): the RESET
//! handshake, the TX/RX sliding windows, retransmission timers, and
//! link-frame egress. Generalizes the teacher's `SplitBus` (a single
//! monolithic struct driving one fixed link) the same way: one struct
//! parameterized over the lower link, the clock, the upper-layer
//! callback, and — new here, since the teacher never shared state
//! across contexts — the two `Lock` types guarding the slot windows
//! and the event queue.

use fitterbap_common::error::{FitterbapError, ParamError};
use fitterbap_common::link::LowerLink;
use fitterbap_common::lock::{Lock, NullLock};
use fitterbap_common::time::{Clock, Timestamp};
use fitterbap_common::{dev_debug, dev_warn};
use fitterbap_event::{EventManager, Inner as EventInner};
use fitterbap_framer::{construct_data, construct_link, FrameDecoder, FrameType, FramerEvent, PAYLOAD_MAX, SOF1};

use crate::config::DatalinkConfig;
use crate::frame_id::{frame_id_add, frame_id_dec, frame_id_sub};
use crate::rx::{RxSlot, RxState};
use crate::shared::{ConnState, Shared};
use crate::status::DatalinkStatus;
use crate::tx::{TxSlot, TxState};
use crate::upper::{UpperEvent, UpperLayer};

/// A transmitted frame is retried up to this many times before the
/// datalink gives up on the connection entirely and forces a RESET
/// (`spec.md` §4.3, "Timer and retry logic").
const MAX_SEND_ATTEMPTS: u8 = 25;

/// The single kind of event this engine ever schedules: a generic wake
/// at the next deadline `process` needs to act on. Unlike the richer
/// per-reason event kinds one might expect, `process` always rescans
/// the windows itself rather than trusting what fired — the event
/// queue is only ever used as a single outstanding "when to next call
/// process" deadline, never as a dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Wake,
}

/// Convenience alias for the common case: no interrupt or cross-thread
/// sharing, everything driven from one task via `NullLock`.
pub type NullDatalink<LL, CK, UP, const TXN: usize, const RXN: usize, const RING: usize, const EVN: usize> = Datalink<
    LL,
    CK,
    UP,
    NullLock<Shared<TXN, RXN, RING>>,
    NullLock<EventInner<EventKind, EVN>>,
    TXN,
    RXN,
    RING,
    EVN,
>;

/// The ARQ engine. `SL` guards the sliding windows and link-frame
/// egress ring (shared between `send`, called from any context, and
/// `process`/`ll_recv`, the driver task); `EL` guards the event
/// manager's own internal state. They are deliberately two distinct
/// lock instantiations rather than one shared lock, since a caller
/// that only ever calls `send`/`process`/`ll_recv` from one task can
/// use `NullLock` for both, while one that fires `send` from another
/// thread only needs `SL` to be a real lock.
pub struct Datalink<
    LL: LowerLink,
    CK: Clock,
    UP: UpperLayer,
    SL: Lock<Shared<TXN, RXN, RING>>,
    EL: Lock<EventInner<EventKind, EVN>>,
    const TXN: usize,
    const RXN: usize,
    const RING: usize,
    const EVN: usize,
> {
    ll: LL,
    clock: CK,
    upper: Option<UP>,
    shared: SL,
    events: EventManager<EventKind, EL, EVN>,
    pending_event: Option<fitterbap_event::EventId>,
    config: DatalinkConfig,
    status: DatalinkStatus,
    decoder: FrameDecoder,
}

impl<
        LL: LowerLink,
        CK: Clock,
        UP: UpperLayer,
        SL: Lock<Shared<TXN, RXN, RING>>,
        EL: Lock<EventInner<EventKind, EVN>>,
        const TXN: usize,
        const RXN: usize,
        const RING: usize,
        const EVN: usize,
    > Datalink<LL, CK, UP, SL, EL, TXN, RXN, RING, EVN>
{
    pub fn new(config: DatalinkConfig, clock: CK, ll: LL) -> Self {
        let tx_frame_count_max = config.tx_window_size.get();
        let rx_frame_count = config.rx_window_size.get();
        debug_assert!(tx_frame_count_max as usize <= TXN, "tx window exceeds compiled slot capacity");
        debug_assert!(rx_frame_count as usize <= RXN, "rx window exceeds compiled slot capacity");

        Datalink {
            ll,
            clock,
            upper: None,
            shared: SL::new(Shared::new(tx_frame_count_max, rx_frame_count)),
            events: EventManager::new(),
            pending_event: None,
            config,
            status: DatalinkStatus::default(),
            decoder: FrameDecoder::new(),
        }
    }

    /// Registers the handler the datalink will deliver in-order
    /// messages and connection events to. Replaces any previously
    /// registered handler.
    pub fn register_upper_layer(&mut self, upper: UP) {
        self.upper = Some(upper);
    }

    /// Tears the instance down. Safe to call only once the upper layer
    /// has stopped submitting work. There is nothing to free — the
    /// core never allocates after `new` — this only exists so callers
    /// have an explicit lifecycle point rather than relying on `Drop`
    /// ordering against a lower layer they may be tearing down too.
    pub fn finalize(self) {}

    /// Enqueues `msg` for reliable delivery, blocking (by spinning on
    /// `self.clock`) until either a TX slot frees up or `timeout` ticks
    /// have elapsed since the call began. A `timeout` of `0` returns
    /// immediately if the window is already full, which is the only
    /// way to call this safely from the driver task itself.
    ///
    /// There is no portable `no_std` sleep primitive to back off on
    /// between spins, so this genuinely busy-waits on `self.clock.now()`
    /// advancing; a host integration that wants real backoff wraps
    /// this call rather than relying on it internally.
    pub fn send(&mut self, metadata: u16, msg: &[u8], timeout: Timestamp) -> Result<(), FitterbapError> {
        if msg.is_empty() {
            return Err(ParamError::PayloadEmpty.into());
        }
        if msg.len() > PAYLOAD_MAX {
            return Err(ParamError::PayloadTooLarge.into());
        }

        let deadline = self.clock.now().saturating_add(timeout.max(0));
        loop {
            let outcome = self.shared.with(|shared| -> Option<Result<(), FitterbapError>> {
                if shared.conn != ConnState::Connected {
                    return Some(Err(FitterbapError::Unavailable));
                }
                let occupancy = frame_id_sub(shared.tx_frame_next_id, shared.tx_frame_last_id);
                if occupancy >= shared.tx_frame_count as i32 {
                    return None;
                }
                let frame_id = shared.tx_frame_next_id;
                let idx = shared.tx_index(frame_id);
                let slot = &mut shared.tx_slots[idx];
                match construct_data(&mut slot.frame_bytes, frame_id, metadata, msg) {
                    Ok(len) => {
                        slot.frame_len = len as u16;
                        slot.state = TxState::Send;
                        slot.send_count = 0;
                        slot.last_send_time = 0;
                        shared.tx_frame_next_id = frame_id_add(frame_id, 1);
                        Some(Ok(()))
                    }
                    Err(e) => Some(Err(e.into())),
                }
            });

            match outcome {
                Some(Ok(())) => {
                    self.poke();
                    return Ok(());
                }
                Some(Err(e)) => return Err(e),
                None => {
                    if self.clock.now() >= deadline {
                        return Err(FitterbapError::Full);
                    }
                }
            }
        }
    }

    /// One-shot upper-layer tuning of the negotiated TX window, valid
    /// only while the window is still at its post-handshake default of
    /// `1` (`spec.md` §6).
    pub fn tx_window_set(&mut self, requested: u16) -> Result<(), FitterbapError> {
        self.shared.with(|s| {
            if s.tx_frame_count != 1 {
                return Err(FitterbapError::Unavailable);
            }
            let size = crate::config::WindowSize::from_requested(requested).get().min(s.tx_frame_count_max);
            s.tx_frame_count = size;
            Ok(())
        })
    }

    pub fn status_get(&self) -> DatalinkStatus {
        let mut status = self.status;
        status.framer = self.decoder.status();
        status
    }

    pub fn status_clear(&mut self) {
        self.status = DatalinkStatus::default();
        self.decoder.status_clear();
    }

    /// Whether the RESET handshake has completed on both sides. `false`
    /// both before the first handshake and after a forced reset until
    /// the retry loop reconnects.
    pub fn is_connected(&self) -> bool {
        self.shared.with(|s| s.conn == ConnState::Connected)
    }

    /// The frame id one past the last TX frame ever sent, and the next
    /// RX frame id expected. Both are zeroed by a RESET; exposed for
    /// diagnostics and host-side soak tests that want to confirm a
    /// reconnect actually reset the windows rather than merely flipping
    /// `is_connected`.
    pub fn frame_id_counters(&self) -> (u16, u16) {
        self.shared.with(|s| (s.tx_frame_last_id, s.rx_next_frame_id))
    }

    /// Registers a callback the event manager invokes whenever the
    /// next-deadline moves earlier than whatever it previously was — a
    /// wake-up hint for an integrating runtime that would otherwise
    /// poll `time_next` blindly.
    pub fn register_wake_callback(&mut self, cb: fn()) {
        self.events.register_schedule_callback(cb);
    }

    /// The next time `process` should be called, if anything is
    /// pending. A driver loop can sleep until this deadline (or until
    /// `ll_recv`/`send` is called) rather than polling.
    pub fn time_next(&self) -> Option<Timestamp> {
        self.events.time_next()
    }

    /// Feeds newly received bytes from the lower layer into the frame
    /// decoder, dispatching every frame or framing error it recognizes.
    pub fn ll_recv(&mut self, bytes: &[u8]) {
        let mut decoder = core::mem::take(&mut self.decoder);
        decoder.feed(bytes, |ev| self.handle_framer_event(ev));
        self.decoder = decoder;

        if self.config.header_inactivity_timeout.is_some() {
            let now = self.clock.now();
            let awaiting = self.decoder.awaiting_payload_frame_id();
            self.shared.with(|s| match (awaiting, s.header_stall_since) {
                (Some(_), None) => s.header_stall_since = Some(now),
                (None, Some(_)) => s.header_stall_since = None,
                _ => {}
            });
        }
    }

    /// Advances all time-driven behavior: inactivity timeout, RESET
    /// retry, TX retransmit timeouts, transmitting due frames, draining
    /// queued link frames, and rescheduling the next wake deadline.
    /// Must be called at least by `time_next()`, and whenever `send` or
    /// `ll_recv` might have moved that deadline earlier.
    pub fn process(&mut self, now: Timestamp) {
        self.events.process(now, |_, _| {});

        self.check_inactivity_timeout(now);
        self.retry_reset_handshake(now);
        self.demote_expired_sent_slots(now);
        self.transmit_due_data_frames(now);
        self.drain_link_ring();
        self.reschedule(now);
    }

    fn check_inactivity_timeout(&mut self, now: Timestamp) {
        let Some(timeout) = self.config.header_inactivity_timeout else {
            return;
        };
        let stalled_since = self.shared.with(|s| s.header_stall_since);
        let Some(since) = stalled_since else {
            return;
        };
        if now.saturating_sub(since) < timeout {
            return;
        }
        self.decoder.flush();
        let next_expected = self.shared.with(|s| {
            s.header_stall_since = None;
            s.rx_next_frame_id
        });
        dev_warn!("datalink: header inactivity timeout, flushing and requesting resend from {}", next_expected);
        self.queue_link_frame(FrameType::NackFramingError, next_expected);
    }

    fn retry_reset_handshake(&mut self, now: Timestamp) {
        let reset_retry_interval = self.config.reset_retry_interval();
        let due = self.shared.with(|s| {
            if s.conn != ConnState::Disconnected {
                return false;
            }
            if now.saturating_sub(s.tx_reset_last) < reset_retry_interval {
                return false;
            }
            s.tx_reset_last = now;
            true
        });
        if due {
            self.queue_link_frame(FrameType::Reset, 0);
        }
    }

    fn demote_expired_sent_slots(&mut self, now: Timestamp) {
        let tx_timeout = self.config.tx_timeout_ticks;
        self.shared.with(|s| {
            let mut id = s.tx_frame_last_id;
            while id != s.tx_frame_next_id {
                let idx = s.tx_index(id);
                let slot = &mut s.tx_slots[idx];
                if slot.state == TxState::Sent && now.saturating_sub(slot.last_send_time) >= tx_timeout {
                    slot.state = TxState::Send;
                }
                id = frame_id_add(id, 1);
            }
        });
    }

    fn transmit_due_data_frames(&mut self, now: Timestamp) {
        loop {
            let available = self.ll.send_available();
            let next = self.shared.with(|s| {
                let mut id = s.tx_frame_last_id;
                while id != s.tx_frame_next_id {
                    let idx = s.tx_index(id);
                    if s.tx_slots[idx].state == TxState::Send {
                        return Some(idx);
                    }
                    id = frame_id_add(id, 1);
                }
                None
            });
            let Some(idx) = next else { break };

            let (len, prior_send_count) = self.shared.with(|s| (s.tx_slots[idx].frame_len as usize, s.tx_slots[idx].send_count));
            if len > available {
                break;
            }

            let mut out = [0u8; fitterbap_framer::DATA_FRAME_MAX];
            self.shared.with(|s| out[..len].copy_from_slice(&s.tx_slots[idx].frame_bytes[..len]));

            match self.ll.send(&out[..len]) {
                Ok(()) => {
                    let send_count_after = self.shared.with(|s| {
                        let slot = &mut s.tx_slots[idx];
                        slot.state = TxState::Sent;
                        slot.last_send_time = now;
                        slot.send_count = slot.send_count.saturating_add(1);
                        slot.send_count
                    });
                    if prior_send_count == 0 {
                        self.status.tx.data_frames += 1;
                    } else {
                        self.status.tx.retransmissions += 1;
                    }
                    if send_count_after > MAX_SEND_ATTEMPTS {
                        dev_warn!("datalink: frame exceeded {} send attempts, forcing a reset", MAX_SEND_ATTEMPTS);
                        self.tx_reset();
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    }

    fn drain_link_ring(&mut self) {
        let mut sent_anything = false;
        loop {
            let available = self.ll.send_available();
            if available < fitterbap_framer::LINK_FRAME_SIZE {
                break;
            }
            let next = self.shared.with(|s| s.link_ring.dequeue());
            let Some(bytes) = next else { break };
            if self.ll.send(&bytes).is_ok() {
                sent_anything = true;
            } else {
                dev_warn!("datalink: lower layer rejected a link frame after reporting space for it");
                break;
            }
        }
        if sent_anything && self.ll.send_available() > 0 {
            let _ = self.ll.send(&[SOF1]);
        }
    }

    fn reschedule(&mut self, now: Timestamp) {
        if let Some(id) = self.pending_event.take() {
            self.events.cancel(id);
        }
        if let Some(when) = self.next_deadline(now) {
            if let Ok(id) = self.events.schedule(when, EventKind::Wake, 0) {
                self.pending_event = Some(id);
            }
        }
    }

    fn next_deadline(&self, now: Timestamp) -> Option<Timestamp> {
        let tx_timeout = self.config.tx_timeout_ticks;
        let reset_retry_interval = self.config.reset_retry_interval();

        self.shared.with(|s| {
            let mut deadline: Option<Timestamp> = None;
            let mut take = |at: Timestamp| {
                deadline = Some(match deadline {
                    Some(d) => d.min(at),
                    None => at,
                });
            };

            let mut id = s.tx_frame_last_id;
            while id != s.tx_frame_next_id {
                let idx = s.tx_index(id);
                match s.tx_slots[idx].state {
                    TxState::Sent => take(s.tx_slots[idx].last_send_time + tx_timeout),
                    TxState::Send => take(now),
                    _ => {}
                }
                id = frame_id_add(id, 1);
            }

            if s.conn == ConnState::Disconnected {
                take(s.tx_reset_last + reset_retry_interval);
            }
            if !s.link_ring.is_empty() {
                take(now);
            }

            deadline.map(|d| d.max(now))
        })
    }

    /// Schedules `process` to run again at `self.clock.now()`. Called
    /// after any state change that might have moved the earliest
    /// deadline earlier than whatever was previously scheduled.
    fn poke(&mut self) {
        let now = self.clock.now();
        self.reschedule(now);
    }

    fn handle_framer_event(&mut self, ev: FramerEvent) {
        match ev {
            FramerEvent::Data { frame_id, metadata, payload } => {
                self.on_data_frame(frame_id, metadata, payload);
            }
            FramerEvent::Link { frame_type, frame_id } => {
                self.status.rx.link_frames += 1;
                self.on_link_frame(frame_type, frame_id);
            }
            FramerEvent::FramingError { frame_id: Some(id), .. } => {
                // Header CRC validated, only the payload was bad: NACK
                // this exact frame rather than the whole stream.
                self.queue_link_frame(FrameType::NackFrameId, id);
            }
            FramerEvent::FramingError { kind, frame_id: None } => {
                dev_debug!("datalink: framing error {:?} with unknown frame id", kind);
                let next_expected = self.shared.with(|s| s.rx_next_frame_id);
                self.queue_link_frame(FrameType::NackFramingError, next_expected);
            }
        }
    }

    fn on_data_frame(&mut self, frame_id: u16, metadata: u16, payload: &[u8]) {
        let connected = self.shared.with(|s| s.conn == ConnState::Connected);
        if !connected {
            dev_debug!("datalink: dropping data frame {} received while disconnected", frame_id);
            return;
        }

        let (diff, rx_frame_count, rx_next) =
            self.shared.with(|s| (frame_id_sub(frame_id, s.rx_next_frame_id), s.rx_frame_count, s.rx_next_frame_id));

        if diff == 0 {
            self.deliver_in_order(frame_id, metadata, payload);
        } else if diff < 0 {
            self.status.rx.duplicates += 1;
            self.queue_link_frame(FrameType::AckAll, frame_id_dec(rx_next));
        } else if diff >= rx_frame_count as i32 {
            self.queue_link_frame(FrameType::NackFrameId, frame_id);
        } else {
            self.store_future_frame(frame_id, metadata, payload, rx_next);
        }
    }

    fn deliver_in_order(&mut self, frame_id: u16, metadata: u16, payload: &[u8]) {
        self.status.rx.data_frames += 1;
        if let Some(upper) = self.upper.as_mut() {
            upper.recv_fn(metadata, payload);
        }
        self.shared.with(|s| s.rx_next_frame_id = frame_id_add(frame_id, 1));

        let mut last_delivered = frame_id;
        loop {
            let next_id = self.shared.with(|s| s.rx_next_frame_id);
            let idx = self.shared.with(|s| s.rx_index(next_id));
            let ready = self.shared.with(|s| {
                let slot = &s.rx_slots[idx];
                if slot.state == RxState::Ack && slot.frame_id == next_id {
                    Some((slot.metadata, slot.payload, slot.payload_len))
                } else {
                    None
                }
            });
            let Some((metadata, payload_buf, len)) = ready else { break };

            self.status.rx.data_frames += 1;
            if let Some(upper) = self.upper.as_mut() {
                upper.recv_fn(metadata, &payload_buf[..len as usize]);
            }
            last_delivered = next_id;
            self.shared.with(|s| {
                s.rx_slots[idx] = RxSlot::empty();
                s.rx_next_frame_id = frame_id_add(next_id, 1);
            });
        }

        self.queue_link_frame(FrameType::AckAll, last_delivered);
    }

    fn store_future_frame(&mut self, frame_id: u16, metadata: u16, payload: &[u8], rx_next: u16) {
        self.shared.with(|s| {
            let idx = s.rx_index(frame_id);
            let slot = &mut s.rx_slots[idx];
            slot.frame_id = frame_id;
            slot.metadata = metadata;
            slot.payload_len = payload.len() as u16;
            slot.payload[..payload.len()].copy_from_slice(payload);
            slot.state = RxState::Ack;
            s.rx_max_frame_id = frame_id;
        });

        let mut id = rx_next;
        while id != frame_id {
            let should_nack = self.shared.with(|s| {
                let idx = s.rx_index(id);
                let slot = &mut s.rx_slots[idx];
                if slot.state == RxState::Idle {
                    slot.state = RxState::Nack;
                    true
                } else {
                    false
                }
            });
            if should_nack {
                self.queue_link_frame(FrameType::NackFrameId, id);
            }
            id = frame_id_add(id, 1);
        }

        self.queue_link_frame(FrameType::AckOne, frame_id);
    }

    fn on_link_frame(&mut self, frame_type: FrameType, frame_id: u16) {
        match frame_type {
            FrameType::AckAll => self.handle_ack_all(frame_id),
            FrameType::AckOne => self.handle_ack_one(frame_id),
            FrameType::NackFrameId => self.handle_nack_frame_id(frame_id),
            FrameType::NackFramingError => self.handle_nack_framing_error(frame_id),
            FrameType::Reset => self.handle_reset(frame_id as u8),
            FrameType::Data => dev_warn!("datalink: decoder reported FrameType::Data as a link frame"),
        }
    }

    fn handle_ack_all(&mut self, ack_id: u16) {
        let mut retired = 0u32;
        self.shared.with(|s| {
            while s.tx_frame_last_id != s.tx_frame_next_id && frame_id_sub(ack_id, s.tx_frame_last_id) >= 0 {
                let idx = s.tx_index(s.tx_frame_last_id);
                s.tx_slots[idx].reset();
                s.tx_frame_last_id = frame_id_add(s.tx_frame_last_id, 1);
                retired += 1;
            }
        });
        if retired > 0 {
            self.poke();
        }
    }

    fn handle_ack_one(&mut self, id: u16) {
        self.shared.with(|s| {
            let occupancy = frame_id_sub(s.tx_frame_next_id, s.tx_frame_last_id);
            let offset = frame_id_sub(id, s.tx_frame_last_id);
            if offset >= 0 && offset < occupancy {
                let idx = s.tx_index(id);
                if s.tx_slots[idx].state != TxState::Idle {
                    s.tx_slots[idx].state = TxState::Ack;
                }
            }
        });
    }

    fn handle_nack_frame_id(&mut self, id: u16) {
        let marked = self.shared.with(|s| {
            let occupancy = frame_id_sub(s.tx_frame_next_id, s.tx_frame_last_id);
            let offset = frame_id_sub(id, s.tx_frame_last_id);
            if offset >= 0 && offset < occupancy {
                let idx = s.tx_index(id);
                if s.tx_slots[idx].state != TxState::Idle {
                    s.tx_slots[idx].state = TxState::Send;
                    return true;
                }
            }
            false
        });
        if marked {
            self.status.tx.retransmissions += 1;
            self.poke();
        }
    }

    fn handle_nack_framing_error(&mut self, next_expected: u16) {
        let marked = self.shared.with(|s| {
            let mut id = if frame_id_sub(next_expected, s.tx_frame_last_id) > 0 {
                next_expected
            } else {
                s.tx_frame_last_id
            };
            let mut any = false;
            while frame_id_sub(s.tx_frame_next_id, id) > 0 {
                let idx = s.tx_index(id);
                if s.tx_slots[idx].state != TxState::Idle {
                    s.tx_slots[idx].state = TxState::Send;
                    any = true;
                }
                id = frame_id_add(id, 1);
            }
            any
        });
        if marked {
            self.status.tx.retransmissions += 1;
            self.poke();
        }
    }

    fn handle_reset(&mut self, role: u8) {
        if role == 0 {
            let was_connected = self.shared.with(|s| s.conn == ConnState::Connected);
            self.shared.with(|s| {
                s.conn = ConnState::Disconnected;
                s.reset_windows();
            });
            self.queue_link_frame(FrameType::Reset, 1);
            if was_connected {
                if let Some(upper) = self.upper.as_mut() {
                    upper.event_fn(UpperEvent::Disconnected);
                    upper.event_fn(UpperEvent::ResetRequest);
                }
            }
        } else {
            let was_disconnected = self.shared.with(|s| s.conn == ConnState::Disconnected);
            if was_disconnected {
                self.shared.with(|s| {
                    s.conn = ConnState::Connected;
                    s.reset_windows();
                });
                if let Some(upper) = self.upper.as_mut() {
                    upper.event_fn(UpperEvent::Connected);
                }
            }
        }
        self.poke();
    }

    fn tx_reset(&mut self) {
        self.shared.with(|s| {
            s.conn = ConnState::Disconnected;
            s.reset_windows();
        });
        self.status.tx.resets += 1;
        if let Some(upper) = self.upper.as_mut() {
            upper.event_fn(UpperEvent::Disconnected);
            upper.event_fn(UpperEvent::ResetRequest);
        }
        self.queue_link_frame(FrameType::Reset, 0);
    }

    fn queue_link_frame(&mut self, frame_type: FrameType, frame_id: u16) {
        let mut buf = [0u8; fitterbap_framer::LINK_FRAME_SIZE];
        if construct_link(&mut buf, frame_type, frame_id).is_err() {
            dev_warn!("datalink: refused to queue an out-of-range link frame");
            return;
        }

        let pushed = self.shared.with(|s| {
            if frame_type == FrameType::AckAll {
                for existing in s.link_ring.iter() {
                    let header = u16::from_le_bytes([existing[2], existing[3]]);
                    let (type_bits, id) = fitterbap_framer::frame::unpack_header(header);
                    if FrameType::from_bits(type_bits) == Some(FrameType::AckAll) && id == frame_id {
                        return false;
                    }
                }
            }
            if s.link_ring.is_full() {
                s.link_ring.dequeue();
            }
            s.link_ring.push(buf);
            true
        });

        if pushed {
            self.status.tx.link_frames += 1;
            self.poke();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::vec::Vec;

    use fitterbap_common::link::LinkSendError;
    use fitterbap_common::lock::NullLock;
    use fitterbap_event::Inner as EvInner;

    #[derive(Clone)]
    struct TestClock(Rc<RefCell<Timestamp>>);

    impl TestClock {
        fn new() -> Self {
            TestClock(Rc::new(RefCell::new(0)))
        }

        fn advance(&self, by: Timestamp) {
            *self.0.borrow_mut() += by;
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> Timestamp {
            *self.0.borrow()
        }
    }

    /// A lower link that just appends to a shared outgoing buffer; the
    /// test harness drains it by hand to feed the peer, optionally
    /// dropping bytes to simulate loss.
    #[derive(Clone)]
    struct TestLink(Rc<RefCell<Vec<u8>>>);

    impl TestLink {
        fn new() -> Self {
            TestLink(Rc::new(RefCell::new(Vec::new())))
        }

        fn take_outgoing(&self) -> Vec<u8> {
            core::mem::take(&mut *self.0.borrow_mut())
        }
    }

    impl LowerLink for TestLink {
        fn send(&mut self, bytes: &[u8]) -> Result<(), LinkSendError> {
            self.0.borrow_mut().extend_from_slice(bytes);
            Ok(())
        }

        fn send_available(&self) -> usize {
            4096
        }
    }

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

    const TXN: usize = 4;
    const RXN: usize = 4;
    const RING: usize = 8;
    const EVN: usize = 8;

    type TestDatalink = Datalink<
        TestLink,
        TestClock,
        RecordingUpper,
        NullLock<Shared<TXN, RXN, RING>>,
        NullLock<EvInner<EventKind, EVN>>,
        TXN,
        RXN,
        RING,
        EVN,
    >;

    struct Peer {
        dl: TestDatalink,
        link: TestLink,
        clock: TestClock,
        upper: RecordingUpper,
    }

    fn make_peer(tx_timeout: Timestamp) -> Peer {
        let clock = TestClock::new();
        let link = TestLink::new();
        let upper = RecordingUpper::default();
        let config = DatalinkConfig::new(WindowSize::from_requested(4), WindowSize::from_requested(4), tx_timeout);
        let mut dl = TestDatalink::new(config, clock.clone(), link.clone());
        dl.register_upper_layer(upper.clone());
        Peer { dl, link, clock, upper }
    }

    /// Moves every byte currently queued in `from`'s outgoing buffer
    /// into `to`'s decoder.
    fn deliver(from: &Peer, to: &mut Peer) {
        let bytes = from.link.take_outgoing();
        if !bytes.is_empty() {
            to.dl.ll_recv(&bytes);
        }
    }

    /// Drives both peers' `process` at the current time and exchanges
    /// whatever bytes that produced, repeating until nothing changes.
    fn pump(a: &mut Peer, b: &mut Peer) {
        for _ in 0..8 {
            let now_a = a.clock.now();
            let now_b = b.clock.now();
            a.dl.process(now_a);
            b.dl.process(now_b);

            let a_to_b = a.link.take_outgoing();
            let b_to_a = b.link.take_outgoing();
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
        assert_eq!(a.dl.shared.with(|s| s.conn), ConnState::Connected);
        assert_eq!(b.dl.shared.with(|s| s.conn), ConnState::Connected);
    }

    #[test]
    fn reset_handshake_connects_both_sides() {
        let mut a = make_peer(10);
        let mut b = make_peer(10);
        connect(&mut a, &mut b);
        assert!(a.upper.0.borrow().events.contains(&UpperEvent::Connected));
        assert!(b.upper.0.borrow().events.contains(&UpperEvent::Connected));
    }

    #[test]
    fn happy_path_delivers_in_order_with_no_retransmissions() {
        let mut a = make_peer(10);
        let mut b = make_peer(10);
        connect(&mut a, &mut b);

        a.dl.send(7, b"hello", 0).unwrap();
        pump(&mut a, &mut b);

        assert_eq!(b.upper.0.borrow().received, std::vec![(7, b"hello".to_vec())]);
        assert_eq!(a.dl.status_get().tx.retransmissions, 0);
        assert_eq!(a.dl.status_get().tx.data_frames, 1);
    }

    #[test]
    fn a_single_lost_frame_is_recovered_via_nack() {
        let mut a = make_peer(10);
        let mut b = make_peer(10);
        connect(&mut a, &mut b);

        a.dl.send(1, b"first", 0).unwrap();
        a.dl.process(a.clock.now());
        a.link.take_outgoing(); // drop frame 0 entirely: never reaches b

        a.dl.send(2, b"second", 0).unwrap();
        pump(&mut a, &mut b);

        let received = b.upper.0.borrow().received.clone();
        assert_eq!(received, std::vec![(1, b"first".to_vec()), (2, b"second".to_vec())]);
        assert!(a.dl.status_get().tx.retransmissions >= 1);
    }

    #[test]
    fn out_of_order_arrival_is_buffered_and_delivered_in_order() {
        let mut a = make_peer(10);
        let mut b = make_peer(10);
        connect(&mut a, &mut b);

        a.dl.send(1, b"one", 0).unwrap();
        a.dl.send(2, b"two", 0).unwrap();
        a.dl.process(a.clock.now());
        let wire = a.link.take_outgoing();

        // Split the two DATA frames and deliver the second one first.
        let first_len = construct_data(&mut [0u8; 268], 0, 0, b"x").unwrap();
        let (frame0, frame1) = wire.split_at(first_len);
        b.dl.ll_recv(frame1);
        assert!(b.upper.0.borrow().received.is_empty());
        b.dl.ll_recv(frame0);

        pump(&mut a, &mut b);
        assert_eq!(b.upper.0.borrow().received, std::vec![(1, b"one".to_vec()), (2, b"two".to_vec())]);
    }

    #[test]
    fn duplicate_frame_is_acked_again_but_not_redelivered() {
        let mut a = make_peer(10);
        let mut b = make_peer(10);
        connect(&mut a, &mut b);

        a.dl.send(9, b"once", 0).unwrap();
        a.dl.process(a.clock.now());
        let wire = a.link.take_outgoing();

        b.dl.ll_recv(&wire);
        b.dl.ll_recv(&wire); // replay the same bytes

        assert_eq!(b.upper.0.borrow().received, std::vec![(9, b"once".to_vec())]);
        assert_eq!(b.dl.status_get().rx.duplicates, 1);
    }

    #[test]
    fn send_returns_full_immediately_with_zero_timeout_when_window_is_saturated() {
        let mut a = make_peer(10);
        let mut b = make_peer(10);
        connect(&mut a, &mut b);

        // The negotiated window starts at 1 until raised.
        a.dl.send(0, b"x", 0).unwrap();
        let err = a.dl.send(0, b"y", 0).unwrap_err();
        assert_eq!(err, FitterbapError::Full);
    }

    #[test]
    fn send_rejects_oversized_and_empty_payloads() {
        let mut a = make_peer(10);
        let mut b = make_peer(10);
        connect(&mut a, &mut b);

        assert_eq!(a.dl.send(0, &[], 0), Err(FitterbapError::ParameterInvalid(ParamError::PayloadEmpty)));
        let too_big = [0u8; PAYLOAD_MAX + 1];
        assert_eq!(
            a.dl.send(0, &too_big, 0),
            Err(FitterbapError::ParameterInvalid(ParamError::PayloadTooLarge))
        );
    }

    #[test]
    fn tx_window_set_only_works_before_the_window_is_raised() {
        let mut a = make_peer(10);
        let mut b = make_peer(10);
        connect(&mut a, &mut b);

        assert!(a.dl.tx_window_set(4).is_ok());
        assert_eq!(a.dl.shared.with(|s| s.tx_frame_count), 4);
        assert_eq!(a.dl.tx_window_set(2), Err(FitterbapError::Unavailable));
    }

    #[test]
    fn excessive_retransmissions_force_a_reset() {
        let mut a = make_peer(1);
        let mut b = make_peer(1);
        connect(&mut a, &mut b);

        a.dl.send(0, b"stuck", 0).unwrap();
        // Never deliver anything to b; keep letting a's timeout fire
        // and retransmit until it gives up and resets.
        for _ in 0..(MAX_SEND_ATTEMPTS as i64 + 3) {
            a.clock.advance(2);
            a.dl.process(a.clock.now());
            a.link.take_outgoing();
        }

        assert_eq!(a.dl.status_get().tx.resets, 1);
        assert_eq!(a.dl.shared.with(|s| s.conn), ConnState::Disconnected);
        assert!(a.upper.0.borrow().events.contains(&UpperEvent::Disconnected));
        assert!(a.upper.0.borrow().events.contains(&UpperEvent::ResetRequest));
    }

    #[test]
    fn header_inactivity_timeout_flushes_a_stalled_partial_frame() {
        let clock = TestClock::new();
        let link = TestLink::new();
        let upper = RecordingUpper::default();
        let config = DatalinkConfig::new(WindowSize::from_requested(1), WindowSize::from_requested(1), 10)
            .with_header_inactivity_timeout(5);
        let mut dl = TestDatalink::new(config, clock.clone(), link.clone());
        dl.register_upper_layer(upper);

        // Force-connect without a peer, since this test only exercises
        // the decoder-stall path.
        dl.shared.with(|s| s.conn = ConnState::Connected);

        let mut frame = [0u8; 268];
        let n = construct_data(&mut frame, 0, 0, b"payload").unwrap();
        dl.ll_recv(&frame[..6]); // header + header CRC only, no payload yet
        assert!(dl.decoder.awaiting_payload_frame_id().is_some());

        clock.advance(6);
        dl.process(clock.now());
        assert!(dl.decoder.awaiting_payload_frame_id().is_none());

        let nack = link.take_outgoing();
        assert_eq!(nack.len(), fitterbap_framer::LINK_FRAME_SIZE);
        let _ = n;
    }
}
