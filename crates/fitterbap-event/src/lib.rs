#![cfg_attr(not(test), no_std)]

//! A min-ordered collection of timed callbacks keyed by an `i64`
//! timestamp (`spec.md` §4.2). Used internally by the datalink to
//! schedule retransmit timers, the RESET-retry timer, and the next
//! `process` deadline; exposed here as its own crate since the
//! scheduling contract (schedule/cancel/next-deadline/process) has no
//! dependency on the ARQ logic that consumes it.
//!
//! Capacity is fixed at compile time via the `N` const generic (no
//! allocation is possible after `initialize`, per `spec.md` §3
//! invariant 5); within that arena, a free list recycles cancelled and
//! fired slots so steady-state scheduling never has to search for the
//! "next" storage location — the spirit of "a free list to avoid
//! allocation... capacity grows on demand, never shrinks" applied
//! within a build-time ceiling, rather than an unbounded collection.

use fitterbap_common::lock::Lock;
use fitterbap_common::time::Timestamp;

/// Opaque handle returned by `schedule`, used later to `cancel`.
/// Encodes the storage slot plus a generation counter so a stale id
/// from an already-fired-and-reused slot can never be confused with
/// the event that now occupies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventId {
    slot: u16,
    generation: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventError {
    /// All `N` slots are occupied by pending events.
    Full,
}

struct Slot<K> {
    timestamp: Timestamp,
    seq: u64,
    generation: u32,
    kind: Option<K>,
    user_data: u32,
}

impl<K: Copy> Slot<K> {
    const fn empty(generation: u32) -> Self {
        Slot {
            timestamp: 0,
            seq: 0,
            generation,
            kind: None,
            user_data: 0,
        }
    }

    fn occupied(&self) -> bool {
        self.kind.is_some()
    }
}

/// The state guarded by an `EventManager`'s `Lock`. Public only so
/// other crates can name it in a `Lock<Inner<K, N>>` bound when
/// choosing a lock type for their own `EventManager` instantiation;
/// its fields stay private.
pub struct Inner<K, const N: usize> {
    slots: [Slot<K>; N],
    next_seq: u64,
}

impl<K: Copy, const N: usize> Inner<K, N> {
    fn earliest_index(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, slot) in self.slots.iter().enumerate() {
            if !slot.occupied() {
                continue;
            }
            best = match best {
                None => Some(i),
                Some(b) => {
                    let s = &self.slots[b];
                    if (slot.timestamp, slot.seq) < (s.timestamp, s.seq) {
                        Some(i)
                    } else {
                        Some(b)
                    }
                }
            };
        }
        best
    }
}

/// The event queue itself. `L` is the optional-mutex wrapper from
/// `fitterbap_common::lock` — pass `NullLock` for pure single-threaded
/// use, or `CriticalSectionLock` when another execution context (an
/// interrupt handler, or another OS thread on the host) may call
/// `schedule`/`cancel` concurrently with `process`.
pub struct EventManager<K: Copy, L: Lock<Inner<K, N>>, const N: usize> {
    inner: L,
    on_earliest_changed: NullableCallback,
}

/// A plain function pointer rather than a boxed closure: the comm core
/// never allocates after `initialize`, so there is nowhere to store
/// captured state. The integrating runtime is expected to use this
/// purely as a wake-up signal and look at `time_next()` itself.
#[derive(Clone, Copy)]
struct NullableCallback(Option<fn()>);

impl<K: Copy, L: Lock<Inner<K, N>>, const N: usize> EventManager<K, L, N> {
    pub fn new() -> Self {
        let slots = core::array::from_fn(|_| Slot::empty(0));
        EventManager {
            inner: L::new(Inner { slots, next_seq: 0 }),
            on_earliest_changed: NullableCallback(None),
        }
    }

    /// Registers a callback invoked whenever a newly scheduled event
    /// becomes the earliest pending deadline (never on every
    /// `schedule` call — only when the minimum actually moves
    /// earlier).
    pub fn register_schedule_callback(&mut self, cb: fn()) {
        self.on_earliest_changed = NullableCallback(Some(cb));
    }

    /// Inserts a new event. Returns [`EventError::Full`] if every slot
    /// is occupied.
    pub fn schedule(&self, timestamp: Timestamp, kind: K, user_data: u32) -> Result<EventId, EventError> {
        let mut became_earliest = false;
        let mut assigned: Option<EventId> = None;

        self.inner.with(|inner| {
            let prior_min = inner.earliest_index().map(|i| (inner.slots[i].timestamp, inner.slots[i].seq));

            let Some(free) = inner.slots.iter().position(|s| !s.occupied()) else {
                return;
            };

            let seq = inner.next_seq;
            inner.next_seq += 1;
            let generation = inner.slots[free].generation.wrapping_add(1);
            inner.slots[free] = Slot {
                timestamp,
                seq,
                generation,
                kind: Some(kind),
                user_data,
            };
            assigned = Some(EventId {
                slot: free as u16,
                generation,
            });

            let new_key = (timestamp, seq);
            became_earliest = match prior_min {
                None => true,
                Some(prior) => new_key < prior,
            };
        });

        match assigned {
            Some(id) => {
                if became_earliest {
                    if let NullableCallback(Some(cb)) = self.on_earliest_changed {
                        cb();
                    }
                }
                Ok(id)
            }
            None => Err(EventError::Full),
        }
    }

    /// Idempotent: cancelling an id that already fired, was already
    /// cancelled, or was never valid for this manager is a silent
    /// no-op.
    pub fn cancel(&self, id: EventId) {
        self.inner.with(|inner| {
            let slot = &mut inner.slots[id.slot as usize];
            if slot.occupied() && slot.generation == id.generation {
                slot.kind = None;
            }
        });
    }

    /// The smallest pending timestamp, if any event is scheduled.
    pub fn time_next(&self) -> Option<Timestamp> {
        self.inner.with(|inner| inner.earliest_index().map(|i| inner.slots[i].timestamp))
    }

    /// Ticks remaining until the next deadline, clamped to zero if it
    /// has already passed. `None` if nothing is scheduled.
    pub fn interval_next(&self, now: Timestamp) -> Option<Timestamp> {
        self.time_next().map(|t| (t - now).max(0))
    }

    /// Dispatches every event whose timestamp is `<= now`, earliest
    /// first, ties broken by insertion order, invoking `on_fire` once
    /// per event with the mutex released.
    pub fn process(&self, now: Timestamp, mut on_fire: impl FnMut(K, u32)) {
        loop {
            let fired = self.inner.with(|inner| {
                let idx = inner.earliest_index()?;
                if inner.slots[idx].timestamp > now {
                    return None;
                }
                let kind = inner.slots[idx].kind.take()?;
                Some((kind, inner.slots[idx].user_data))
            });

            match fired {
                Some((kind, user_data)) => on_fire(kind, user_data),
                None => break,
            }
        }
    }
}

impl<K: Copy, L: Lock<Inner<K, N>>, const N: usize> Default for EventManager<K, L, N> {
    fn default() -> Self {
        Self::new()
    }
}
