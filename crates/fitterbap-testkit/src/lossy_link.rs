//! A `LowerLink` that may drop, duplicate, corrupt, or reorder whatever
//! is handed to `send` (`SPEC_FULL.md` §2, "a configurable lossy
//! channel"), used to exercise the six end-to-end scenarios in
//! `spec.md` §8 without real hardware. Loss is applied per `send` call
//! rather than per byte: the datalink always calls `send` with exactly
//! one already-framed DATA or link frame (`spec.md` §4.3's egress
//! logic never constructs a partial frame), so "drop this frame" and
//! "drop this `send` call" are the same thing here.
//!
//! Grounded in `rand_chacha`, the deterministic, `no_std`-capable RNG
//! already in the example pack's dependency set (`hermit-os-kernel`),
//! seeded explicitly so a failing test can be reproduced from its seed.

use std::cell::RefCell;
use std::rc::Rc;

use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use fitterbap_common::link::{LinkSendError, LowerLink};

/// Probabilities in `[0.0, 1.0]` applied independently to every
/// `send` call. A `LossConfig::default()` is loss-free, so a test
/// opts into exactly the failure modes it wants to exercise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossConfig {
    pub drop_probability: f64,
    pub duplicate_probability: f64,
    pub corrupt_probability: f64,
}

impl Default for LossConfig {
    fn default() -> Self {
        LossConfig {
            drop_probability: 0.0,
            duplicate_probability: 0.0,
            corrupt_probability: 0.0,
        }
    }
}

/// One side of a simulated serial link. Frames handed to `send` queue
/// up here until the test drains them (directly, or reordered) into
/// the peer's `ll_recv`.
#[derive(Clone)]
pub struct LossyLink {
    frames: Rc<RefCell<Vec<Vec<u8>>>>,
    rng: Rc<RefCell<ChaCha8Rng>>,
    config: LossConfig,
    send_available: Rc<RefCell<usize>>,
}

impl LossyLink {
    pub fn new(seed: u64, config: LossConfig) -> Self {
        LossyLink {
            frames: Rc::new(RefCell::new(Vec::new())),
            rng: Rc::new(RefCell::new(ChaCha8Rng::seed_from_u64(seed))),
            config,
            send_available: Rc::new(RefCell::new(usize::MAX)),
        }
    }

    /// Caps how many bytes `send_available` reports, to exercise the
    /// datalink's "transmit only if the whole frame fits" budget logic.
    pub fn set_send_available(&self, bytes: usize) {
        *self.send_available.borrow_mut() = bytes;
    }

    /// Removes every frame currently queued and returns them
    /// concatenated, in the order `send` was called — the no-loss,
    /// in-order default a happy-path test wants.
    pub fn drain(&self) -> Vec<u8> {
        self.frames.borrow_mut().drain(..).flatten().collect()
    }

    /// Like [`Self::drain`], but swaps the second and third queued
    /// frames before flattening, modeling `spec.md` §8 scenario 3's
    /// "the channel reorders them to arrive A, C, B" without needing a
    /// generic shuffle the test would then have to reason about.
    pub fn drain_swap_last_two(&self) -> Vec<u8> {
        let mut frames = self.frames.borrow_mut();
        if frames.len() >= 3 {
            let last = frames.len() - 1;
            frames.swap(last - 1, last);
        }
        frames.drain(..).flatten().collect()
    }

    fn roll(&self) -> f64 {
        (self.rng.borrow_mut().next_u32() as f64) / (u32::MAX as f64)
    }
}

impl LowerLink for LossyLink {
    fn send(&mut self, bytes: &[u8]) -> Result<(), LinkSendError> {
        if bytes.len() > *self.send_available.borrow() {
            return Err(LinkSendError::WouldBlock);
        }
        if self.roll() < self.config.drop_probability {
            return Ok(());
        }

        let mut frame = bytes.to_vec();
        if !frame.is_empty() && self.roll() < self.config.corrupt_probability {
            let byte_idx = (self.rng.borrow_mut().next_u32() as usize) % frame.len();
            let bit = self.rng.borrow_mut().next_u32() % 8;
            frame[byte_idx] ^= 1 << bit;
        }

        let duplicate = self.roll() < self.config.duplicate_probability;
        self.frames.borrow_mut().push(frame.clone());
        if duplicate {
            self.frames.borrow_mut().push(frame);
        }
        Ok(())
    }

    fn send_available(&self) -> usize {
        *self.send_available.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loss_free_config_passes_every_frame_through_in_order() {
        let mut link = LossyLink::new(1, LossConfig::default());
        link.send(b"one").unwrap();
        link.send(b"two").unwrap();
        assert_eq!(link.drain(), b"onetwo");
    }

    #[test]
    fn always_drop_never_queues_anything() {
        let mut link = LossyLink::new(2, LossConfig { drop_probability: 1.0, ..LossConfig::default() });
        link.send(b"gone").unwrap();
        assert!(link.drain().is_empty());
    }

    #[test]
    fn always_duplicate_queues_every_frame_twice() {
        let mut link = LossyLink::new(3, LossConfig { duplicate_probability: 1.0, ..LossConfig::default() });
        link.send(b"x").unwrap();
        assert_eq!(link.drain(), b"xx");
    }

    #[test]
    fn always_corrupt_flips_exactly_one_bit() {
        let mut link = LossyLink::new(4, LossConfig { corrupt_probability: 1.0, ..LossConfig::default() });
        link.send(&[0u8; 16]).unwrap();
        let out = link.drain();
        let flipped: u32 = out.iter().map(|b| b.count_ones()).sum();
        assert_eq!(flipped, 1);
    }

    #[test]
    fn send_available_caps_what_the_lower_layer_will_accept() {
        let mut link = LossyLink::new(5, LossConfig::default());
        link.set_send_available(2);
        assert_eq!(link.send(&[1, 2, 3]), Err(LinkSendError::WouldBlock));
        assert!(link.send(&[1, 2]).is_ok());
    }

    #[test]
    fn swap_last_two_reorders_exactly_those_two_frames() {
        let mut link = LossyLink::new(6, LossConfig::default());
        link.send(b"A").unwrap();
        link.send(b"B").unwrap();
        link.send(b"C").unwrap();
        assert_eq!(link.drain_swap_last_two(), b"ACB");
    }
}
