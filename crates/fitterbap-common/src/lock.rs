//! The "optional mutex" referenced throughout `spec.md` §4.2 and §5:
//! the event manager and the datalink's slot arrays are guarded by a
//! `Lock<T>` so that a pure single-threaded build pays nothing for
//! synchronization, while a build that shares the event manager with
//! an interrupt handler (or, on the host, another thread) can plug in
//! a real one.
//!
//! This generalizes the teacher's `cortex_m::interrupt::Mutex<RefCell<T>>`
//! pattern (see `dxkb-peripheral/src/uart_dma_rb.rs`,
//! `dxkb-core/src/log.rs`) to be vendor-neutral via the `critical-section`
//! crate, and adds the genuinely-no-op variant for single-core use.

use core::cell::RefCell;

/// A guarded value. `with` is the only way in or out: the closure runs
/// with exclusive access and the lock (if any) is released as soon as
/// it returns, so a fired event-manager callback never re-enters while
/// still holding the lock.
pub trait Lock<T> {
    fn new(value: T) -> Self;
    fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R;
}

/// Single-threaded, single-core use: locking compiles down to a
/// `RefCell` borrow. This is the default for the datalink and event
/// manager when nothing shares them across an interrupt boundary.
pub struct NullLock<T>(RefCell<T>);

impl<T> Lock<T> for NullLock<T> {
    fn new(value: T) -> Self {
        NullLock(RefCell::new(value))
    }

    fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.0.borrow_mut())
    }
}

/// Shared across interrupt context (or, via `critical-section`'s std
/// backend, across OS threads): backed by a `critical_section::Mutex`,
/// the portable generalization of the teacher's cortex-m-specific
/// `cortex_m::interrupt::Mutex`.
pub struct CriticalSectionLock<T>(critical_section::Mutex<RefCell<T>>);

impl<T> Lock<T> for CriticalSectionLock<T> {
    fn new(value: T) -> Self {
        CriticalSectionLock(critical_section::Mutex::new(RefCell::new(value)))
    }

    fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        critical_section::with(|cs| f(&mut self.0.borrow_ref_mut(cs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_lock_mutates_in_place() {
        let lock = NullLock::new(0u32);
        lock.with(|v| *v += 1);
        lock.with(|v| *v += 1);
        assert_eq!(lock.with(|v| *v), 2);
    }

    #[test]
    fn critical_section_lock_mutates_in_place() {
        let lock = CriticalSectionLock::new(vec![1, 2]);
        lock.with(|v| v.push(3));
        assert_eq!(lock.with(|v| v.clone()), vec![1, 2, 3]);
    }
}
