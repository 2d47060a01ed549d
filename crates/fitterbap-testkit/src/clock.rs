//! A `Clock` a test advances by hand, rather than one backed by a
//! real timer (`SPEC_FULL.md` §2: "a deterministic in-memory clock").
//! Grounded in `dxkb-split-link-tester`'s `LinuxMonotonicClock`, minus
//! the actual syscall: time here only ever moves when the test tells
//! it to.

use std::cell::RefCell;
use std::rc::Rc;

use fitterbap_common::time::{Clock, Timestamp};

#[derive(Clone)]
pub struct MemoryClock(Rc<RefCell<Timestamp>>);

impl MemoryClock {
    pub fn new(start: Timestamp) -> Self {
        MemoryClock(Rc::new(RefCell::new(start)))
    }

    pub fn advance(&self, by: Timestamp) {
        *self.0.borrow_mut() += by;
    }

    pub fn set(&self, to: Timestamp) {
        *self.0.borrow_mut() = to;
    }
}

impl Default for MemoryClock {
    fn default() -> Self {
        MemoryClock::new(0)
    }
}

impl Clock for MemoryClock {
    fn now(&self) -> Timestamp {
        *self.0.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advances_only_when_told_to() {
        let clock = MemoryClock::new(10);
        assert_eq!(clock.now(), 10);
        clock.advance(5);
        assert_eq!(clock.now(), 15);
        clock.set(0);
        assert_eq!(clock.now(), 0);
    }

    #[test]
    fn clones_share_the_same_underlying_time() {
        let clock = MemoryClock::new(0);
        let clone = clock.clone();
        clock.advance(7);
        assert_eq!(clone.now(), 7);
    }
}
