//! A `Lock<T>` backed by `std::sync::Mutex`, for host-side integration
//! tests and `fitterbap-harness` that share an `EventManager` or a
//! datalink's `Shared` state across OS threads (`SPEC_FULL.md` §5).
//! `critical-section`'s std backend would also work but needs a feature
//! the core crates don't enable by default, so the testkit reaches for
//! the plain standard-library mutex instead, the way a host build
//! naturally would.

use std::sync::Mutex;

use fitterbap_common::lock::Lock;

pub struct StdMutexLock<T>(Mutex<T>);

impl<T> Lock<T> for StdMutexLock<T> {
    fn new(value: T) -> Self {
        StdMutexLock(Mutex::new(value))
    }

    fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.0.lock().expect("fitterbap-testkit: poisoned StdMutexLock");
        f(&mut guard)
    }
}
