//! A `Clock` backed by `CLOCK_MONOTONIC`, for the `serial` subcommand
//! where the datalink needs real wall-clock ticks rather than a test's
//! manually-advanced counter. Grounded in `dxkb-split-link-tester`'s
//! `LinuxMonotonicClock`, simplified: that type tracked nanoseconds and
//! exposed `diff`/`nanos` for its own `Clock` trait; this one only
//! needs `now() -> Timestamp` and reports milliseconds, since nothing
//! in this repo's configuration needs sub-millisecond resolution.

use nix::time::{clock_gettime, ClockId};

use fitterbap_common::time::{Clock, Timestamp};

#[derive(Clone, Copy)]
pub struct LinuxMonotonicClock;

impl Clock for LinuxMonotonicClock {
    fn now(&self) -> Timestamp {
        let ts = clock_gettime(ClockId::CLOCK_MONOTONIC).expect("CLOCK_MONOTONIC unavailable");
        (ts.tv_sec() * 1_000 + ts.tv_nsec() / 1_000_000) as Timestamp
    }
}
