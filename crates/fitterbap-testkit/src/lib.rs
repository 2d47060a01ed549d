//! Host-only test doubles used by `fitterbap-datalink`'s integration
//! tests and `fitterbap-harness`'s soak-testing CLI
//! (`SPEC_FULL.md` §2): a deterministic in-memory clock and a
//! configurable lossy channel, plus a `std::sync::Mutex`-backed `Lock`
//! for host-side multi-threaded exercises (`SPEC_FULL.md` §5).
//!
//! Generalizes `dxkb-split-link-tester`'s role as a host-side exerciser
//! for the no_std link crate into a reusable library instead of a
//! one-off CLI: that binary hand-rolled a real serial port and a
//! `LinuxMonotonicClock`; this crate gives test code the equivalent
//! without needing hardware or wall-clock time.

pub mod clock;
pub mod lock;
pub mod lossy_link;

pub use clock::MemoryClock;
pub use lock::StdMutexLock;
pub use lossy_link::{LossConfig, LossyLink};
