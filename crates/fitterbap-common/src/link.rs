//! The lower-layer link capability the datalink is driven against
//! (`spec.md` §2: "a lower-layer link providing `send(bytes)` and
//! `send_available() → bytes_free`"). Generalizes the teacher's split
//! `BusWrite`/`BusRead` traits (`dxkb-common::bus`) into a single
//! trait, since the datalink only ever needs to push bytes out and ask
//! how much room is left — ingress is a plain byte slice handed to
//! `Datalink::ll_recv`, not a polled read, so there is no `BusRead`
//! analogue here.

/// A transmit failure from the lower layer. The comm core treats any
/// failed `send` as "try again later" rather than a hard error: the
/// frame stays queued and is retried on the next `process` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkSendError {
    /// The lower layer cannot accept any bytes right now.
    WouldBlock,
}

pub trait LowerLink {
    /// Attempts to hand `bytes` to the lower layer in full. Callers
    /// must have already checked `send_available() >= bytes.len()`;
    /// implementations are free to assume that invariant and simply
    /// fail if violated.
    fn send(&mut self, bytes: &[u8]) -> Result<(), LinkSendError>;

    /// How many bytes the lower layer could accept right now without
    /// blocking. The datalink never constructs a partial frame, so it
    /// always compares this against a whole frame's length before
    /// calling `send`.
    fn send_available(&self) -> usize;
}
