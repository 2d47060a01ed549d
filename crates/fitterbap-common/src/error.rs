//! The four error kinds the comm core surfaces synchronously
//! (`spec.md` §7). Shared between the framer's construct operations
//! and the datalink's public surface so both report the same kind for
//! the same underlying mistake (an out-of-range frame id, an
//! oversized payload, ...).

/// Why a `construct_data`/`construct_link` call, or a `send`, was
/// rejected before anything was written or queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamError {
    FrameIdOutOfRange,
    PayloadTooLarge,
    PayloadEmpty,
    UnknownFrameType,
    /// A `fitterbap-transport` port id outside `0..=PORT_MAX` (`spec.md`
    /// §4.4: "It enforces `port_id ≤ PORT_MAX`").
    PortIdOutOfRange,
}

/// The full error surface of `Datalink::send`, per §7: `unavailable`
/// while disconnected, `full` when the TX window stays saturated past
/// the caller's timeout, `parameter_invalid` when the framer rejects
/// the arguments. `spec.md` §8's own boundary behavior names the
/// timeout-elapsed-while-saturated case `full` ("sending when the
/// window is full returns `full` within the requested timeout"), so
/// there is no call site that would ever distinguish a separate
/// `timed_out` kind from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitterbapError {
    ParameterInvalid(ParamError),
    Unavailable,
    Full,
}

impl From<ParamError> for FitterbapError {
    fn from(e: ParamError) -> Self {
        FitterbapError::ParameterInvalid(e)
    }
}
