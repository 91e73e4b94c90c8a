//! Error taxonomy shared by both engines.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced to the direct caller of a request/response operation, or
/// (for the fire-and-forget / worker paths) folded into an [`Event::Error`]
/// (see `events.rs`).
#[derive(Debug, Error)]
pub enum EngineError {
    /// No correlated reply arrived within the deadline.
    #[error("timed out after {0:?} waiting for a reply")]
    Timeout(Duration),

    /// Device-B: an inbound line didn't parse as a known message after the
    /// resync budget was exhausted.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Device-B: the device answered the in-flight request type with EROR/SERR.
    #[error("device reported error {code} for {request_type}: {message}")]
    DeviceReported {
        request_type: String,
        code: i32,
        message: String,
    },

    /// A read or write on the byte stream failed.
    #[error("transport fault: {0}")]
    TransportFault(#[from] std::io::Error),

    /// A worker saw 10 consecutive transport faults and gave up.
    #[error("reconnect needed after repeated transport faults")]
    ReconnectNeeded,

    /// Device-A: a decoded status failed the junk-data filter.
    #[error("suspect data (junk filter rejected sample)")]
    SuspectData,

    /// The engine has already been shut down.
    #[error("engine is shut down")]
    ShutDown,
}

/// Frame-local decode error, raised by the Framer/Deframer before the engine
/// has enough context to build a full [`EngineError`].
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("declared length {0} is too short to be a valid frame")]
    TooShort(u8),

    #[error("unrecognized message type {0:?}")]
    UnknownType(String),

    #[error("could not parse parameter list: {0}")]
    BadParameters(String),

    #[error("exceeded {0} resync attempts without a recognizable message")]
    ResyncBudgetExhausted(u32),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
