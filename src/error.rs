//! # Error kinds
//!
//! Shared error vocabulary of the codec, the session engine and the
//! [CanDriver](crate::session::CanDriver) boundary. The discriminants follow
//! the common POSIX errno spellings, so callers familiar with errno recognize
//! the kinds. [Error::code] yields the negated value used at foreign call
//! boundaries.

/// Error kind with a stable errno-style discriminant
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub enum Error {
    /// Driver ran out of resources
    OutOfMemory = 12,

    /// Invalid buffer or context reference inside the driver
    Fault = 14,

    /// Argument outside the supported configuration space
    InvalidArg = 22,

    /// Length outside the representable range or DLC outside the ISO table
    Range = 34,

    /// Payload exceeds the capacity of the chosen frame or buffer
    Overflow = 75,

    /// Clock failure while supervising a protocol timer
    Time = 84,

    /// Frame size inconsistent with the link layer
    MessageSize = 90,

    /// No frame available
    NoMessage = 91,

    /// Unparsable or unexpected frame on the wire
    BadMessage = 92,

    /// Caller buffer too small for the announced transfer
    NoBufSpace = 105,

    /// A protocol timer (N_As, N_Bs, N_Cr) expired
    TimedOut = 110,

    /// Flow control overrun, peer overflow or sequence mismatch
    ConnectionAborted = 130,

    /// Reserved frame encoding
    NotSupported = 134,
}

impl Error {
    /// Negated errno-style value of this kind
    pub fn code(self) -> i32 {
        -(self as i32)
    }
}

impl From<embedded_time::clock::Error> for Error {
    fn from(_error: embedded_time::clock::Error) -> Self {
        Error::Time
    }
}
