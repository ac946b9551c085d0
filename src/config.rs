//!
//!
//! # Session configuration
//! The [Configuration] struct gathers the immutable settings of an ISO-TP
//! session: the CAN frame format, the addressing mode, the tolerance for
//! flow control wait frames and the four protocol timeouts.
//!
//! ```
//! use isotp::address::AddressingMode;
//! use isotp::config::{Configuration, Timeouts};
//! use isotp::link::CanFormat;
//!
//! let config = Configuration {
//!     format: CanFormat::Fd,
//!     addressing: AddressingMode::Extended,
//!     fc_wait_max: 3,
//!     timeouts: Timeouts {
//!         n_as: 500_000,
//!         ..Timeouts::default()
//!     },
//! };
//! ```
use crate::address::AddressingMode;
use crate::link::CanFormat;
use serde::{Deserialize, Serialize};

/// Default for all four protocol timeouts
pub const DEFAULT_TIMEOUT_US: u32 = 1_000_000;

/// The four ISO 15765-2 timeouts in microseconds.
///
/// N_Ar is kept as a configuration value for completeness; the receive path
/// enforces N_Cr. Zeroed fields fall back to the one second default when the
/// configuration is applied.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Timeouts {
    /// Sender-side budget until the first flow control of a transfer
    pub n_as: u32,

    /// Receiver-side frame transmission budget
    pub n_ar: u32,

    /// Sender-side budget for the next flow control after a wait or an
    /// exhausted block
    pub n_bs: u32,

    /// Receiver-side budget for the next consecutive frame
    pub n_cr: u32,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            n_as: DEFAULT_TIMEOUT_US,
            n_ar: DEFAULT_TIMEOUT_US,
            n_bs: DEFAULT_TIMEOUT_US,
            n_cr: DEFAULT_TIMEOUT_US,
        }
    }
}

impl Timeouts {
    /// Replaces zeroed fields by the protocol default
    pub(crate) fn normalized(self) -> Self {
        fn field(value: u32) -> u32 {
            if value == 0 {
                DEFAULT_TIMEOUT_US
            } else {
                value
            }
        }

        Self {
            n_as: field(self.n_as),
            n_ar: field(self.n_ar),
            n_bs: field(self.n_bs),
            n_cr: field(self.n_cr),
        }
    }
}

/// Entire session configuration
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct Configuration {
    /// CAN frame format of the link
    pub format: CanFormat,

    /// Addressing scheme
    pub addressing: AddressingMode,

    /// Number of flow control wait frames tolerated per transfer.
    /// Zero disables enforcement.
    pub fc_wait_max: u8,

    /// Protocol timeouts
    pub timeouts: Timeouts,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            format: CanFormat::Classic,
            addressing: AddressingMode::Normal,
            fc_wait_max: 0,
            timeouts: Timeouts::default(),
        }
    }
}
