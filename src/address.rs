//! # Addressing modes
//! Normal and normal-fixed addressing carry the ISO-TP bytes directly in the
//! CAN payload. Extended and mixed addressing prepend a single address
//! extension byte, which shrinks the payload capacity of every frame.
use crate::error::Error;
use crate::link::CanFormat;
use serde::{Deserialize, Serialize};

/// Addressing scheme of the session
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum AddressingMode {
    Normal,
    NormalFixed,
    Extended,
    Mixed,
}

impl AddressingMode {
    /// Number of address extension bytes preceding the PCI
    pub fn extension_len(self) -> usize {
        match self {
            AddressingMode::Normal | AddressingMode::NormalFixed => 0,
            AddressingMode::Extended | AddressingMode::Mixed => 1,
        }
    }
}

/// Largest ISO-TP datalen a single CAN frame carries for the given mode and
/// format. Fails when the address extension leaves no room for the PCI.
pub fn max_isotp_datalen(mode: AddressingMode, format: CanFormat) -> Result<usize, Error> {
    let extension = mode.extension_len();

    if extension >= format.max_datalen() {
        return Err(Error::InvalidArg);
    }

    Ok(format.max_datalen() - extension)
}
