//! # CAN link helpers
//! Frame length rules shared by the codec: the maximum datalen per CAN
//! format, the DLC table of ISO 11898-1 §8.4.2.4 and the padding of frames
//! to the next valid DLC.
//!
//! ```
//! use isotp::link::{pad_frame, CanFormat, DLC};
//!
//! // 10 payload bytes only fit a 12 byte CAN FD frame
//! assert_eq!(DLC::Twelve, DLC::for_length(10, CanFormat::Fd).unwrap());
//!
//! let mut frame = [0x55u8; 64];
//! let padded = pad_frame(&mut frame, 10, CanFormat::Fd).unwrap();
//! assert_eq!(12, padded);
//! assert_eq!([0xCC, 0xCC], frame[10..padded]);
//! ```
use crate::error::Error;
use serde::{Deserialize, Serialize};

/// Fill byte for padded frame tails
pub const PADDING_BYTE: u8 = 0xCC;

/// Largest CAN frame handled by the codec scratch buffer
pub const MAX_FRAME_LEN: usize = 64;

pub const MAX_DATALEN_CLASSIC: usize = 8;

pub const MAX_DATALEN_FD: usize = 64;

/// Frame format of the underlying CAN link
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum CanFormat {
    /// CAN 2.0, up to 8 data bytes per frame
    Classic,
    /// CAN FD, up to 64 data bytes per frame
    Fd,
}

impl CanFormat {
    /// Maximum number of data bytes a frame of this format carries
    pub fn max_datalen(self) -> usize {
        match self {
            CanFormat::Classic => MAX_DATALEN_CLASSIC,
            CanFormat::Fd => MAX_DATALEN_FD,
        }
    }

    /// Highest DLC code valid for this format
    pub fn max_dlc(self) -> u8 {
        match self {
            CanFormat::Classic => 8,
            CanFormat::Fd => 15,
        }
    }
}

/// Data length code
#[derive(Debug, Eq, PartialEq, Ord, PartialOrd, Copy, Clone)]
#[allow(clippy::upper_case_acronyms)]
pub enum DLC {
    Zero,
    One,
    Two,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Twelve,
    Sixteen,
    Twenty,
    TwentyFour,
    ThirtyTwo,
    FortyEight,
    SixtyFour,
}

impl DLC {
    /// Maps an exact payload length to its DLC
    pub fn from_length(value: usize) -> Result<Self, Error> {
        match value {
            0 => Ok(Self::Zero),
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            3 => Ok(Self::Three),
            4 => Ok(Self::Four),
            5 => Ok(Self::Five),
            6 => Ok(Self::Six),
            7 => Ok(Self::Seven),
            8 => Ok(Self::Eight),
            12 => Ok(Self::Twelve),
            16 => Ok(Self::Sixteen),
            20 => Ok(Self::Twenty),
            24 => Ok(Self::TwentyFour),
            32 => Ok(Self::ThirtyTwo),
            48 => Ok(Self::FortyEight),
            64 => Ok(Self::SixtyFour),
            _ => Err(Error::Range),
        }
    }

    /// Smallest DLC whose payload length holds `value` bytes
    pub fn for_length(value: usize, format: CanFormat) -> Result<Self, Error> {
        if value > format.max_datalen() {
            return Err(Error::Range);
        }

        // length used to choose the next supported DLC
        let mut length = value;
        loop {
            if let Ok(dlc) = Self::from_length(length) {
                return Ok(dlc);
            }
            length += 1;
        }
    }

    /// Maps a wire DLC code to its table entry
    pub fn from_code(code: u8, format: CanFormat) -> Result<Self, Error> {
        if code > format.max_dlc() {
            return Err(Error::Range);
        }

        match code {
            0 => Ok(Self::Zero),
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            3 => Ok(Self::Three),
            4 => Ok(Self::Four),
            5 => Ok(Self::Five),
            6 => Ok(Self::Six),
            7 => Ok(Self::Seven),
            8 => Ok(Self::Eight),
            9 => Ok(Self::Twelve),
            10 => Ok(Self::Sixteen),
            11 => Ok(Self::Twenty),
            12 => Ok(Self::TwentyFour),
            13 => Ok(Self::ThirtyTwo),
            14 => Ok(Self::FortyEight),
            _ => Ok(Self::SixtyFour),
        }
    }

    /// Wire code of this DLC
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Number of payload bytes the DLC stands for
    pub fn data_len(self) -> usize {
        match self {
            Self::Zero => 0,
            Self::One => 1,
            Self::Two => 2,
            Self::Three => 3,
            Self::Four => 4,
            Self::Five => 5,
            Self::Six => 6,
            Self::Seven => 7,
            Self::Eight => 8,
            Self::Twelve => 12,
            Self::Sixteen => 16,
            Self::Twenty => 20,
            Self::TwentyFour => 24,
            Self::ThirtyTwo => 32,
            Self::FortyEight => 48,
            Self::SixtyFour => 64,
        }
    }
}

/// Extends the frame tail with [PADDING_BYTE] up to the next valid DLC
/// length and returns the final frame length. Classic frames always extend
/// to the full 8 bytes, FD frames to the least DLC table entry holding
/// `len` bytes.
pub fn pad_frame(frame: &mut [u8], len: usize, format: CanFormat) -> Result<usize, Error> {
    let padded = match format {
        CanFormat::Classic => {
            if len > MAX_DATALEN_CLASSIC {
                return Err(Error::Range);
            }
            MAX_DATALEN_CLASSIC
        }
        CanFormat::Fd => DLC::for_length(len, format)?.data_len(),
    };

    if frame.len() < padded {
        return Err(Error::Range);
    }

    for byte in &mut frame[len..padded] {
        *byte = PADDING_BYTE;
    }

    Ok(padded)
}
