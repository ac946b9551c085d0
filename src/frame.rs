//!# ISO-TP frame codec
//! Encoding and decoding of the four ISO 15765-2 frame types. Frames are
//! assembled in a fixed 64 byte scratch buffer owned by the session; the
//! codec itself only keeps the link configuration and the current address
//! extension byte.
//!
//! ## Single frame encoding example
//! ```
//! use isotp::address::AddressingMode;
//! use isotp::frame::FrameCodec;
//! use isotp::link::{CanFormat, MAX_FRAME_LEN};
//!
//! let codec = FrameCodec::new(CanFormat::Classic, AddressingMode::Normal).unwrap();
//! let mut scratch = [0u8; MAX_FRAME_LEN];
//!
//! let frame_len = codec.prepare_single(&mut scratch, &[0x11, 0x22]).unwrap();
//! assert_eq!(8, frame_len);
//! assert_eq!([0x02, 0x11, 0x22, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC], scratch[..frame_len]);
//! ```
//!
//! ## First frame decoding example
//! ```
//! use isotp::address::AddressingMode;
//! use isotp::frame::{FrameCodec, Transfer};
//! use isotp::link::{CanFormat, MAX_FRAME_LEN};
//!
//! let mut codec = FrameCodec::new(CanFormat::Classic, AddressingMode::Normal).unwrap();
//! let mut transfer = Transfer::default();
//! let mut buffer = [0u8; 20];
//!
//! let copied = codec
//!     .parse_first(&[0x10, 0x14, 0xC0, 0xC1, 0xC2, 0xC3, 0xC4, 0xC5], &mut buffer, &mut transfer)
//!     .unwrap();
//! assert_eq!(6, copied);
//! assert_eq!(20, transfer.total);
//! assert_eq!(14, transfer.remaining);
//! assert_eq!(1, transfer.sequence);
//! ```
use crate::address::{max_isotp_datalen, AddressingMode};
use crate::error::Error;
use crate::link::{self, CanFormat, MAX_FRAME_LEN};
use byteorder::{BigEndian, ByteOrder};
use modular_bitfield_msb::prelude::*;

/// Largest transfer length a first frame can announce (escape encoding)
pub const MAX_TRANSFER_LEN: u32 = 0x7FFF_FFFE;

/// Largest FF_DL expressible without the 32 bit escape encoding
const FF_ESCAPE_THRESHOLD: u32 = 0xFFF;

/// Sequence sentinel outside 0..15: set after an out-of-order consecutive
/// frame so that every later frame of the transfer keeps failing
pub(crate) const SEQUENCE_POISONED: u8 = 0xFF;

/// Frame type nibble of the PCI byte
#[derive(BitfieldSpecifier, Debug, Eq, PartialEq, Copy, Clone)]
#[bits = 4]
pub enum FrameKind {
    Single = 0b0000,
    First = 0b0001,
    Consecutive = 0b0010,
    FlowControl = 0b0011,
}

/// Protocol control information byte: frame type nibble plus the type
/// specific value nibble (SF_DL, FF_DL high bits, SN or FS)
#[bitfield(bits = 8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Pci {
    pub kind: FrameKind,
    pub value: B4,
}

/// Flow status carried by a flow control frame
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum FlowStatus {
    ClearToSend = 0,
    Wait = 1,
    Overflow = 2,
}

impl FlowStatus {
    fn from_nibble(value: u8) -> Result<Self, Error> {
        match value {
            0 => Ok(Self::ClearToSend),
            1 => Ok(Self::Wait),
            2 => Ok(Self::Overflow),
            _ => Err(Error::BadMessage),
        }
    }
}

/// Parameters decoded from a flow control frame
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct FlowControl {
    pub status: FlowStatus,

    /// Number of consecutive frames per block, 0 for "send all"
    pub block_size: u8,

    /// Minimum separation time between consecutive frames
    pub separation_us: u32,
}

/// Segmentation state of the in-flight transfer
#[derive(Debug, Default, Eq, PartialEq, Copy, Clone)]
pub struct Transfer {
    /// Total payload bytes announced for the transfer
    pub total: u32,

    /// Payload bytes still outstanding
    pub remaining: u32,

    /// Next expected or transmitted consecutive frame sequence number
    pub sequence: u8,
}

impl Transfer {
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    /// Byte offset of the next chunk within the caller buffer
    fn progress(&self) -> usize {
        (self.total - self.remaining) as usize
    }
}

/// Encodes a separation time to its STmin wire code (ISO 15765-2 §9.6.5.4).
/// Times between code points round up to the next encodable value, times
/// beyond 127 ms saturate at the 127 ms code.
pub fn separation_to_code(us: u32) -> u8 {
    if us == 0 {
        0x00
    } else if us <= 900 {
        0xF0 + (us.div_ceil(100) as u8)
    } else {
        us.div_ceil(1_000).min(127) as u8
    }
}

/// Decodes an STmin wire code to microseconds. Reserved codes map to the
/// maximum separation of 127 ms.
pub fn code_to_separation(code: u8) -> u32 {
    match code {
        0x00 => 0,
        0x01..=0x7F => u32::from(code) * 1_000,
        0xF1..=0xF9 => u32::from(code & 0x0F) * 100,
        _ => 127_000,
    }
}

/// Frame encoder/decoder bound to one link configuration.
///
/// The address extension byte is the only mutable state. It is prepended to
/// every prepared frame under extended or mixed addressing and tracks the
/// most recently received frame.
pub struct FrameCodec {
    format: CanFormat,
    addressing: AddressingMode,
    address_extension: u8,
}

impl FrameCodec {
    pub fn new(format: CanFormat, addressing: AddressingMode) -> Result<Self, Error> {
        max_isotp_datalen(addressing, format)?;

        Ok(Self {
            format,
            addressing,
            address_extension: 0,
        })
    }

    /// Current address extension byte
    pub fn address_extension(&self) -> u8 {
        self.address_extension
    }

    /// Sets the address extension byte sent with every frame
    pub fn set_address_extension(&mut self, extension: u8) {
        self.address_extension = extension;
    }

    fn extension_len(&self) -> usize {
        self.addressing.extension_len()
    }

    /// Frame capacity of the configured CAN format
    pub fn max_frame_len(&self) -> usize {
        self.format.max_datalen()
    }

    /// Largest payload a single frame carries with the short length encoding
    fn max_single_short(&self) -> usize {
        7 - self.extension_len()
    }

    /// Largest payload a single frame carries at all; beyond this the
    /// payload needs a first frame
    pub fn max_single_datalen(&self) -> usize {
        match self.format {
            CanFormat::Classic => self.max_single_short(),
            CanFormat::Fd => self.format.max_datalen() - self.extension_len() - 2,
        }
    }

    /// Smallest first frame announcement accepted on this link
    fn min_first_datalen(&self) -> u32 {
        let capacity = self.format.max_datalen() - self.extension_len();

        match (self.format, self.extension_len()) {
            (CanFormat::Classic, 0) => (capacity - 1) as u32,
            _ => (capacity - 2) as u32,
        }
    }

    fn write_extension(&self, frame: &mut [u8]) -> usize {
        if self.extension_len() == 1 {
            frame[0] = self.address_extension;
        }

        self.extension_len()
    }

    fn capture_extension(&mut self, frame: &[u8]) {
        if self.extension_len() == 1 {
            self.address_extension = frame[0];
        }
    }

    /// Classifies a received frame by the PCI nibble following the optional
    /// address extension
    pub fn frame_kind(&self, frame: &[u8]) -> Result<FrameKind, Error> {
        if frame.len() <= self.extension_len() || frame.len() > self.max_frame_len() {
            return Err(Error::BadMessage);
        }

        Pci::from_bytes([frame[self.extension_len()]])
            .kind_or_err()
            .map_err(|_| Error::BadMessage)
    }

    /// Builds a single frame around `payload` and returns the padded frame
    /// length. Payloads beyond 7 bytes (6 with address extension) use the
    /// 8 bit escape length, which only CAN FD frames can carry.
    pub fn prepare_single(&self, scratch: &mut [u8; MAX_FRAME_LEN], payload: &[u8]) -> Result<usize, Error> {
        if payload.is_empty() {
            return Err(Error::InvalidArg);
        }

        let extension = self.write_extension(scratch);

        let header = if payload.len() <= self.max_single_short() {
            scratch[extension] = Pci::new()
                .with_kind(FrameKind::Single)
                .with_value(payload.len() as u8)
                .into_bytes()[0];
            1
        } else if self.format == CanFormat::Fd && payload.len() <= self.max_single_datalen() {
            scratch[extension] = Pci::new().with_kind(FrameKind::Single).with_value(0).into_bytes()[0];
            scratch[extension + 1] = payload.len() as u8;
            2
        } else {
            return Err(Error::Overflow);
        };

        scratch[extension + header..extension + header + payload.len()].copy_from_slice(payload);

        link::pad_frame(scratch, extension + header + payload.len(), self.format)
    }

    /// Parses a single frame into `out` and returns the payload length.
    /// Clears the transfer counters: a single frame is a complete transfer.
    pub fn parse_single(
        &mut self,
        frame: &[u8],
        out: &mut [u8],
        transfer: &mut Transfer,
    ) -> Result<usize, Error> {
        let extension = self.extension_len();

        if frame.len() <= extension {
            return Err(Error::BadMessage);
        }

        let pci = Pci::from_bytes([frame[extension]]);

        let (datalen, header) = if pci.value() == 0 {
            // 8 bit escape length, CAN FD only
            if self.format != CanFormat::Fd {
                return Err(Error::NotSupported);
            }
            if frame.len() < extension + 2 {
                return Err(Error::BadMessage);
            }
            (frame[extension + 1] as usize, 2)
        } else {
            (pci.value() as usize, 1)
        };

        // SF_DL 0, nibble lengths above the short maximum and escape lengths
        // the short form could have carried are all reserved
        if header == 1 && datalen > self.max_single_short() {
            return Err(Error::NotSupported);
        }
        if header == 2 && (datalen <= self.max_single_short() || datalen > self.max_single_datalen()) {
            return Err(Error::NotSupported);
        }

        if frame.len() < extension + header + datalen {
            return Err(Error::BadMessage);
        }

        if out.len() < datalen {
            return Err(Error::NoBufSpace);
        }

        out[..datalen].copy_from_slice(&frame[extension + header..extension + header + datalen]);
        self.capture_extension(frame);
        transfer.reset();

        Ok(datalen)
    }

    /// Builds the first frame of a multi-frame transfer, initializes the
    /// transfer counters and returns the frame length. The first frame
    /// always occupies the full frame capacity.
    pub fn prepare_first(
        &self,
        scratch: &mut [u8; MAX_FRAME_LEN],
        payload: &[u8],
        transfer: &mut Transfer,
    ) -> Result<usize, Error> {
        if payload.len() as u64 > u64::from(MAX_TRANSFER_LEN) {
            return Err(Error::Range);
        }

        let total = payload.len() as u32;

        if total < self.min_first_datalen() {
            return Err(Error::InvalidArg);
        }

        let extension = self.write_extension(scratch);

        let header = if total <= FF_ESCAPE_THRESHOLD {
            scratch[extension] = Pci::new()
                .with_kind(FrameKind::First)
                .with_value((total >> 8) as u8)
                .into_bytes()[0];
            scratch[extension + 1] = (total & 0xFF) as u8;
            2
        } else {
            scratch[extension] = Pci::new().with_kind(FrameKind::First).with_value(0).into_bytes()[0];
            scratch[extension + 1] = 0;
            BigEndian::write_u32(&mut scratch[extension + 2..extension + 6], total);
            6
        };

        let copied = (self.max_frame_len() - extension - header).min(payload.len());
        scratch[extension + header..extension + header + copied].copy_from_slice(&payload[..copied]);

        transfer.total = total;
        transfer.remaining = total - copied as u32;
        transfer.sequence = 1;

        link::pad_frame(scratch, extension + header + copied, self.format)
    }

    /// Parses a first frame, initializes the transfer counters and copies
    /// the leading payload bytes into `out`. An announcement below the
    /// first frame minimum is a [Error::BadMessage], one beyond the
    /// capacity of `out` an [Error::Overflow].
    pub fn parse_first(
        &mut self,
        frame: &[u8],
        out: &mut [u8],
        transfer: &mut Transfer,
    ) -> Result<usize, Error> {
        let extension = self.extension_len();

        if frame.len() < extension + 2 {
            return Err(Error::BadMessage);
        }

        let pci = Pci::from_bytes([frame[extension]]);
        let high = u32::from(pci.value());
        let low = u32::from(frame[extension + 1]);

        let (total, header) = if high == 0 && low == 0 {
            // zero FF_DL marks the 32 bit escape encoding
            if frame.len() < extension + 6 {
                return Err(Error::BadMessage);
            }
            (BigEndian::read_u32(&frame[extension + 2..extension + 6]), 6)
        } else {
            ((high << 8) | low, 2)
        };

        if total > MAX_TRANSFER_LEN {
            return Err(Error::Range);
        }

        if total < self.min_first_datalen() {
            return Err(Error::BadMessage);
        }

        if total as usize > out.len() {
            return Err(Error::Overflow);
        }

        let copied = (frame.len() - extension - header).min(total as usize);
        out[..copied].copy_from_slice(&frame[extension + header..extension + header + copied]);

        self.capture_extension(frame);
        transfer.total = total;
        transfer.remaining = total - copied as u32;
        transfer.sequence = 1;

        Ok(copied)
    }

    /// Builds the next consecutive frame from the send buffer, advances the
    /// sequence counter and returns the padded frame length
    pub fn prepare_consecutive(
        &self,
        scratch: &mut [u8; MAX_FRAME_LEN],
        payload: &[u8],
        transfer: &mut Transfer,
    ) -> Result<usize, Error> {
        if transfer.remaining == 0 {
            return Err(Error::InvalidArg);
        }

        let extension = self.write_extension(scratch);

        scratch[extension] = Pci::new()
            .with_kind(FrameKind::Consecutive)
            .with_value(transfer.sequence & 0xF)
            .into_bytes()[0];

        let capacity = self.max_frame_len() - extension - 1;
        let chunk = capacity.min(transfer.remaining as usize);
        let offset = transfer.progress();

        scratch[extension + 1..extension + 1 + chunk].copy_from_slice(&payload[offset..offset + chunk]);

        transfer.sequence = (transfer.sequence + 1) & 0xF;
        transfer.remaining -= chunk as u32;

        link::pad_frame(scratch, extension + 1 + chunk, self.format)
    }

    /// Parses a consecutive frame into `out` at the transfer offset and
    /// returns the number of payload bytes consumed. A sequence number
    /// other than the expected one poisons the transfer: the expected
    /// counter moves outside 0..15 so every later frame keeps failing
    /// until the session is reset.
    pub fn parse_consecutive(
        &mut self,
        frame: &[u8],
        out: &mut [u8],
        transfer: &mut Transfer,
    ) -> Result<usize, Error> {
        let extension = self.extension_len();

        if frame.len() <= extension + 1 {
            return Err(Error::BadMessage);
        }

        let pci = Pci::from_bytes([frame[extension]]);

        if pci.value() != transfer.sequence {
            transfer.sequence = SEQUENCE_POISONED;
            return Err(Error::ConnectionAborted);
        }

        if transfer.total as usize > out.len() {
            return Err(Error::NoBufSpace);
        }

        let chunk = (frame.len() - extension - 1).min(transfer.remaining as usize);
        let offset = transfer.progress();

        out[offset..offset + chunk].copy_from_slice(&frame[extension + 1..extension + 1 + chunk]);

        self.capture_extension(frame);
        transfer.sequence = (transfer.sequence + 1) & 0xF;
        transfer.remaining -= chunk as u32;

        Ok(chunk)
    }

    /// Builds a flow control frame and returns the padded frame length
    pub fn prepare_flow_control(
        &self,
        scratch: &mut [u8; MAX_FRAME_LEN],
        status: FlowStatus,
        block_size: u8,
        separation_us: u32,
    ) -> Result<usize, Error> {
        let extension = self.write_extension(scratch);

        scratch[extension] = Pci::new()
            .with_kind(FrameKind::FlowControl)
            .with_value(status as u8)
            .into_bytes()[0];
        scratch[extension + 1] = block_size;
        scratch[extension + 2] = separation_to_code(separation_us);

        link::pad_frame(scratch, extension + 3, self.format)
    }

    /// Decodes a flow control frame. A reserved flow status is a
    /// [Error::BadMessage].
    pub fn parse_flow_control(&mut self, frame: &[u8]) -> Result<FlowControl, Error> {
        let extension = self.extension_len();

        if frame.len() < extension + 3 {
            return Err(Error::BadMessage);
        }

        let pci = Pci::from_bytes([frame[extension]]);
        let status = FlowStatus::from_nibble(pci.value())?;

        self.capture_extension(frame);

        Ok(FlowControl {
            status,
            block_size: frame[extension + 1],
            separation_us: code_to_separation(frame[extension + 2]),
        })
    }
}
