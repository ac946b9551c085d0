//!# ISO-TP session
//!
//!```
//! use isotp::config::Configuration;
//! use isotp::example::{ExampleBus, ExampleClock, ExampleDelay};
//! use isotp::session::IsoTp;
//!
//! let clock = ExampleClock::default();
//! let bus = ExampleBus::default();
//!
//! // Initialize session object
//! let mut session = IsoTp::new(bus, ExampleDelay {}, &Configuration::default()).unwrap();
//!
//! // Two bytes fit a single frame, no flow control round trip needed
//! let sent = session.send(&[0x3E, 0x00], 100_000, &clock).unwrap();
//! assert_eq!(2, sent);
//! ```
use crate::config::{Configuration, Timeouts};
use crate::error::Error;
use crate::frame::{FlowControl, FlowStatus, FrameCodec, FrameKind, Transfer};
use crate::link::MAX_FRAME_LEN;
use crate::timer::TransferTimer;
use embedded_hal::blocking::delay::DelayUs;
use embedded_time::Clock;
use log::debug;

/// Blocking CAN driver boundary.
///
/// Both calls block until the frame is handled, the budget in microseconds
/// expires or the driver fails. [CanDriver::receive] returns the number of
/// bytes placed into `frame`; zero means no frame arrived within the budget.
/// [CanDriver::transmit] returns the number of bytes drained. Every error
/// return is fatal to the in-flight transfer. Driver implementations share
/// the [Error] vocabulary of this crate.
pub trait CanDriver {
    /// Receive a CAN frame payload
    fn receive(&mut self, frame: &mut [u8], timeout_us: u32) -> Result<usize, Error>;

    /// Transmit a CAN frame payload
    fn transmit(&mut self, frame: &[u8], timeout_us: u32) -> Result<usize, Error>;
}

/// ISO-TP session over a single CAN driver.
///
/// A session is either idle, sending or receiving; a single context must not
/// be shared between concurrent callers. After an aborted transfer the
/// caller must [IsoTp::reset] the session before starting the next one.
pub struct IsoTp<B: CanDriver, D: DelayUs<u32>, CLK: Clock> {
    /// CAN driver
    bus: B,

    /// Pause provider for STmin pacing
    pub(crate) delay: D,

    /// Frame codec bound to the link configuration
    codec: FrameCodec,

    /// Normalized protocol timeouts
    timeouts: Timeouts,

    /// Tolerated flow control wait frames per transfer, 0 disables
    fc_wait_max: u8,

    /// Segmentation state of the in-flight transfer
    pub(crate) transfer: Transfer,

    /// Frame assembly/parse buffer
    scratch: [u8; MAX_FRAME_LEN],

    /// Wait frames seen since the last clear to send
    pub(crate) fc_wait_count: u32,

    /// Block size of the most recent flow control
    pub(crate) fc_block_size: u8,

    /// Separation time of the most recent flow control
    pub(crate) fc_separation_us: u32,

    /// Supervision of the pending protocol phase
    timer: TransferTimer<CLK>,
}

impl<B: CanDriver, D: DelayUs<u32>, CLK: Clock> IsoTp<B, D, CLK> {
    /// Creates a session for the given driver and configuration. Timeout
    /// fields left at zero fall back to the one second default.
    pub fn new(bus: B, delay: D, config: &Configuration) -> Result<Self, Error> {
        Ok(Self {
            bus,
            delay,
            codec: FrameCodec::new(config.format, config.addressing)?,
            timeouts: config.timeouts.normalized(),
            fc_wait_max: config.fc_wait_max,
            transfer: Transfer::default(),
            scratch: [0u8; MAX_FRAME_LEN],
            fc_wait_count: 0,
            fc_block_size: 0,
            fc_separation_us: 0,
            timer: TransferTimer::new(),
        })
    }

    /// Clears all per-transfer state. The link configuration and the
    /// current address extension survive.
    pub fn reset(&mut self) {
        self.transfer.reset();
        self.fc_wait_count = 0;
        self.fc_block_size = 0;
        self.fc_separation_us = 0;
        self.timer.clear();
    }

    /// Current address extension byte; tracks the most recently received
    /// frame under extended or mixed addressing
    pub fn address_extension(&self) -> u8 {
        self.codec.address_extension()
    }

    /// Sets the address extension byte used for outgoing frames
    pub fn set_address_extension(&mut self, extension: u8) {
        self.codec.set_address_extension(extension);
    }

    /// Sends one ISO-TP payload and returns the number of bytes sent.
    ///
    /// Payloads up to the single frame capacity go out as one frame. Larger
    /// payloads run the multi-frame handshake: first frame, flow control
    /// arbitration, consecutive frames with STmin pacing and block wise
    /// flow control renewal. `timeout_us` is the budget handed to every
    /// driver call; the protocol timers N_As and N_Bs are enforced on top.
    pub fn send(&mut self, payload: &[u8], timeout_us: u32, clock: &CLK) -> Result<usize, Error> {
        if payload.len() as u64 > u64::from(crate::frame::MAX_TRANSFER_LEN) {
            return Err(Error::Range);
        }

        if payload.len() <= self.codec.max_single_datalen() {
            let frame_len = self.codec.prepare_single(&mut self.scratch, payload)?;
            self.bus.transmit(&self.scratch[..frame_len], timeout_us)?;
            debug!("TX SF, {} bytes", payload.len());
            return Ok(payload.len());
        }

        let frame_len = self.codec.prepare_first(&mut self.scratch, payload, &mut self.transfer)?;
        self.bus.transmit(&self.scratch[..frame_len], timeout_us)?;
        debug!("TX FF, announcing {} bytes", self.transfer.total);

        self.timer.start(clock)?;
        let mut wait_limit = self.timeouts.n_as;

        loop {
            let flow = self.await_clear_to_send(timeout_us, clock, wait_limit)?;
            self.fc_block_size = flow.block_size;
            self.fc_separation_us = flow.separation_us;

            let mut block_remaining = flow.block_size;

            loop {
                let frame_len = self.codec.prepare_consecutive(&mut self.scratch, payload, &mut self.transfer)?;
                self.bus.transmit(&self.scratch[..frame_len], timeout_us)?;

                if self.transfer.remaining == 0 {
                    debug!("TX done, {} bytes", self.transfer.total);
                    return Ok(payload.len());
                }

                if self.fc_separation_us > 0 {
                    self.delay.delay_us(self.fc_separation_us);
                }

                if flow.block_size > 0 {
                    block_remaining -= 1;
                    if block_remaining == 0 {
                        // block exhausted, the peer owes the next clear to send
                        self.timer.start(clock)?;
                        break;
                    }
                }
            }

            wait_limit = self.timeouts.n_bs;
        }
    }

    /// Waits for the next flow control that clears the send path.
    ///
    /// Wait frames restart the supervision with N_Bs and are counted
    /// against `fc_wait_max`; an overflow report or a wait overrun aborts
    /// the transfer. Frames of any other type are stray traffic here.
    fn await_clear_to_send(
        &mut self,
        timeout_us: u32,
        clock: &CLK,
        mut limit_us: u32,
    ) -> Result<FlowControl, Error> {
        loop {
            if self.timer.expired(clock, limit_us)? {
                debug!("no flow control within {limit_us} us");
                return Err(Error::TimedOut);
            }

            let received = self.bus.receive(&mut self.scratch, timeout_us)?;
            if received == 0 {
                continue;
            }

            match self.codec.frame_kind(&self.scratch[..received]) {
                Ok(FrameKind::FlowControl) => {}
                Ok(_) | Err(_) => continue,
            }

            let flow = self.codec.parse_flow_control(&self.scratch[..received])?;

            match flow.status {
                FlowStatus::ClearToSend => {
                    self.fc_wait_count = 0;
                    return Ok(flow);
                }
                FlowStatus::Wait => {
                    self.fc_wait_count += 1;
                    if self.fc_wait_max > 0 && self.fc_wait_count > u32::from(self.fc_wait_max) {
                        debug!("wait frame limit of {} exceeded", self.fc_wait_max);
                        return Err(Error::ConnectionAborted);
                    }
                    self.timer.start(clock)?;
                    limit_us = self.timeouts.n_bs;
                }
                FlowStatus::Overflow => {
                    debug!("peer reported receive overflow");
                    return Err(Error::ConnectionAborted);
                }
            }
        }
    }

    /// Receives one ISO-TP payload into `out` and returns its length.
    ///
    /// `block_size` and `separation_us` are announced to the peer in every
    /// clear to send. `timeout_us` is the budget handed to every driver
    /// call; between consecutive frames N_Cr is enforced on top. While no
    /// reception is in flight, a driver budget that elapses without a frame
    /// surfaces as [Error::TimedOut].
    pub fn receive(
        &mut self,
        out: &mut [u8],
        block_size: u8,
        separation_us: u32,
        timeout_us: u32,
        clock: &CLK,
    ) -> Result<usize, Error> {
        let mut block_remaining = block_size;

        // idle: wait for the start of a reception
        loop {
            let received = self.bus.receive(&mut self.scratch, timeout_us)?;
            if received == 0 {
                return Err(Error::TimedOut);
            }

            match self.codec.frame_kind(&self.scratch[..received]) {
                Ok(FrameKind::Single) => {
                    let datalen = self.codec.parse_single(&self.scratch[..received], out, &mut self.transfer)?;
                    debug!("RX SF, {datalen} bytes");
                    return Ok(datalen);
                }
                Ok(FrameKind::First) => {
                    match self.codec.parse_first(&self.scratch[..received], out, &mut self.transfer) {
                        Ok(_) => {}
                        // an announcement below the first frame minimum is ignored
                        Err(Error::BadMessage) => continue,
                        Err(Error::Overflow) => {
                            let frame_len =
                                self.codec
                                    .prepare_flow_control(&mut self.scratch, FlowStatus::Overflow, 0, 0)?;
                            self.bus.transmit(&self.scratch[..frame_len], timeout_us)?;
                            debug!("RX FF exceeds buffer of {} bytes", out.len());
                            return Err(Error::Overflow);
                        }
                        Err(error) => return Err(error),
                    }

                    debug!("RX FF, announcing {} bytes", self.transfer.total);

                    if self.transfer.remaining == 0 {
                        // the whole announcement fit into the first frame
                        return Ok(self.transfer.total as usize);
                    }

                    let frame_len = self.codec.prepare_flow_control(
                        &mut self.scratch,
                        FlowStatus::ClearToSend,
                        block_size,
                        separation_us,
                    )?;
                    self.bus.transmit(&self.scratch[..frame_len], timeout_us)?;
                    self.timer.start(clock)?;
                    break;
                }
                // stray consecutive and flow control frames outside a transfer
                Ok(_) | Err(_) => continue,
            }
        }

        // reassemble consecutive frames
        loop {
            if self.timer.expired(clock, self.timeouts.n_cr)? {
                debug!("no consecutive frame within {} us", self.timeouts.n_cr);
                return Err(Error::TimedOut);
            }

            let received = self.bus.receive(&mut self.scratch, timeout_us)?;
            if received == 0 {
                continue;
            }

            match self.codec.frame_kind(&self.scratch[..received]) {
                Ok(FrameKind::Consecutive) => {}
                Ok(_) | Err(_) => continue,
            }

            self.codec.parse_consecutive(&self.scratch[..received], out, &mut self.transfer)?;

            if self.transfer.remaining == 0 {
                debug!("RX done, {} bytes", self.transfer.total);
                return Ok(self.transfer.total as usize);
            }

            if block_size > 0 {
                block_remaining -= 1;
                if block_remaining == 0 {
                    let frame_len = self.codec.prepare_flow_control(
                        &mut self.scratch,
                        FlowStatus::ClearToSend,
                        block_size,
                        separation_us,
                    )?;
                    self.bus.transmit(&self.scratch[..frame_len], timeout_us)?;
                    block_remaining = block_size;
                }
            }

            self.timer.start(clock)?;
        }
    }
}
