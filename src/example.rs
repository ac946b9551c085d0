//! # Mock dummy structures for doc examples
use crate::error::Error;
use crate::session::CanDriver;
use alloc::vec;
use alloc::vec::Vec;
use core::cell::RefCell;
use embedded_hal::blocking::delay::DelayUs;
use embedded_time::clock::Error as ClockError;
use embedded_time::duration::{Duration, Fraction};
use embedded_time::fixed_point::FixedPoint;
use embedded_time::timer::param::{Armed, OneShot};
use embedded_time::{Clock, Instant, Timer};

/// Scripted loopback driver: hands out the prepared frames on receive and
/// records every transmitted frame
#[derive(Default)]
pub struct ExampleBus {
    rx_frames: Vec<Vec<u8>>,

    /// Frames captured from transmit calls
    pub tx_frames: Vec<Vec<u8>>,
}

impl ExampleBus {
    pub fn new(rx_frames: Vec<Vec<u8>>) -> Self {
        Self {
            rx_frames,
            tx_frames: Vec::new(),
        }
    }
}

impl CanDriver for ExampleBus {
    fn receive(&mut self, frame: &mut [u8], _timeout_us: u32) -> Result<usize, Error> {
        if self.rx_frames.is_empty() {
            return Ok(0);
        }

        let next = self.rx_frames.remove(0);
        frame[..next.len()].copy_from_slice(&next);
        Ok(next.len())
    }

    fn transmit(&mut self, frame: &[u8], _timeout_us: u32) -> Result<usize, Error> {
        self.tx_frames.push(frame.to_vec());
        Ok(frame.len())
    }
}

/// Delay provider that returns immediately
pub struct ExampleDelay {}

impl DelayUs<u32> for ExampleDelay {
    fn delay_us(&mut self, _us: u32) {}
}

#[derive(Debug, PartialEq, Eq)]
pub struct ExampleClock {
    pub next_instants: RefCell<Vec<u64>>,
}

impl ExampleClock {
    pub fn new(next_instants: Vec<u64>) -> Self {
        Self {
            next_instants: RefCell::new(next_instants),
        }
    }
}

impl Default for ExampleClock {
    fn default() -> Self {
        Self::new(vec![
            100,   // Transfer: Timer start
            200,   // First expiration check
            300,   // Timer restart
            400,   // Second expiration check
            500,   // Timer restart
            600,   // Third expiration check
        ])
    }
}

impl Clock for ExampleClock {
    type T = u64;
    const SCALING_FACTOR: Fraction = Fraction::new(1, 1_000_000);

    fn try_now(&self) -> Result<Instant<Self>, ClockError> {
        if self.next_instants.borrow().len() == 0 {
            return Err(ClockError::Unspecified);
        }

        Ok(Instant::new(self.next_instants.borrow_mut().remove(0)))
    }

    fn new_timer<Dur: Duration + FixedPoint>(&self, duration: Dur) -> Timer<OneShot, Armed, Self, Dur> {
        Timer::new(self, duration)
    }
}
