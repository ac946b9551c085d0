use crate::error::Error;
use crate::session::CanDriver;
use alloc::vec::Vec;
use core::cell::RefCell;
use embedded_hal::blocking::delay::DelayUs;
use embedded_time::clock::Error as ClockError;
use embedded_time::duration::{Duration, Fraction};
use embedded_time::fixed_point::FixedPoint;
use embedded_time::timer::param::{Armed, OneShot};
use embedded_time::{Clock, Instant, Timer};
use mockall::mock;

#[derive(Debug, PartialEq, Eq)]
pub struct TestClock {
    pub next_instants: RefCell<Vec<u64>>,
}

impl TestClock {
    pub fn new(next_instants: Vec<u64>) -> Self {
        Self {
            next_instants: RefCell::new(next_instants),
        }
    }
}

impl Clock for TestClock {
    type T = u64;
    const SCALING_FACTOR: Fraction = Fraction::new(1, 1_000_000);

    fn try_now(&self) -> Result<Instant<Self>, ClockError> {
        if self.next_instants.borrow().len() == 0 {
            return Err(ClockError::Unspecified);
        }

        Ok(Instant::new(self.next_instants.borrow_mut().remove(0)))
    }

    fn new_timer<Dur>(&self, duration: Dur) -> Timer<OneShot, Armed, Self, Dur>
    where
        Dur: Duration + FixedPoint,
    {
        Timer::new(self, duration)
    }
}

/// Records every requested STmin pause
pub struct TestDelay {
    pub pauses: Vec<u32>,
}

impl TestDelay {
    pub fn new() -> Self {
        Self { pauses: Vec::new() }
    }
}

impl DelayUs<u32> for TestDelay {
    fn delay_us(&mut self, us: u32) {
        self.pauses.push(us);
    }
}

mock! {
    pub Bus {}

    impl CanDriver for Bus {
        fn receive(&mut self, frame: &mut [u8], timeout_us: u32) -> Result<usize, Error>;

        fn transmit(&mut self, frame: &[u8], timeout_us: u32) -> Result<usize, Error>;
    }
}
