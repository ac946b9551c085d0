//! # Protocol timer
//! Supervision of the ISO 15765-2 timeouts (N_As, N_Bs, N_Cr) against a
//! monotonic [embedded_time::Clock]. Expiry is computed as a deadline
//! comparison; a limit of zero never expires and stands for disabled
//! enforcement.
use crate::error::Error;
use embedded_time::duration::Microseconds;
use embedded_time::{Clock, Instant};

/// Timer covering the pending protocol phase of one transfer
pub struct TransferTimer<CLK: Clock> {
    started: Option<Instant<CLK>>,
}

impl<CLK: Clock> Default for TransferTimer<CLK> {
    fn default() -> Self {
        Self::new()
    }
}

impl<CLK: Clock> TransferTimer<CLK> {
    pub fn new() -> Self {
        Self { started: None }
    }

    /// Marks the begin of the supervised phase
    pub fn start(&mut self, clock: &CLK) -> Result<(), Error> {
        self.started = Some(clock.try_now()?);
        Ok(())
    }

    /// Stops supervision until the next start
    pub fn clear(&mut self) {
        self.started = None;
    }

    /// True once at least `limit_us` elapsed since the last start. Never
    /// true for a limit of zero or a timer that was not started.
    pub fn expired(&self, clock: &CLK, limit_us: u32) -> Result<bool, Error> {
        if limit_us == 0 {
            return Ok(false);
        }

        let started = match self.started {
            Some(instant) => instant,
            None => return Ok(false),
        };

        let deadline = started.checked_add(Microseconds::new(limit_us)).ok_or(Error::Time)?;

        Ok(clock.try_now()? >= deadline)
    }
}
