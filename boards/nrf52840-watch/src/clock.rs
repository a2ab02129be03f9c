#![deny(unsafe_code)]
#![deny(warnings)]
//! Device wall clock
//!
//! CLOCK_REALTIME style: the RTC1 monotonic keeps counting 32.768 kHz ticks
//! and the wall clock is `base_unix + (now_mono - base_mono)`, where the base
//! pair is captured whenever the time is set. The RTC has no calendar, so
//! setting the time never touches hardware.

use defmt::Format;
use rtic_monotonics::nrf::rtc::prelude::*;

use hal_abstractions::{CanonicalTime, Timestamp, WallClock};
use watch_core::calendar;

use crate::Mono;

/// Clock operation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum ClockError {
    /// Time has not been set since boot
    NotCalibrated,
    /// Calendar fields out of range
    InvalidTime,
}

#[derive(Debug, Clone, Copy)]
struct Calibration {
    /// Wall-clock time at calibration, microseconds since the Unix epoch
    unix_micros: i64,
    /// Monotonic time at calibration, microseconds since boot
    mono_micros: u64,
}

/// Wall clock derived from the RTC1 monotonic
pub struct DeviceClock {
    base: Option<Calibration>,
}

impl DeviceClock {
    pub const fn new() -> Self {
        Self { base: None }
    }
}

fn mono_micros() -> u64 {
    Mono::now().duration_since_epoch().to_micros()
}

impl WallClock for DeviceClock {
    type Error = ClockError;

    fn set_time(&mut self, time: &CanonicalTime) -> Result<(), ClockError> {
        if !calendar::is_valid(time) {
            return Err(ClockError::InvalidTime);
        }

        self.base = Some(Calibration {
            unix_micros: calendar::to_unix(time).saturating_mul(1_000_000),
            mono_micros: mono_micros(),
        });
        Ok(())
    }

    fn now(&self) -> Result<Timestamp, ClockError> {
        let base = self.base.ok_or(ClockError::NotCalibrated)?;

        // The 64-bit tick count does not wrap within the device lifetime
        let elapsed = mono_micros().saturating_sub(base.mono_micros) as i64;
        let now = base.unix_micros.saturating_add(elapsed);

        Ok(Timestamp::new(
            now.div_euclid(1_000_000),
            now.rem_euclid(1_000_000) as u32,
        ))
    }
}
