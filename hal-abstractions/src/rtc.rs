//! Wall-clock abstraction
//!
//! The device clock is written with broken-down calendar fields and read back
//! as seconds since the Unix epoch, matching what a board RTC driver (or a
//! monotonic-counter based clock) naturally provides.

/// Timestamp with microsecond precision
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timestamp {
    /// Seconds since 1970-01-01 00:00:00 UTC (negative before the epoch)
    pub unix_secs: i64,
    /// Microseconds component (0-999,999)
    pub micros: u32,
}

impl Timestamp {
    /// Create a new timestamp
    pub const fn new(unix_secs: i64, micros: u32) -> Self {
        Self { unix_secs, micros }
    }

    /// Timestamp with whole-second precision
    pub const fn from_secs(unix_secs: i64) -> Self {
        Self::new(unix_secs, 0)
    }
}

/// Broken-down UTC calendar time
///
/// Field conventions follow C's `struct tm`: `month` counts from 0 (January)
/// to 11 (December) and `year` is the number of years since 1900.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CanonicalTime {
    /// Seconds after the minute (0-59, 60 for a leap second)
    pub seconds: u8,
    /// Minutes after the hour (0-59)
    pub minutes: u8,
    /// Hours since midnight (0-23)
    pub hours: u8,
    /// Day of the month (1-31)
    pub day: u8,
    /// Months since January (0-11)
    pub month: u8,
    /// Years since 1900
    pub year: i32,
}

impl CanonicalTime {
    /// Offset between `year` and the Gregorian year number
    pub const YEAR_BASE: i32 = 1900;

    /// Month in 1-12 terms; out-of-range fields wrap rather than panic
    pub const fn month_number(&self) -> u8 {
        self.month.wrapping_add(1)
    }

    /// Gregorian year number, widened so every `year` value has one
    pub const fn full_year(&self) -> i64 {
        self.year as i64 + Self::YEAR_BASE as i64
    }
}

/// Device wall clock
///
/// Implementations must not block: a clock that cannot service a request
/// right now reports an error instead of waiting.
pub trait WallClock {
    /// Clock-specific error
    type Error: core::fmt::Debug;

    /// Set the current UTC date and time
    fn set_time(&mut self, time: &CanonicalTime) -> Result<(), Self::Error>;

    /// Read the current UTC time
    fn now(&self) -> Result<Timestamp, Self::Error>;
}
