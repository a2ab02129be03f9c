//! Retained-memory time backup
//!
//! A single `{ marker, timestamp }` record lives in RAM that the reset
//! handler does not zero. After a warm reset it still holds the last
//! snapshot; after power-on it holds noise. The marker is the only thing
//! that tells the two apart, so every read goes through
//! [`BackupStore::validate_or_reset`] first.
//!
//! The record itself is reached through [`RetainedSlot`] so a board can
//! implement it with volatile accesses on a linker-placed static, while tests
//! use a plain [`BackupRecord`].

use hal_abstractions::WallClock;

use crate::config::BackupInterval;
use crate::error::TimeError;

/// Marker value identifying a record written by this firmware
pub const VALID_MARKER: u32 = 0xFEED_BABE;

/// Retained backup record layout
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupRecord {
    /// Validity marker, [`VALID_MARKER`] when the record is meaningful
    pub marker: u32,
    /// Last saved time in seconds since the Unix epoch
    pub timestamp: i64,
}

/// Storage for one [`BackupRecord`] that survives warm reset
pub trait RetainedSlot {
    fn marker(&self) -> u32;
    fn set_marker(&mut self, marker: u32);
    fn timestamp(&self) -> i64;
    fn set_timestamp(&mut self, timestamp: i64);
}

impl RetainedSlot for BackupRecord {
    fn marker(&self) -> u32 {
        self.marker
    }

    fn set_marker(&mut self, marker: u32) {
        self.marker = marker;
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }

    fn set_timestamp(&mut self, timestamp: i64) {
        self.timestamp = timestamp;
    }
}

impl<S: RetainedSlot + ?Sized> RetainedSlot for &mut S {
    fn marker(&self) -> u32 {
        (**self).marker()
    }

    fn set_marker(&mut self, marker: u32) {
        (**self).set_marker(marker)
    }

    fn timestamp(&self) -> i64 {
        (**self).timestamp()
    }

    fn set_timestamp(&mut self, timestamp: i64) {
        (**self).set_timestamp(timestamp)
    }
}

/// Re-arms the snapshot timer
///
/// Each call requests exactly one [`Event::BackupDue`](crate::event::Event)
/// after `interval`. The service calls it again after every snapshot, so the
/// period drifts with worker load instead of being a strict periodic timer.
pub trait BackupScheduler {
    fn schedule_backup(&mut self, interval: BackupInterval);
}

/// Backup store over a retained slot
pub struct BackupStore<R> {
    slot: R,
    fallback: i64,
}

impl<R: RetainedSlot> BackupStore<R> {
    /// Wrap `slot`, resetting to `fallback` when it holds no valid record
    pub fn new(slot: R, fallback: i64) -> Self {
        Self { slot, fallback }
    }

    /// Read the retained timestamp if the record is valid
    pub fn restore(&self) -> Result<i64, TimeError> {
        if self.slot.marker() == VALID_MARKER {
            Ok(self.slot.timestamp())
        } else {
            Err(TimeError::RetainedStateInvalid)
        }
    }

    /// Validate the retained record and return the boot-time seed
    ///
    /// An invalid record is re-initialized with the marker and the fallback
    /// timestamp, which is then returned. Call once per boot, before any
    /// snapshot is scheduled.
    pub fn validate_or_reset(&mut self) -> i64 {
        match self.restore() {
            Ok(timestamp) => {
                info!("Restored previous time: {}", timestamp);
                timestamp
            }
            Err(_) => {
                warn!("Unable to restore previous time");
                self.slot.set_marker(VALID_MARKER);
                self.slot.set_timestamp(self.fallback);
                self.fallback
            }
        }
    }

    /// Save the clock's current time, truncated to whole seconds
    ///
    /// A clock read failure leaves the previous record in place.
    pub fn snapshot<K: WallClock>(&mut self, clock: &K) {
        match clock.now() {
            Ok(now) => self.slot.set_timestamp(now.unix_secs),
            Err(_) => debug!("Clock unavailable, keeping previous backup"),
        }
    }

    /// Underlying slot
    pub fn slot(&self) -> &R {
        &self.slot
    }
}
