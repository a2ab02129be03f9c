//! Time service configuration

use core::num::NonZeroU32;

use crate::lifecycle::ModuleId;

/// Fixed fallback time used when no valid backup exists
///
/// 2022-01-01 00:00:00 UTC
pub const DEFAULT_FALLBACK_TIMESTAMP: i64 = 1_640_995_200;

/// Period between retained-time snapshots, at least one second
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupInterval(NonZeroU32);

impl BackupInterval {
    /// Default snapshot period (one minute)
    pub const DEFAULT: Self = match Self::from_secs(60) {
        Some(interval) => interval,
        None => panic!("backup interval must be at least one second"),
    };

    /// Interval of `secs` seconds, or `None` for zero
    pub const fn from_secs(secs: u32) -> Option<Self> {
        match NonZeroU32::new(secs) {
            Some(secs) => Some(Self(secs)),
            None => None,
        }
    }

    /// Interval in whole seconds
    pub const fn as_secs(&self) -> u32 {
        self.0.get()
    }
}

impl Default for BackupInterval {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Time service configuration
#[derive(Debug, Clone, Copy)]
pub struct TimeConfig {
    /// Keep a retained-memory backup of the current time
    pub backup_enabled: bool,
    /// Period between backup snapshots
    pub backup_interval: BackupInterval,
    /// Seed time when no valid backup exists (seconds since the Unix epoch)
    pub fallback_timestamp: i64,
    /// Synchronize from the peer's Current Time Service
    pub cts_client_enabled: bool,
    /// Module whose readiness triggers initialization
    pub upstream: ModuleId,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            backup_enabled: true,
            backup_interval: BackupInterval::DEFAULT,
            fallback_timestamp: DEFAULT_FALLBACK_TIMESTAMP,
            cts_client_enabled: true,
            upstream: ModuleId::MAIN,
        }
    }
}
