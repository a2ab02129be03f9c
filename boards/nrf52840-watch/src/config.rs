#![deny(unsafe_code)]
#![deny(warnings)]
//! Board configuration

use watch_core::config::DEFAULT_FALLBACK_TIMESTAMP;
use watch_core::{BackupInterval, ModuleId, TimeConfig};

/// Advertised device name
pub const DEVICE_NAME: &str = "Watch";

/// Time service settings
pub const TIME: TimeConfig = TimeConfig {
    backup_enabled: true,
    backup_interval: BackupInterval::DEFAULT,
    fallback_timestamp: DEFAULT_FALLBACK_TIMESTAMP,
    cts_client_enabled: true,
    upstream: ModuleId::MAIN,
};

/// Depth of the time service event queue
pub const EVENT_QUEUE_DEPTH: usize = 8;

/// Depth of the BLE command queue
pub const COMMAND_QUEUE_DEPTH: usize = 4;
