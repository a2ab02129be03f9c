//! Platform-agnostic time service logic for wearable firmware
//!
//! Keeps the device wall clock meaningful across warm resets and
//! synchronizes it from a connected phone's Current Time Service. This crate
//! has NO hardware dependencies: the clock, the BLE stack, the retained RAM
//! slot and the backup timer are all reached through traits that each board
//! implements.
//!
//! - [`backup`]: retained-memory snapshot of the current time
//! - [`cts`]: Current Time Service client
//! - [`discovery`]: per-link service discovery state machine
//! - [`lifecycle`]: once-only initialization and module state reporting
//! - [`service`]: event-driven worker tying the above together

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]
#![deny(warnings)]

// Must come first so the logging macros are visible to every module
mod fmt;

pub mod backup;
pub mod calendar;
pub mod config;
pub mod cts;
pub mod discovery;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod service;

#[cfg(test)]
mod testing;

pub use backup::{BackupRecord, BackupScheduler, BackupStore, RetainedSlot, VALID_MARKER};
pub use config::{BackupInterval, TimeConfig};
pub use error::TimeError;
pub use event::{Event, NotificationPayload};
pub use lifecycle::{ModuleId, ModuleState, ModuleStateEvent, StatePublisher};
pub use service::TimeService;
