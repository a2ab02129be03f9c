//! Hardware abstraction traits for wearable firmware
//!
//! This crate defines the traits that sit between the platform-agnostic
//! time service and a concrete board. BSPs implement these traits.
//!
//! - **`rtc`**: wall-clock read/write and the broken-down time it accepts
//! - **`ble`**: GATT client primitives for service discovery and
//!   notification subscription

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]
#![deny(warnings)]

pub mod ble;
pub mod rtc;

pub use ble::{CharacteristicHandles, DiscoveryData, GattAttribute, GattClient, PeerState};
pub use rtc::{CanonicalTime, Timestamp, WallClock};
