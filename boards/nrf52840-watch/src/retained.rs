//! Retained RAM allocations
//!
//! This module is the **ONLY** place in the firmware that uses `unsafe` or
//! places data with `#[link_section]`. Everything else goes through the safe
//! [`RetainedBackup`] handle.
//!
//! # Retained region
//!
//! `.uninit` is a `NOLOAD` section that cortex-m-rt neither copies nor
//! zeroes. nRF52 RAM keeps its contents across system reset (watchdog,
//! `SYSRESETREQ`, pin reset), so whatever the previous boot left there is
//! still present. After power-on it holds noise; the backup record's marker
//! tells the two apart.
//!
//! # Current allocations
//!
//! - **TIME_BACKUP**: [`BackupRecord`] (16 bytes)

#![allow(unsafe_code)]

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::ptr::{addr_of, addr_of_mut};
use core::sync::atomic::{AtomicBool, Ordering};

use watch_core::{BackupRecord, RetainedSlot};

#[repr(transparent)]
struct Retained(UnsafeCell<MaybeUninit<BackupRecord>>);

// SAFETY: only reachable through `RetainedBackup`, of which at most one
// exists (see `TAKEN`).
unsafe impl Sync for Retained {}

#[link_section = ".uninit.TIME_BACKUP"]
static TIME_BACKUP: Retained = Retained(UnsafeCell::new(MaybeUninit::uninit()));

static TAKEN: AtomicBool = AtomicBool::new(false);

/// Exclusive handle to the retained time backup record
///
/// Every access is a volatile read or write of a single field, so no Rust
/// reference to possibly-uninitialized memory is ever created.
pub struct RetainedBackup {
    record: *mut BackupRecord,
}

// SAFETY: the handle is unique and the pointee is a static.
unsafe impl Send for RetainedBackup {}

impl RetainedBackup {
    /// Claim the record; `None` after the first call
    pub fn take() -> Option<Self> {
        if TAKEN.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(Self {
            record: TIME_BACKUP.0.get().cast(),
        })
    }
}

impl RetainedSlot for RetainedBackup {
    fn marker(&self) -> u32 {
        // SAFETY: `record` points at the static, u32 has no invalid bit
        // patterns.
        unsafe { addr_of!((*self.record).marker).read_volatile() }
    }

    fn set_marker(&mut self, marker: u32) {
        // SAFETY: see `marker`; `&mut self` makes this the only accessor.
        unsafe { addr_of_mut!((*self.record).marker).write_volatile(marker) }
    }

    fn timestamp(&self) -> i64 {
        // SAFETY: see `marker`.
        unsafe { addr_of!((*self.record).timestamp).read_volatile() }
    }

    fn set_timestamp(&mut self, timestamp: i64) {
        // SAFETY: see `set_marker`.
        unsafe { addr_of_mut!((*self.record).timestamp).write_volatile(timestamp) }
    }
}
