//! Module lifecycle and the one-shot initialization sequence
//!
//! The time service initializes exactly once, when the upstream module
//! (`main` by default) reports `Ready`:
//!
//! 1. seed from the retained backup, or the fallback time
//! 2. apply the seed to the clock (fatal on failure)
//! 3. arm the periodic backup snapshot
//! 4. initialize the CTS client (fatal on failure)
//! 5. report `Ready`
//!
//! Exactly one lifecycle event is published per run.

use hal_abstractions::{GattClient, WallClock};

use crate::backup::{BackupScheduler, RetainedSlot};
use crate::calendar;
use crate::error::TimeError;
use crate::service::TimeService;

/// Name of a module on the application event bus
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleId(pub &'static str);

impl ModuleId {
    /// Application main module, ready once platform facilities are up
    pub const MAIN: Self = Self("main");
    /// This time service
    pub const CTS: Self = Self("cts");
}

/// Lifecycle state of a module
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    Uninitialized,
    Ready,
    Error,
}

/// Lifecycle transition announced by a module
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleStateEvent {
    pub module: ModuleId,
    pub state: ModuleState,
}

impl ModuleStateEvent {
    pub const fn new(module: ModuleId, state: ModuleState) -> Self {
        Self { module, state }
    }
}

/// Sink for this module's lifecycle announcements
pub trait StatePublisher {
    fn publish(&mut self, event: ModuleStateEvent);
}

/// Module state with the once-only initialization guard
#[derive(Debug)]
pub struct Lifecycle {
    state: ModuleState,
    initialized: bool,
}

impl Lifecycle {
    pub const fn new() -> Self {
        Self {
            state: ModuleState::Uninitialized,
            initialized: false,
        }
    }

    pub fn state(&self) -> ModuleState {
        self.state
    }

    /// Claim the single initialization run
    fn enter(&mut self) -> bool {
        !core::mem::replace(&mut self.initialized, true)
    }

    /// Leave `Uninitialized` and announce the new state
    fn settle<P: StatePublisher>(&mut self, state: ModuleState, publisher: &mut P) {
        debug_assert_eq!(self.state, ModuleState::Uninitialized);
        self.state = state;
        publisher.publish(ModuleStateEvent::new(ModuleId::CTS, state));
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl<G, K, R, S, P> TimeService<G, K, R, S, P>
where
    G: GattClient,
    K: WallClock,
    R: RetainedSlot,
    S: BackupScheduler,
    P: StatePublisher,
{
    /// Run the initialization sequence
    pub(crate) fn initialize(&mut self) -> Result<(), TimeError> {
        if !self.lifecycle.enter() {
            error!("CTS module initialized twice");
            debug_assert!(false, "CTS module initialized twice");
            return Ok(());
        }

        let seed = match self.backup.as_mut() {
            Some(store) => store.validate_or_reset(),
            None => self.config.fallback_timestamp,
        };

        if let Err(e) = self.apply_seed(seed) {
            error!("Failed setting initial datetime");
            self.lifecycle.settle(ModuleState::Error, &mut self.publisher);
            return Err(e);
        }

        if self.backup.is_some() {
            self.scheduler.schedule_backup(self.config.backup_interval);
        }

        if self.config.cts_client_enabled {
            if let Err(e) = self.client.initialize(&mut self.gatt) {
                self.lifecycle.settle(ModuleState::Error, &mut self.publisher);
                return Err(e);
            }
        }

        info!("CTS module initialized");
        self.lifecycle.settle(ModuleState::Ready, &mut self.publisher);
        Ok(())
    }

    fn apply_seed(&mut self, seed: i64) -> Result<(), TimeError> {
        let time = calendar::to_canonical(seed).ok_or(TimeError::ClockApplyFailed)?;
        self.clock
            .set_time(&time)
            .map_err(|_| TimeError::ClockApplyFailed)
    }
}
