//! Host-side doubles for the platform traits
#![allow(dead_code)]

use core::cell::Cell;

use hal_abstractions::ble::{properties, uuid};
use hal_abstractions::{
    CanonicalTime, CharacteristicHandles, DiscoveryData, GattAttribute, GattClient, Timestamp,
    WallClock,
};

use crate::backup::BackupScheduler;
use crate::calendar;
use crate::config::BackupInterval;
use crate::lifecycle::{ModuleStateEvent, StatePublisher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockError;

/// Settable clock that only moves when told to
#[derive(Debug, Default)]
pub struct MockClock {
    now: Cell<Timestamp>,
    sets: Cell<usize>,
    fail_reads: Cell<bool>,
    fail_writes: Cell<bool>,
}

impl MockClock {
    pub fn at(unix_secs: i64) -> Self {
        let clock = Self::default();
        clock.now.set(Timestamp::from_secs(unix_secs));
        clock
    }

    pub fn advance_micros(&self, micros: u64) {
        let now = self.now.get();
        let total = now.micros as u64 + micros;
        self.now.set(Timestamp::new(
            now.unix_secs + (total / 1_000_000) as i64,
            (total % 1_000_000) as u32,
        ));
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.set(fail);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    /// Number of accepted `set_time` calls
    pub fn set_count(&self) -> usize {
        self.sets.get()
    }
}

impl WallClock for MockClock {
    type Error = MockError;

    fn set_time(&mut self, time: &CanonicalTime) -> Result<(), MockError> {
        if self.fail_writes.get() || !calendar::is_valid(time) {
            return Err(MockError);
        }
        self.now.set(Timestamp::from_secs(calendar::to_unix(time)));
        self.sets.set(self.sets.get() + 1);
        Ok(())
    }

    fn now(&self) -> Result<Timestamp, MockError> {
        if self.fail_reads.get() {
            Err(MockError)
        } else {
            Ok(self.now.get())
        }
    }
}

/// GATT client recording every request
#[derive(Debug, Default)]
pub struct MockGatt {
    pub init_calls: usize,
    pub discoveries: Vec<(u16, u16)>,
    pub subscriptions: Vec<(u16, CharacteristicHandles)>,
    pub releases: Vec<u16>,
    pub fail_init: bool,
    pub fail_start: bool,
    pub fail_subscribe: bool,
}

impl GattClient for MockGatt {
    type Conn = u16;
    type Error = MockError;

    fn init_client(&mut self) -> Result<(), MockError> {
        if self.fail_init {
            return Err(MockError);
        }
        self.init_calls += 1;
        Ok(())
    }

    fn start_discovery(&mut self, conn: u16, service: u16) -> Result<(), MockError> {
        if self.fail_start {
            return Err(MockError);
        }
        self.discoveries.push((conn, service));
        Ok(())
    }

    fn subscribe(&mut self, conn: u16, handles: &CharacteristicHandles) -> Result<(), MockError> {
        if self.fail_subscribe {
            return Err(MockError);
        }
        self.subscriptions.push((conn, *handles));
        Ok(())
    }

    fn release_discovery(&mut self, conn: u16) -> Result<(), MockError> {
        self.releases.push(conn);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MockScheduler {
    pub scheduled: Vec<BackupInterval>,
}

impl BackupScheduler for MockScheduler {
    fn schedule_backup(&mut self, interval: BackupInterval) {
        self.scheduled.push(interval);
    }
}

#[derive(Debug, Default)]
pub struct MockPublisher {
    pub events: Vec<ModuleStateEvent>,
}

impl StatePublisher for MockPublisher {
    fn publish(&mut self, event: ModuleStateEvent) {
        self.events.push(event);
    }
}

/// Discovery result of a phone exposing a notifiable Current Time
/// characteristic at handle 3 with its CCCD at 4
pub fn cts_discovery(conn: u16) -> DiscoveryData<u16> {
    let mut data = DiscoveryData::new(conn);
    data.attributes
        .extend_from_slice(&[
            GattAttribute::Service {
                uuid: uuid::CURRENT_TIME_SERVICE,
                start_handle: 1,
                end_handle: 4,
            },
            GattAttribute::Characteristic {
                uuid: uuid::CURRENT_TIME,
                value_handle: 3,
                properties: properties::READ | properties::NOTIFY,
            },
            GattAttribute::Descriptor {
                uuid: uuid::CLIENT_CHARACTERISTIC_CONFIGURATION,
                handle: 4,
            },
        ])
        .unwrap();
    data
}

/// Current Time value with a manual-update adjust reason
pub fn current_time_payload(
    year: u16,
    month: u8,
    day: u8,
    hours: u8,
    minutes: u8,
    seconds: u8,
) -> [u8; 10] {
    let [lo, hi] = year.to_le_bytes();
    [lo, hi, month, day, hours, minutes, seconds, 3, 0, 0x01]
}
