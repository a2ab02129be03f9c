//! Time service worker
//!
//! [`TimeService`] owns the four components and the platform handles they
//! share. The board runs it in a single worker context and feeds it
//! [`Event`]s one at a time; nothing in here blocks or locks.

use hal_abstractions::{GattClient, PeerState, WallClock};

use crate::backup::{BackupScheduler, BackupStore, RetainedSlot};
use crate::config::TimeConfig;
use crate::cts::TimeSourceClient;
use crate::discovery::DiscoveryController;
use crate::event::Event;
use crate::lifecycle::{Lifecycle, ModuleState, StatePublisher};

/// Reset-resilient wall-clock time service
pub struct TimeService<G: GattClient, K, R, S, P> {
    pub(crate) config: TimeConfig,
    pub(crate) gatt: G,
    pub(crate) clock: K,
    pub(crate) backup: Option<BackupStore<R>>,
    pub(crate) scheduler: S,
    pub(crate) publisher: P,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) client: TimeSourceClient<G::Conn>,
    pub(crate) discovery: DiscoveryController<G::Conn>,
}

impl<G, K, R, S, P> TimeService<G, K, R, S, P>
where
    G: GattClient,
    K: WallClock,
    R: RetainedSlot,
    S: BackupScheduler,
    P: StatePublisher,
{
    /// Create the service; nothing touches the clock or the retained slot
    /// until the upstream module reports ready
    pub fn new(config: TimeConfig, gatt: G, clock: K, slot: R, scheduler: S, publisher: P) -> Self {
        let backup = config
            .backup_enabled
            .then(|| BackupStore::new(slot, config.fallback_timestamp));

        Self {
            config,
            gatt,
            clock,
            backup,
            scheduler,
            publisher,
            lifecycle: Lifecycle::new(),
            client: TimeSourceClient::new(),
            discovery: DiscoveryController::new(),
        }
    }

    /// Process one event
    pub fn handle(&mut self, event: Event<G::Conn>) {
        match event {
            Event::ModuleState(ev) => {
                if ev.module == self.config.upstream && ev.state == ModuleState::Ready {
                    let _ = self.initialize();
                }
            }
            Event::BackupDue => self.on_backup_due(),
            event if self.accepts_link_events() => self.on_link_event(event),
            _ => debug!("Time service not ready, dropping link event"),
        }
    }

    /// Lifecycle state of this module
    pub fn state(&self) -> ModuleState {
        self.lifecycle.state()
    }

    pub fn clock(&self) -> &K {
        &self.clock
    }

    pub fn gatt(&self) -> &G {
        &self.gatt
    }

    pub fn backup(&self) -> Option<&BackupStore<R>> {
        self.backup.as_ref()
    }

    fn accepts_link_events(&self) -> bool {
        self.config.cts_client_enabled && self.lifecycle.state() == ModuleState::Ready
    }

    fn on_backup_due(&mut self) {
        if let Some(store) = self.backup.as_mut() {
            store.snapshot(&self.clock);
            self.scheduler.schedule_backup(self.config.backup_interval);
        }
    }

    fn on_link_event(&mut self, event: Event<G::Conn>) {
        match event {
            Event::Peer {
                conn,
                state: PeerState::Secured,
            } => {
                let _ = self.discovery.on_link_secured(&mut self.gatt, conn);
            }
            Event::Peer {
                conn,
                state: PeerState::Disconnected,
            } => self.client.on_disconnected(conn),
            Event::Peer { .. } => {}
            Event::DiscoveryCompleted(data) => {
                let client = &mut self.client;
                self.discovery
                    .on_completed(&mut self.gatt, &data, |gatt, data| {
                        client.on_discovery_succeeded(gatt, data)
                    });
            }
            Event::DiscoveryServiceNotFound { conn } => {
                self.discovery.on_service_not_found(&mut self.gatt, conn);
            }
            Event::DiscoveryFailed { conn, code } => {
                self.discovery.on_error(&mut self.gatt, conn, code);
            }
            Event::TimeNotification { conn, payload } => {
                let _ = self
                    .client
                    .on_time_notification(&mut self.clock, conn, &payload);
            }
            Event::ModuleState(_) | Event::BackupDue => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::{BackupRecord, VALID_MARKER};
    use crate::config::BackupInterval;
    use crate::discovery::DiscoveryState;
    use crate::lifecycle::{ModuleId, ModuleStateEvent};
    use crate::testing::{
        cts_discovery, current_time_payload, MockClock, MockGatt, MockPublisher, MockScheduler,
    };
    use hal_abstractions::ble::uuid;

    type Service<'r> = TimeService<MockGatt, MockClock, &'r mut BackupRecord, MockScheduler, MockPublisher>;

    const GARBAGE: BackupRecord = BackupRecord {
        marker: 0x5A5A_5A5A,
        timestamp: -77,
    };

    fn service(record: &mut BackupRecord, config: TimeConfig) -> Service<'_> {
        TimeService::new(
            config,
            MockGatt::default(),
            MockClock::at(0),
            record,
            MockScheduler::default(),
            MockPublisher::default(),
        )
    }

    fn upstream_ready() -> Event<u16> {
        Event::ModuleState(ModuleStateEvent::new(ModuleId::MAIN, ModuleState::Ready))
    }

    fn secured(conn: u16) -> Event<u16> {
        Event::Peer {
            conn,
            state: PeerState::Secured,
        }
    }

    fn notification(conn: u16, payload: [u8; 10]) -> Event<u16> {
        Event::TimeNotification {
            conn,
            payload: heapless::Vec::from_slice(&payload).unwrap(),
        }
    }

    #[test]
    fn test_nothing_happens_before_upstream_ready() {
        let mut record = GARBAGE;
        let mut svc = service(&mut record, TimeConfig::default());

        svc.handle(Event::ModuleState(ModuleStateEvent::new(
            ModuleId("ble_state"),
            ModuleState::Ready,
        )));
        svc.handle(Event::ModuleState(ModuleStateEvent::new(
            ModuleId::MAIN,
            ModuleState::Error,
        )));
        svc.handle(secured(1));

        assert_eq!(svc.state(), ModuleState::Uninitialized);
        assert_eq!(svc.clock().set_count(), 0);
        assert!(svc.gatt().discoveries.is_empty());
        assert!(svc.publisher.events.is_empty());
        assert!(svc.scheduler.scheduled.is_empty());
        drop(svc);
        assert_eq!(record, GARBAGE);
    }

    #[test]
    fn test_garbage_boot_seeds_fallback() {
        let mut record = GARBAGE;
        let mut svc = service(&mut record, TimeConfig::default());

        svc.handle(upstream_ready());

        assert_eq!(svc.state(), ModuleState::Ready);
        assert_eq!(svc.clock().now().unwrap().unix_secs, 1_640_995_200);
        assert_eq!(svc.scheduler.scheduled, [BackupInterval::DEFAULT]);
        assert_eq!(svc.gatt().init_calls, 1);
        assert_eq!(
            svc.publisher.events,
            [ModuleStateEvent::new(ModuleId::CTS, ModuleState::Ready)]
        );
        drop(svc);
        assert_eq!(
            record,
            BackupRecord {
                marker: VALID_MARKER,
                timestamp: 1_640_995_200
            }
        );
    }

    #[test]
    fn test_warm_reset_restores_backup() {
        let mut record = BackupRecord {
            marker: VALID_MARKER,
            timestamp: 1_717_000_000,
        };
        let mut svc = service(&mut record, TimeConfig::default());

        svc.handle(upstream_ready());
        assert_eq!(svc.clock().now().unwrap().unix_secs, 1_717_000_000);
    }

    #[test]
    fn test_backup_disabled_uses_fallback() {
        let mut record = BackupRecord {
            marker: VALID_MARKER,
            timestamp: 1_717_000_000,
        };
        let config = TimeConfig {
            backup_enabled: false,
            fallback_timestamp: 1_000_000_000,
            ..TimeConfig::default()
        };
        let mut svc = service(&mut record, config);

        svc.handle(upstream_ready());
        svc.handle(Event::BackupDue);

        assert_eq!(svc.state(), ModuleState::Ready);
        assert_eq!(svc.clock().now().unwrap().unix_secs, 1_000_000_000);
        assert!(svc.scheduler.scheduled.is_empty());
        assert!(svc.backup().is_none());
    }

    #[test]
    fn test_seed_failure_enters_error() {
        let mut record = GARBAGE;
        let mut svc = service(&mut record, TimeConfig::default());
        svc.clock.fail_writes(true);

        svc.handle(upstream_ready());

        assert_eq!(svc.state(), ModuleState::Error);
        assert_eq!(
            svc.publisher.events,
            [ModuleStateEvent::new(ModuleId::CTS, ModuleState::Error)]
        );
        // Nothing after step 2 ran
        assert!(svc.scheduler.scheduled.is_empty());
        assert_eq!(svc.gatt().init_calls, 0);
    }

    #[test]
    fn test_out_of_range_backup_enters_error() {
        // Valid marker over a timestamp whose year overflows the clock's year field
        let mut record = BackupRecord {
            marker: VALID_MARKER,
            timestamp: ((i32::MAX as i64) - 100) * 31_556_952,
        };
        let mut svc = service(&mut record, TimeConfig::default());

        svc.handle(upstream_ready());

        assert_eq!(svc.state(), ModuleState::Error);
        assert_eq!(
            svc.publisher.events,
            [ModuleStateEvent::new(ModuleId::CTS, ModuleState::Error)]
        );
        assert!(svc.scheduler.scheduled.is_empty());
        assert_eq!(svc.clock().set_count(), 0);
    }

    #[test]
    fn test_client_init_failure_enters_error() {
        let mut record = GARBAGE;
        let mut svc = service(&mut record, TimeConfig::default());
        svc.gatt.fail_init = true;

        svc.handle(upstream_ready());

        assert_eq!(svc.state(), ModuleState::Error);
        assert_eq!(
            svc.publisher.events,
            [ModuleStateEvent::new(ModuleId::CTS, ModuleState::Error)]
        );

        // Terminal: link events are not processed
        svc.handle(secured(1));
        assert!(svc.gatt().discoveries.is_empty());
    }

    #[test]
    fn test_cts_client_disabled() {
        let mut record = GARBAGE;
        let config = TimeConfig {
            cts_client_enabled: false,
            ..TimeConfig::default()
        };
        let mut svc = service(&mut record, config);

        svc.handle(upstream_ready());
        svc.handle(secured(1));

        assert_eq!(svc.state(), ModuleState::Ready);
        assert_eq!(svc.gatt().init_calls, 0);
        assert!(svc.gatt().discoveries.is_empty());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "initialized twice")]
    fn test_second_upstream_ready_is_a_bug() {
        let mut record = GARBAGE;
        let mut svc = service(&mut record, TimeConfig::default());
        svc.handle(upstream_ready());
        svc.handle(upstream_ready());
    }

    #[test]
    fn test_backup_snapshot_rearms() {
        let mut record = GARBAGE;
        let mut svc = service(&mut record, TimeConfig::default());
        svc.handle(upstream_ready());

        svc.clock.advance_micros(90_500_000);
        svc.handle(Event::BackupDue);
        svc.clock.fail_reads(true);
        svc.handle(Event::BackupDue);

        assert_eq!(svc.scheduler.scheduled.len(), 3);
        drop(svc);
        // The failed read kept the earlier snapshot
        assert_eq!(record.timestamp, 1_640_995_290);
    }

    #[test]
    fn test_link_to_clock_scenario() {
        let mut record = GARBAGE;
        let mut svc = service(&mut record, TimeConfig::default());
        svc.handle(upstream_ready());

        svc.handle(Event::Peer {
            conn: 4,
            state: PeerState::Connected,
        });
        assert!(svc.gatt().discoveries.is_empty());

        svc.handle(secured(4));
        assert_eq!(svc.gatt().discoveries, [(4, uuid::CURRENT_TIME_SERVICE)]);
        assert_eq!(svc.discovery.state(4), DiscoveryState::Discovering);

        svc.handle(Event::DiscoveryCompleted(cts_discovery(4)));
        assert_eq!(svc.gatt().subscriptions.len(), 1);
        assert_eq!(svc.gatt().releases, [4]);
        assert_eq!(svc.discovery.state(4), DiscoveryState::Idle);

        svc.handle(notification(4, current_time_payload(2024, 6, 5, 10, 15, 30)));
        let now = svc.clock().now().unwrap();
        assert_eq!(now.unix_secs, 1_717_582_530);

        // Snapshot carries the synchronized time into the retained record
        svc.handle(Event::BackupDue);
        drop(svc);
        let mut store = BackupStore::new(&mut record, 0);
        assert_eq!(store.validate_or_reset(), 1_717_582_530);
    }

    #[test]
    fn test_binding_failure_keeps_module_ready() {
        let mut record = GARBAGE;
        let mut svc = service(&mut record, TimeConfig::default());
        svc.handle(upstream_ready());
        svc.gatt.fail_subscribe = true;

        svc.handle(secured(2));
        svc.handle(Event::DiscoveryCompleted(cts_discovery(2)));
        svc.handle(notification(2, current_time_payload(2030, 1, 1, 0, 0, 0)));

        assert_eq!(svc.state(), ModuleState::Ready);
        assert_eq!(svc.gatt().releases, [2]);
        assert_eq!(svc.clock().now().unwrap().unix_secs, 1_640_995_200);
    }

    #[test]
    fn test_not_found_and_error_are_not_retried() {
        let mut record = GARBAGE;
        let mut svc = service(&mut record, TimeConfig::default());
        svc.handle(upstream_ready());

        svc.handle(secured(1));
        svc.handle(secured(2));
        svc.handle(Event::DiscoveryServiceNotFound { conn: 1 });
        svc.handle(Event::DiscoveryFailed { conn: 2, code: -128 });

        assert_eq!(svc.gatt().discoveries.len(), 2);
        assert_eq!(svc.gatt().releases, [1, 2]);
        assert_eq!(svc.state(), ModuleState::Ready);
        assert_eq!(svc.publisher.events.len(), 1);
    }

    #[test]
    fn test_rejected_notification_is_dropped() {
        let mut record = GARBAGE;
        let mut svc = service(&mut record, TimeConfig::default());
        svc.handle(upstream_ready());
        svc.handle(secured(1));
        svc.handle(Event::DiscoveryCompleted(cts_discovery(1)));

        svc.clock.fail_writes(true);
        svc.handle(notification(1, current_time_payload(2024, 6, 5, 10, 15, 30)));
        assert_eq!(svc.state(), ModuleState::Ready);

        svc.clock.fail_writes(false);
        svc.handle(notification(1, current_time_payload(2024, 6, 5, 10, 16, 30)));
        assert_eq!(svc.clock().now().unwrap().unix_secs, 1_717_582_590);
    }

    #[test]
    fn test_resecured_link_rebinds() {
        let mut record = GARBAGE;
        let mut svc = service(&mut record, TimeConfig::default());
        svc.handle(upstream_ready());

        svc.handle(secured(1));
        svc.handle(Event::DiscoveryCompleted(cts_discovery(1)));
        svc.handle(Event::Peer {
            conn: 1,
            state: PeerState::Disconnected,
        });
        svc.handle(secured(5));
        svc.handle(Event::DiscoveryCompleted(cts_discovery(5)));

        assert_eq!(svc.client.handle().map(|h| h.conn), Some(5));
        svc.handle(notification(1, current_time_payload(2024, 6, 5, 10, 15, 30)));
        assert_eq!(svc.clock().now().unwrap().unix_secs, 1_640_995_200);
    }
}
