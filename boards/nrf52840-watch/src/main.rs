#![deny(unsafe_code)]
#![deny(warnings)]
#![no_main]
#![no_std]

use defmt_rtt as _; // global logger
use nrf_softdevice_s140 as _; // SoftDevice firmware blob
use panic_probe as _;
use rtic::app;
use rtic_monotonics::nrf::rtc::prelude::*;

mod ble;
mod clock;
mod config;
mod retained;

// RTC0 belongs to the SoftDevice
nrf_rtc1_monotonic!(Mono);

defmt::timestamp!("{=u64:us}", Mono::now().duration_since_epoch().to_micros());

#[app(device = nrf52840_pac, peripherals = true, dispatchers = [SWI0_EGU0, SWI1_EGU1])]
mod app {
    use super::*;
    use defmt::{info, warn};
    use embassy_futures::join::join;
    use nrf_softdevice::Softdevice;
    use rtic_sync::channel::{Receiver, Sender};
    use rtic_sync::make_channel;

    use watch_core::{
        BackupInterval, BackupScheduler, Event, ModuleId, ModuleState, ModuleStateEvent,
        StatePublisher, TimeService,
    };

    use crate::ble::{BleCommand, BleGatt, CommandReceiver, EventSender};
    use crate::clock::DeviceClock;
    use crate::config::{COMMAND_QUEUE_DEPTH, EVENT_QUEUE_DEPTH};
    use crate::retained::RetainedBackup;

    type Service = TimeService<BleGatt, DeviceClock, RetainedBackup, BackupTimer, StateLog>;

    /// Arms the backup timer task; capacity one so a pending snapshot is
    /// never scheduled twice
    pub struct BackupTimer(Sender<'static, BackupInterval, 1>);

    impl BackupScheduler for BackupTimer {
        fn schedule_backup(&mut self, interval: BackupInterval) {
            if self.0.try_send(interval).is_err() {
                warn!("Backup timer already armed");
            }
        }
    }

    /// Module lifecycle announcements go to the log
    pub struct StateLog;

    impl StatePublisher for StateLog {
        fn publish(&mut self, event: ModuleStateEvent) {
            info!("Module {} is now {}", event.module.0, event.state);
        }
    }

    #[shared]
    struct Shared {}

    #[local]
    struct Local {
        service: Service,
        events: Receiver<'static, Event<u16>, EVENT_QUEUE_DEPTH>,
        backup_requests: Receiver<'static, BackupInterval, 1>,
        backup_events: EventSender,
        ble_commands: CommandReceiver,
        ble_events: EventSender,
    }

    #[init]
    fn init(cx: init::Context) -> (Shared, Local) {
        info!("Watch starting...");

        Mono::start(cx.device.RTC1);
        info!("RTC1 monotonic timer initialized at 32.768 kHz");

        let (mut event_tx, event_rx) = make_channel!(Event<u16>, EVENT_QUEUE_DEPTH);
        let (arm_tx, arm_rx) = make_channel!(BackupInterval, 1);
        let (command_tx, command_rx) = make_channel!(BleCommand, COMMAND_QUEUE_DEPTH);

        let Some(slot) = RetainedBackup::take() else {
            defmt::panic!("Retained backup record already claimed");
        };

        let service = TimeService::new(
            config::TIME,
            BleGatt::new(command_tx),
            DeviceClock::new(),
            slot,
            BackupTimer(arm_tx),
            StateLog,
        );

        // Platform facilities are up: let the time service initialize
        if event_tx
            .try_send(Event::ModuleState(ModuleStateEvent::new(
                ModuleId::MAIN,
                ModuleState::Ready,
            )))
            .is_err()
        {
            warn!("Event queue full at boot");
        }

        worker::spawn().ok();
        backup_timer::spawn().ok();
        ble_task::spawn().ok();

        (
            Shared {},
            Local {
                service,
                events: event_rx,
                backup_requests: arm_rx,
                backup_events: event_tx.clone(),
                ble_commands: command_rx,
                ble_events: event_tx,
            },
        )
    }

    /// Time service worker: the only context touching the clock, the
    /// retained record and the CTS state
    #[task(priority = 1, local = [service, events])]
    async fn worker(cx: worker::Context) {
        info!("Time service worker started");
        while let Ok(event) = cx.local.events.recv().await {
            cx.local.service.handle(event);
        }
        warn!("All event senders dropped, time service stopped");
    }

    /// One-shot backup timer, re-armed by the worker after every snapshot
    #[task(priority = 1, local = [backup_requests, backup_events])]
    async fn backup_timer(cx: backup_timer::Context) {
        while let Ok(interval) = cx.local.backup_requests.recv().await {
            Mono::delay(u64::from(interval.as_secs()).secs()).await;
            if cx.local.backup_events.send(Event::BackupDue).await.is_err() {
                break;
            }
        }
    }

    /// BLE task: runs the SoftDevice and the link state machine
    ///
    /// The SoftDevice must be enabled with interrupts on, so this cannot
    /// happen in `init`.
    #[task(priority = 1, local = [ble_commands, ble_events])]
    async fn ble_task(cx: ble_task::Context) {
        let sd: &'static Softdevice = Softdevice::enable(&ble::softdevice_config());
        info!("SoftDevice enabled");

        join(
            sd.run(),
            ble::run(sd, cx.local.ble_commands, cx.local.ble_events),
        )
        .await;
    }

    /// RTIC idle task - WFI sleep mode when no tasks active
    #[idle]
    fn idle(_cx: idle::Context) -> ! {
        info!("Idle task started - entering WFI loop");
        loop {
            cortex_m::asm::wfi();
        }
    }
}
