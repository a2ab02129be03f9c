#![deny(unsafe_code)]
#![deny(warnings)]
//! BLE link handling on the S140 SoftDevice
//!
//! The watch advertises as a connectable peripheral, asks the phone for an
//! encrypted link and then acts as GATT client towards the phone's Current
//! Time Service.
//!
//! The time service never talks to the SoftDevice directly. [`BleGatt`]
//! turns its requests into [`BleCommand`]s for the BLE task, which performs
//! them and posts the outcome back as an [`Event`]. Only one link is served
//! at a time.

use core::future::Future;
use core::pin::{pin, Pin};

use defmt::{debug, info, warn, Format};
use embassy_futures::select::{select, select4, Either, Either4};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use heapless::Vec;
use nrf_softdevice::ble::advertisement_builder::{
    Flag, LegacyAdvertisementBuilder, LegacyAdvertisementPayload,
};
use nrf_softdevice::ble::gatt_client::{self, DiscoverError};
use nrf_softdevice::ble::security::SecurityHandler;
use nrf_softdevice::ble::{peripheral, Connection, SecurityMode};
use nrf_softdevice::{raw, Softdevice};
use rtic_monotonics::nrf::rtc::prelude::*;
use rtic_sync::channel::{Receiver, Sender, TrySendError};

use hal_abstractions::ble::{properties, uuid};
use hal_abstractions::{CharacteristicHandles, DiscoveryData, GattAttribute, GattClient, PeerState};
use watch_core::event::MAX_NOTIFICATION_LEN;
use watch_core::{Event, NotificationPayload};

use crate::config::{COMMAND_QUEUE_DEPTH, DEVICE_NAME, EVENT_QUEUE_DEPTH};
use crate::Mono;

pub type EventSender = Sender<'static, Event<u16>, EVENT_QUEUE_DEPTH>;
pub type CommandSender = Sender<'static, BleCommand, COMMAND_QUEUE_DEPTH>;
pub type CommandReceiver = Receiver<'static, BleCommand, COMMAND_QUEUE_DEPTH>;

/// Errno-style codes reported with [`Event::DiscoveryFailed`]
mod code {
    pub const EIO: i32 = -5;
    pub const EINVAL: i32 = -22;
    pub const ENOTCONN: i32 = -107;
}

/// How often an idle link is checked for disconnection
const LINK_POLL_SECS: u64 = 1;

static ADV_DATA: LegacyAdvertisementPayload = LegacyAdvertisementBuilder::new()
    .flags(&[Flag::GeneralDiscovery, Flag::LE_Only])
    .full_name(DEVICE_NAME)
    .build();

static SCAN_DATA: [u8; 0] = [];

/// Handle of the most recently encrypted link
static SECURED: Signal<CriticalSectionRawMutex, u16> = Signal::new();

static SECURITY: LinkSecurity = LinkSecurity;

#[nrf_softdevice::gatt_client(uuid = "1805")]
struct CtsClient {
    #[characteristic(uuid = "2a2b", read, notify)]
    current_time: Vec<u8, MAX_NOTIFICATION_LEN>,
}

/// Request from the time service to the BLE task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum BleCommand {
    Discover { conn: u16 },
    Subscribe { conn: u16, handles: CharacteristicHandles },
    Release { conn: u16 },
}

/// BLE request errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum BleError {
    /// Command queue is full
    Busy,
    /// BLE task is gone
    Closed,
    /// Only the Current Time Service can be discovered
    UnsupportedService,
}

/// [`GattClient`] backed by the BLE task
pub struct BleGatt {
    commands: CommandSender,
}

impl BleGatt {
    pub fn new(commands: CommandSender) -> Self {
        Self { commands }
    }

    fn request(&mut self, command: BleCommand) -> Result<(), BleError> {
        self.commands.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => BleError::Busy,
            TrySendError::NoReceiver(_) => BleError::Closed,
        })
    }
}

impl GattClient for BleGatt {
    type Conn = u16;
    type Error = BleError;

    fn init_client(&mut self) -> Result<(), BleError> {
        if self.commands.is_closed() {
            Err(BleError::Closed)
        } else {
            Ok(())
        }
    }

    fn start_discovery(&mut self, conn: u16, service: u16) -> Result<(), BleError> {
        if service != uuid::CURRENT_TIME_SERVICE {
            return Err(BleError::UnsupportedService);
        }
        self.request(BleCommand::Discover { conn })
    }

    fn subscribe(&mut self, conn: u16, handles: &CharacteristicHandles) -> Result<(), BleError> {
        self.request(BleCommand::Subscribe {
            conn,
            handles: *handles,
        })
    }

    fn release_discovery(&mut self, conn: u16) -> Result<(), BleError> {
        self.request(BleCommand::Release { conn })
    }
}

/// Reports encrypted links; pairing is Just Works without bonding
struct LinkSecurity;

impl SecurityHandler for LinkSecurity {
    fn on_security_update(&self, conn: &Connection, security_mode: SecurityMode) {
        let encrypted = matches!(
            security_mode,
            SecurityMode::JustWorks | SecurityMode::Mitm | SecurityMode::LescMitm
        );
        if let (true, Some(handle)) = (encrypted, conn.handle()) {
            SECURED.signal(handle);
        }
    }
}

/// SoftDevice configuration: one peripheral link, default MTU
pub fn softdevice_config() -> nrf_softdevice::Config {
    nrf_softdevice::Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_XTAL as u8,
            rc_ctiv: 0,
            rc_temp_ctiv: 0,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_20_PPM as u8,
        }),
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: 1,
            event_length: 24,
        }),
        conn_gatt: Some(raw::ble_gatt_conn_cfg_t { att_mtu: 23 }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 1,
            periph_role_count: 1,
            central_role_count: 0,
            central_sec_count: 0,
            _bitfield_1: raw::ble_gap_cfg_role_count_t::new_bitfield_1(0),
        }),
        ..Default::default()
    }
}

/// Advertise, serve one link until it drops, repeat
pub async fn run(sd: &'static Softdevice, commands: &mut CommandReceiver, events: &mut EventSender) -> ! {
    let config = peripheral::Config::default();

    loop {
        let adv = peripheral::ConnectableAdvertisement::ScannableUndirected {
            adv_data: &ADV_DATA,
            scan_data: &SCAN_DATA,
        };
        let conn = match peripheral::advertise_pairable(sd, adv, &config, &SECURITY).await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Advertising failed: {:?}", e);
                continue;
            }
        };
        let Some(handle) = conn.handle() else {
            continue;
        };

        info!("Connected (link {})", handle);
        post(events, Event::Peer {
            conn: handle,
            state: PeerState::Connected,
        })
        .await;

        serve(&conn, handle, commands, events).await;

        info!("Disconnected (link {})", handle);
        post(events, Event::Peer {
            conn: handle,
            state: PeerState::Disconnected,
        })
        .await;
    }
}

async fn serve(conn: &Connection, handle: u16, commands: &mut CommandReceiver, events: &mut EventSender) {
    // Handles are reused across links; drop any report left by the previous one
    SECURED.reset();
    if let Err(e) = conn.request_security() {
        warn!("Security request failed: {:?}", e);
    }

    let mut notify_tx = events.clone();
    let mut cts: Option<CtsClient> = None;

    // One pass per binding: the listener lives until the link drops or a
    // new discovery replaces the client it borrows
    loop {
        let rebound = {
            let notifications = pin!(listen(conn, handle, cts.as_ref(), &mut notify_tx));
            session(conn, handle, cts.as_ref(), commands, events, notifications).await
        };
        match rebound {
            Some(client) => cts = Some(client),
            None => return,
        }
    }
}

/// Forward current time notifications until the link drops
async fn listen(conn: &Connection, handle: u16, cts: Option<&CtsClient>, events: &mut EventSender) {
    match cts {
        Some(client) => {
            let _ = gatt_client::run(conn, client, |event| match event {
                CtsClientEvent::CurrentTimeNotification(value) => forward(events, handle, &value),
            })
            .await;
        }
        None => core::future::pending::<()>().await,
    }
}

/// Serve commands against the current binding
///
/// Returns the client of a successful discovery, or `None` once the link or
/// the time service is gone.
async fn session<F: Future<Output = ()>>(
    conn: &Connection,
    handle: u16,
    cts: Option<&CtsClient>,
    commands: &mut CommandReceiver,
    events: &mut EventSender,
    mut notifications: Pin<&mut F>,
) -> Option<CtsClient> {
    loop {
        let outcome = select4(
            SECURED.wait(),
            commands.recv(),
            Mono::delay(LINK_POLL_SECS.secs()),
            notifications.as_mut(),
        )
        .await;

        match outcome {
            Either4::First(secured) if secured == handle => {
                info!("Link {} secured", handle);
                post(events, Event::Peer {
                    conn: handle,
                    state: PeerState::Secured,
                })
                .await;
            }
            Either4::First(_) => {}
            Either4::Second(Ok(command)) => {
                // Keep listening while the command is in flight
                match select(execute(conn, handle, command, cts, events), notifications.as_mut()).await {
                    Either::First(Some(client)) => return Some(client),
                    Either::First(None) => {}
                    Either::Second(()) => return None,
                }
            }
            Either4::Second(Err(_)) => {
                warn!("Time service gone, dropping link");
                return None;
            }
            Either4::Third(()) if conn.is_connected() => {}
            Either4::Third(()) | Either4::Fourth(()) => return None,
        }
    }
}

/// Perform one command; a successful discovery hands back the new client
async fn execute(
    conn: &Connection,
    handle: u16,
    command: BleCommand,
    cts: Option<&CtsClient>,
    events: &mut EventSender,
) -> Option<CtsClient> {
    match command {
        BleCommand::Discover { conn: link } if link != handle => {
            // Queued for a link that is already gone
            post(events, Event::DiscoveryFailed {
                conn: link,
                code: code::ENOTCONN,
            })
            .await;
        }
        BleCommand::Discover { .. } => {
            let event = match gatt_client::discover::<CtsClient>(conn).await {
                Ok(client) => {
                    post(events, Event::DiscoveryCompleted(discovery_data(handle, &client))).await;
                    return Some(client);
                }
                Err(DiscoverError::ServiceNotFound) => {
                    Event::DiscoveryServiceNotFound { conn: handle }
                }
                Err(e) => {
                    let code = match e {
                        DiscoverError::Disconnected => code::ENOTCONN,
                        DiscoverError::ServiceIncomplete => code::EINVAL,
                        _ => code::EIO,
                    };
                    Event::DiscoveryFailed { conn: handle, code }
                }
            };
            post(events, event).await;
        }
        BleCommand::Subscribe { conn: link, handles } => match cts {
            Some(client) if link == handle && client.current_time_value_handle == handles.value => {
                if let Err(e) = client.current_time_cccd_write(true).await {
                    warn!("Enabling current time notifications failed: {:?}", e);
                }
            }
            _ => warn!("No current time binding on link {}", link),
        },
        BleCommand::Release { conn: link } => {
            // The CtsClient binding is the only discovery state; the SoftDevice keeps no buffer to free
            debug!("Discovery data released (link {})", link);
        }
    }
    None
}

/// Describe the discovered characteristic the way the time service expects
///
/// The SoftDevice does not report the service handle range, so it is
/// reconstructed from the declaration preceding the value handle.
fn discovery_data(handle: u16, client: &CtsClient) -> DiscoveryData<u16> {
    let value = client.current_time_value_handle;
    let cccd = client.current_time_cccd_handle;

    let mut data = DiscoveryData::new(handle);
    let attributes = [
        GattAttribute::Service {
            uuid: uuid::CURRENT_TIME_SERVICE,
            start_handle: value.saturating_sub(2),
            end_handle: cccd,
        },
        GattAttribute::Characteristic {
            uuid: uuid::CURRENT_TIME,
            value_handle: value,
            properties: properties::READ | properties::NOTIFY,
        },
        GattAttribute::Descriptor {
            uuid: uuid::CLIENT_CHARACTERISTIC_CONFIGURATION,
            handle: cccd,
        },
    ];
    // Three attributes always fit
    let _ = data.attributes.extend_from_slice(&attributes);
    data
}

fn forward(events: &mut EventSender, conn: u16, value: &[u8]) {
    let Ok(payload) = NotificationPayload::from_slice(value) else {
        warn!("Oversized current time notification ({} bytes)", value.len());
        return;
    };
    if events.try_send(Event::TimeNotification { conn, payload }).is_err() {
        warn!("Event queue full, dropping current time");
    }
}

async fn post(events: &mut EventSender, event: Event<u16>) {
    if events.send(event).await.is_err() {
        warn!("Time service gone, event dropped");
    }
}
