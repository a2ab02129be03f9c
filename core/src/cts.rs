//! Current Time Service client
//!
//! Binds the peer's Current Time characteristic after discovery, subscribes
//! to its notifications and applies every received time to the device clock.
//!
//! ## Wire format
//!
//! The Current Time characteristic (`0x2A2B`) carries 10 bytes:
//!
//! ```text
//! 0..2  year (u16, little endian)
//! 2     month (1-12, 0 = unknown)
//! 3     day (1-31)
//! 4     hours
//! 5     minutes
//! 6     seconds
//! 7     day of week (1 = Monday)
//! 8     fractions of a second (1/256)
//! 9     adjust reason flags
//! ```
//!
//! Bytes 0..9 form the Exact Time 256 structure. Field ranges are the peer's
//! responsibility; only the structural remap to [`CanonicalTime`] happens
//! here.

use hal_abstractions::ble::{properties, uuid};
use hal_abstractions::{CanonicalTime, CharacteristicHandles, DiscoveryData, GattAttribute};
use hal_abstractions::{GattClient, WallClock};

use crate::error::TimeError;

/// Length of the Exact Time 256 structure
pub const EXACT_TIME_256_LEN: usize = 9;

/// Length of the Current Time characteristic value
pub const CURRENT_TIME_LEN: usize = 10;

/// Exact Time 256 as sent by the peer
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExactTime256 {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    pub day_of_week: u8,
    pub fractions256: u8,
}

/// Current Time characteristic value
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentTime {
    pub exact_time_256: ExactTime256,
    pub adjust_reason: u8,
}

impl CurrentTime {
    /// Parse a Current Time notification payload
    ///
    /// The adjust-reason byte is optional; a payload carrying only the exact
    /// time is accepted with no adjust reason.
    pub fn decode(payload: &[u8]) -> Result<Self, TimeError> {
        if payload.len() < EXACT_TIME_256_LEN {
            return Err(TimeError::MalformedNotification);
        }

        Ok(Self {
            exact_time_256: ExactTime256 {
                year: u16::from_le_bytes([payload[0], payload[1]]),
                month: payload[2],
                day: payload[3],
                hours: payload[4],
                minutes: payload[5],
                seconds: payload[6],
                day_of_week: payload[7],
                fractions256: payload[8],
            },
            adjust_reason: payload.get(EXACT_TIME_256_LEN).copied().unwrap_or(0),
        })
    }
}

impl From<&ExactTime256> for CanonicalTime {
    fn from(time: &ExactTime256) -> Self {
        Self {
            seconds: time.seconds,
            minutes: time.minutes,
            hours: time.hours,
            day: time.day,
            month: time.month.saturating_sub(1),
            year: i32::from(time.year) - CanonicalTime::YEAR_BASE,
        }
    }
}

/// Current Time characteristic bound to one link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeClientHandle<C> {
    pub conn: C,
    pub handles: CharacteristicHandles,
}

/// Locate the Current Time value and CCCD handles in discovery data
pub fn assign_handles<C>(data: &DiscoveryData<C>) -> Result<CharacteristicHandles, TimeError> {
    let mut attributes = data.attributes.iter();

    match attributes.next() {
        Some(GattAttribute::Service { uuid: id, .. }) if *id == uuid::CURRENT_TIME_SERVICE => {}
        _ => return Err(TimeError::DiscoveryBindingFailed),
    }

    let (value, props) = attributes
        .by_ref()
        .find_map(|attr| match attr {
            GattAttribute::Characteristic {
                uuid: id,
                value_handle,
                properties: props,
            } if *id == uuid::CURRENT_TIME => Some((*value_handle, *props)),
            _ => None,
        })
        .ok_or(TimeError::DiscoveryBindingFailed)?;

    if props & properties::NOTIFY == 0 {
        return Err(TimeError::DiscoveryBindingFailed);
    }

    // The CCCD must belong to this characteristic: stop at the next one
    let cccd = attributes
        .take_while(|attr| !matches!(attr, GattAttribute::Characteristic { .. }))
        .find_map(|attr| match attr {
            GattAttribute::Descriptor { uuid: id, handle }
                if *id == uuid::CLIENT_CHARACTERISTIC_CONFIGURATION =>
            {
                Some(*handle)
            }
            _ => None,
        })
        .ok_or(TimeError::DiscoveryBindingFailed)?;

    Ok(CharacteristicHandles { value, cccd })
}

/// Current Time Service client state
pub struct TimeSourceClient<C> {
    handle: Option<TimeClientHandle<C>>,
}

impl<C: Copy + PartialEq> TimeSourceClient<C> {
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Prepare the client for a fresh link
    pub fn initialize<G>(&mut self, gatt: &mut G) -> Result<(), TimeError>
    where
        G: GattClient<Conn = C>,
    {
        self.handle = None;
        gatt.init_client().map_err(|_| {
            error!("Failed initializing CTS client");
            TimeError::ProtocolInitFailed
        })
    }

    /// Bind the discovered characteristic and subscribe to notifications
    ///
    /// Failures abandon time sync on this link only.
    pub fn on_discovery_succeeded<G>(
        &mut self,
        gatt: &mut G,
        data: &DiscoveryData<C>,
    ) -> Result<(), TimeError>
    where
        G: GattClient<Conn = C>,
    {
        info!("CTS service found");

        let handles = assign_handles(data).inspect_err(|_| {
            error!("Could not assign CTS client handles");
        })?;
        self.handle = Some(TimeClientHandle {
            conn: data.conn,
            handles,
        });

        if gatt.subscribe(data.conn, &handles).is_err() {
            error!("Failed subscribing to CTS service");
            self.handle = None;
            return Err(TimeError::SubscriptionFailed);
        }

        debug!(
            "Subscribed to current time (value {}, cccd {})",
            handles.value, handles.cccd
        );
        Ok(())
    }

    /// Decode a notification and apply it to the clock
    ///
    /// Notifications from a link other than the bound one are ignored. A
    /// rejected time is dropped; the next notification is the retry.
    pub fn on_time_notification<K: WallClock>(
        &self,
        clock: &mut K,
        conn: C,
        payload: &[u8],
    ) -> Result<(), TimeError> {
        if !self.is_bound_to(conn) {
            debug!("Ignoring current time from unbound link");
            return Ok(());
        }

        let current = CurrentTime::decode(payload).inspect_err(|_| {
            warn!("Malformed current time notification ({} bytes)", payload.len());
        })?;
        let time = CanonicalTime::from(&current.exact_time_256);

        clock.set_time(&time).map_err(|_| {
            error!("Failed setting datetime");
            TimeError::ClockApplyFailed
        })?;

        info!(
            "Time updated: {}-{}-{} {}:{}:{}",
            time.full_year(),
            time.month_number(),
            time.day,
            time.hours,
            time.minutes,
            time.seconds
        );
        Ok(())
    }

    /// Forget the binding when its link goes away
    pub fn on_disconnected(&mut self, conn: C) {
        if self.is_bound_to(conn) {
            debug!("CTS link disconnected, dropping handles");
            self.handle = None;
        }
    }

    /// Current binding, if any
    pub fn handle(&self) -> Option<&TimeClientHandle<C>> {
        self.handle.as_ref()
    }

    fn is_bound_to(&self, conn: C) -> bool {
        self.handle.as_ref().is_some_and(|h| h.conn == conn)
    }
}

impl<C: Copy + PartialEq> Default for TimeSourceClient<C> {
    fn default() -> Self {
        Self::new()
    }
}
