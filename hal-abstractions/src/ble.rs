//! BLE GATT client abstraction
//!
//! Discovery and subscription are request/response: the trait methods only
//! *start* an operation and report immediate failures. Outcomes (service
//! found, not found, protocol error, notifications) are delivered back to the
//! application asynchronously by the board's BLE task.

use heapless::Vec;

/// Maximum number of attributes carried by one discovery result
pub const MAX_DISCOVERED_ATTRIBUTES: usize = 8;

/// 16-bit SIG-assigned UUIDs used by the time service
pub mod uuid {
    /// Current Time Service
    pub const CURRENT_TIME_SERVICE: u16 = 0x1805;
    /// Current Time characteristic
    pub const CURRENT_TIME: u16 = 0x2A2B;
    /// Client Characteristic Configuration descriptor
    pub const CLIENT_CHARACTERISTIC_CONFIGURATION: u16 = 0x2902;
}

/// GATT characteristic property bits (Bluetooth Core Vol 3, Part G, 3.3.1.1)
pub mod properties {
    pub const READ: u8 = 0x02;
    pub const WRITE: u8 = 0x08;
    pub const NOTIFY: u8 = 0x10;
    pub const INDICATE: u8 = 0x20;
}

/// Connection state reported by the connection manager
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Link layer connection established
    Connected,
    /// Pairing/encryption completed on the link
    Secured,
    /// Link dropped
    Disconnected,
}

/// One attribute found during service discovery
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GattAttribute {
    /// Primary service declaration
    Service {
        uuid: u16,
        start_handle: u16,
        end_handle: u16,
    },
    /// Characteristic declaration with its value handle
    Characteristic {
        uuid: u16,
        value_handle: u16,
        properties: u8,
    },
    /// Characteristic descriptor
    Descriptor { uuid: u16, handle: u16 },
}

/// Result of a successful discovery on one link
///
/// Attributes are listed in handle order, as the peer's attribute table
/// presents them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryData<C> {
    /// Link the discovery ran on
    pub conn: C,
    /// Discovered attributes of the requested service
    pub attributes: Vec<GattAttribute, MAX_DISCOVERED_ATTRIBUTES>,
}

impl<C> DiscoveryData<C> {
    /// Create an empty discovery result for `conn`
    pub const fn new(conn: C) -> Self {
        Self {
            conn,
            attributes: Vec::new(),
        }
    }
}

/// Attribute handles needed to receive notifications from a characteristic
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacteristicHandles {
    /// Characteristic value handle
    pub value: u16,
    /// Client Characteristic Configuration descriptor handle
    pub cccd: u16,
}

/// GATT client operations consumed by the time service
pub trait GattClient {
    /// Connection identifier
    type Conn: Copy + PartialEq + core::fmt::Debug;
    /// Transport-specific error
    type Error: core::fmt::Debug;

    /// Allocate the client context used for subsequent operations
    fn init_client(&mut self) -> Result<(), Self::Error>;

    /// Start discovery of `service` on `conn`
    fn start_discovery(&mut self, conn: Self::Conn, service: u16) -> Result<(), Self::Error>;

    /// Enable notifications for the characteristic described by `handles`
    fn subscribe(
        &mut self,
        conn: Self::Conn,
        handles: &CharacteristicHandles,
    ) -> Result<(), Self::Error>;

    /// Free the resources held by the discovery session on `conn`
    fn release_discovery(&mut self, conn: Self::Conn) -> Result<(), Self::Error>;
}
