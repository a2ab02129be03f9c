//! Typed messages delivered to the time service worker
//!
//! Every input of the service arrives as one [`Event`] through a single
//! consumer channel, so the four components never run concurrently and are
//! processed strictly in queue order.

use heapless::Vec;

use hal_abstractions::{DiscoveryData, PeerState};

use crate::lifecycle::ModuleStateEvent;

/// Largest notification value carried in an event (default ATT MTU - 3)
pub const MAX_NOTIFICATION_LEN: usize = 20;

/// Raw notification value
pub type NotificationPayload = Vec<u8, MAX_NOTIFICATION_LEN>;

/// Input to [`TimeService::handle`](crate::service::TimeService::handle)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event<C> {
    /// A module announced a lifecycle transition
    ModuleState(ModuleStateEvent),
    /// The connection manager reported a link state change
    Peer { conn: C, state: PeerState },
    /// Discovery found the Current Time Service
    DiscoveryCompleted(DiscoveryData<C>),
    /// Discovery finished without finding the service
    DiscoveryServiceNotFound { conn: C },
    /// Discovery failed with a stack error code
    DiscoveryFailed { conn: C, code: i32 },
    /// Current Time notification received
    TimeNotification {
        conn: C,
        payload: NotificationPayload,
    },
    /// Backup snapshot period elapsed
    BackupDue,
}
