//! Time service error types

/// Errors raised by the time synchronization and backup components
///
/// Only [`ClockApplyFailed`](Self::ClockApplyFailed) during boot and
/// [`ProtocolInitFailed`](Self::ProtocolInitFailed) are fatal to the module;
/// every other kind is logged and recovered from locally.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeError {
    /// Retained backup record does not carry the validity marker
    RetainedStateInvalid,
    /// Device clock rejected a new time
    ClockApplyFailed,
    /// BLE stack could not allocate the CTS client context
    ProtocolInitFailed,
    /// Discovery could not be started on a link
    DiscoveryStartFailed,
    /// Discovery data does not describe a usable Current Time characteristic
    DiscoveryBindingFailed,
    /// Peer rejected the notification subscription
    SubscriptionFailed,
    /// Peer does not expose the Current Time Service
    ServiceNotFound,
    /// Discovery failed at the protocol level (stack error code)
    DiscoveryProtocolError(i32),
    /// Notification payload too short for an exact time structure
    MalformedNotification,
}

impl core::fmt::Display for TimeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::RetainedStateInvalid => write!(f, "Retained time state invalid"),
            Self::ClockApplyFailed => write!(f, "Failed to apply time to clock"),
            Self::ProtocolInitFailed => write!(f, "CTS client initialization failed"),
            Self::DiscoveryStartFailed => write!(f, "Failed to start CTS discovery"),
            Self::DiscoveryBindingFailed => write!(f, "Could not assign CTS client handles"),
            Self::SubscriptionFailed => write!(f, "Failed subscribing to CTS service"),
            Self::ServiceNotFound => write!(f, "CTS service not found"),
            Self::DiscoveryProtocolError(code) => write!(f, "Discovery error ({})", code),
            Self::MalformedNotification => write!(f, "Malformed current time notification"),
        }
    }
}

// Implement core::error::Error for no_std compatibility
impl core::error::Error for TimeError {}
