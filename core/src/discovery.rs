//! Per-link Current Time Service discovery
//!
//! ```text
//! Idle --link secured--> Discovering --+--> Completed
//!                                      +--> NotFound
//!                                      +--> Errored
//! ```
//!
//! A session exists only while discovering. Every terminal transition
//! removes it and releases the discovery resources exactly once; there is no
//! retry, a reconnect produces a new secured event and a new session.

use heapless::Vec;

use hal_abstractions::ble::uuid;
use hal_abstractions::{DiscoveryData, GattClient};

use crate::error::TimeError;

/// Maximum number of links discovering at the same time
pub const MAX_LINKS: usize = 2;

/// Discovery progress of one link
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    Idle,
    Discovering,
    Completed,
    NotFound,
    Errored,
}

/// In-progress discovery on one link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoverySession<C> {
    pub conn: C,
    pub state: DiscoveryState,
}

/// Discovery state machines for all active links
pub struct DiscoveryController<C> {
    sessions: Vec<DiscoverySession<C>, MAX_LINKS>,
}

impl<C: Copy + PartialEq> DiscoveryController<C> {
    pub const fn new() -> Self {
        Self {
            sessions: Vec::new(),
        }
    }

    /// Current state of `conn`
    pub fn state(&self, conn: C) -> DiscoveryState {
        self.sessions
            .iter()
            .find(|s| s.conn == conn)
            .map_or(DiscoveryState::Idle, |s| s.state)
    }

    /// Start discovery on a newly secured link
    pub fn on_link_secured<G>(&mut self, gatt: &mut G, conn: C) -> Result<(), TimeError>
    where
        G: GattClient<Conn = C>,
    {
        if self.state(conn) == DiscoveryState::Discovering {
            debug!("CTS discovery already running on this link");
            return Ok(());
        }

        if self.sessions.is_full() {
            warn!("Too many links discovering (max {})", MAX_LINKS);
            return Err(TimeError::DiscoveryStartFailed);
        }

        gatt.start_discovery(conn, uuid::CURRENT_TIME_SERVICE)
            .map_err(|_| {
                error!("Failed to start CTS discovery");
                TimeError::DiscoveryStartFailed
            })?;

        // Capacity checked above
        let _ = self.sessions.push(DiscoverySession {
            conn,
            state: DiscoveryState::Discovering,
        });
        Ok(())
    }

    /// Service found: hand the data to `bind`, then release
    ///
    /// Release happens whatever `bind` returns.
    pub fn on_completed<G, F>(
        &mut self,
        gatt: &mut G,
        data: &DiscoveryData<C>,
        bind: F,
    ) -> Option<DiscoveryState>
    where
        G: GattClient<Conn = C>,
        F: FnOnce(&mut G, &DiscoveryData<C>) -> Result<(), TimeError>,
    {
        let mut session = self.take(data.conn)?;
        let _ = bind(gatt, data);
        session.state = DiscoveryState::Completed;
        Some(Self::release(gatt, session))
    }

    /// Peer does not expose the service
    pub fn on_service_not_found<G>(&mut self, gatt: &mut G, conn: C) -> Option<DiscoveryState>
    where
        G: GattClient<Conn = C>,
    {
        let mut session = self.take(conn)?;
        warn!("{}", TimeError::ServiceNotFound);
        session.state = DiscoveryState::NotFound;
        Some(Self::release(gatt, session))
    }

    /// Discovery failed in the protocol stack
    pub fn on_error<G>(&mut self, gatt: &mut G, conn: C, code: i32) -> Option<DiscoveryState>
    where
        G: GattClient<Conn = C>,
    {
        let mut session = self.take(conn)?;
        error!("{}", TimeError::DiscoveryProtocolError(code));
        session.state = DiscoveryState::Errored;
        Some(Self::release(gatt, session))
    }

    fn take(&mut self, conn: C) -> Option<DiscoverySession<C>> {
        match self.sessions.iter().position(|s| s.conn == conn) {
            Some(index) => Some(self.sessions.swap_remove(index)),
            None => {
                warn!("Discovery outcome for a link with no discovery in progress");
                None
            }
        }
    }

    fn release<G>(gatt: &mut G, session: DiscoverySession<C>) -> DiscoveryState
    where
        G: GattClient<Conn = C>,
    {
        if gatt.release_discovery(session.conn).is_err() {
            error!("Failed releasing discovery data");
        }
        session.state
    }
}

impl<C: Copy + PartialEq> Default for DiscoveryController<C> {
    fn default() -> Self {
        Self::new()
    }
}
