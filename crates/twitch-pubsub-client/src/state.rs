//! Connection status.

use std::sync::atomic::{AtomicU8, Ordering};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// A dial is in flight (first connect or reconnect).
    Connecting = 0,
    /// Normal operation.
    Up = 1,
    /// The last dial failed; the next trigger may retry.
    Down = 2,
    /// Closed by the caller. Terminal.
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Up,
            2 => ConnectionState::Down,
            _ => ConnectionState::Closed,
        }
    }

    /// States a reconnect may start from.
    pub(crate) fn can_reconnect(self) -> bool {
        matches!(self, ConnectionState::Up | ConnectionState::Down)
    }
}

/// Atomic cell holding a [`ConnectionState`].
///
/// Every transition out of a state goes through [`StateCell::transition`],
/// so two racing reconnect triggers collapse into one.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move `from` -> `to`. On failure returns the state actually observed.
    pub(crate) fn transition(
        &self,
        from: ConnectionState,
        to: ConnectionState,
    ) -> Result<(), ConnectionState> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(ConnectionState::from_u8)
    }

    /// Enter `Connecting` from any state that allows a reconnect.
    pub(crate) fn begin_reconnect(&self) -> Result<ConnectionState, ConnectionState> {
        let mut current = self.load();
        loop {
            if !current.can_reconnect() {
                return Err(current);
            }
            match self.transition(current, ConnectionState::Connecting) {
                Ok(()) => return Ok(current),
                Err(observed) => current = observed,
            }
        }
    }

    /// Enter `Closed`, returning the previous state.
    pub(crate) fn close(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.swap(ConnectionState::Closed as u8, Ordering::AcqRel))
    }
}
