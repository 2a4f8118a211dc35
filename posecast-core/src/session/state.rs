//! Connection lifecycle state machine.
//!
//! Transitions are validated and return `Result` instead of panicking;
//! the session runtime treats an invalid transition as a stale event.

use std::fmt;

use crate::error::PosecastError;

// ── ConnectionState ──────────────────────────────────────────────

/// ```text
///  Disconnected ──► Connecting ──► Connected
///       ▲   ▲           │              │
///       │   │           ▼              ▼
///       │   └──── AwaitingReconnect ◄──┘
///       └──────────── (any, on disconnect)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// Socket handshake in progress.
    Connecting,
    Connected,
    /// The link dropped; a backoff timer is pending.
    AwaitingReconnect,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::AwaitingReconnect => write!(f, "AwaitingReconnect"),
        }
    }
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// `Connecting` or `Connected`: a new connect call has nothing to do.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Valid from: `Disconnected`, `AwaitingReconnect`.
    pub fn begin_connect(&mut self) -> Result<(), PosecastError> {
        match self {
            Self::Disconnected | Self::AwaitingReconnect => {
                *self = Self::Connecting;
                Ok(())
            }
            _ => Err(self.invalid("connect")),
        }
    }

    /// Valid from: `Connecting`.
    pub fn connected(&mut self) -> Result<(), PosecastError> {
        match self {
            Self::Connecting => {
                *self = Self::Connected;
                Ok(())
            }
            _ => Err(self.invalid("complete connect")),
        }
    }

    /// The link closed or the attempt failed and a retry is scheduled.
    ///
    /// Valid from: `Connecting`, `Connected`.
    pub fn schedule_reconnect(&mut self) -> Result<(), PosecastError> {
        match self {
            Self::Connecting | Self::Connected => {
                *self = Self::AwaitingReconnect;
                Ok(())
            }
            _ => Err(self.invalid("schedule reconnect")),
        }
    }

    /// Reset to `Disconnected` regardless of current state.
    pub fn force_disconnect(&mut self) {
        *self = Self::Disconnected;
    }

    fn invalid(&self, action: &'static str) -> PosecastError {
        PosecastError::InvalidTransition {
            from: *self,
            action,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_with_reconnect() {
        let mut state = ConnectionState::default();
        assert_eq!(state, ConnectionState::Disconnected);

        state.begin_connect().unwrap();
        state.connected().unwrap();
        assert!(state.is_connected());

        state.schedule_reconnect().unwrap();
        assert_eq!(state, ConnectionState::AwaitingReconnect);

        state.begin_connect().unwrap();
        assert_eq!(state, ConnectionState::Connecting);
    }

    #[test]
    fn failed_attempt_goes_back_to_waiting() {
        let mut state = ConnectionState::Connecting;
        state.schedule_reconnect().unwrap();
        assert_eq!(state, ConnectionState::AwaitingReconnect);
    }

    #[test]
    fn cannot_connect_twice() {
        let mut state = ConnectionState::Connected;
        let err = state.begin_connect().unwrap_err();
        assert_eq!(err.to_string(), "cannot connect while Connected");

        let mut state = ConnectionState::Connecting;
        assert!(state.begin_connect().is_err());
    }

    #[test]
    fn cannot_complete_without_attempt() {
        let mut state = ConnectionState::Disconnected;
        assert!(state.connected().is_err());
        assert!(state.schedule_reconnect().is_err());
    }

    #[test]
    fn force_disconnect_from_any_state() {
        for mut state in [
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::AwaitingReconnect,
        ] {
            state.force_disconnect();
            assert_eq!(state, ConnectionState::Disconnected);
        }
    }

    #[test]
    fn active_states() {
        assert!(ConnectionState::Connecting.is_active());
        assert!(ConnectionState::Connected.is_active());
        assert!(!ConnectionState::AwaitingReconnect.is_active());
        assert!(!ConnectionState::Disconnected.is_active());
    }
}
