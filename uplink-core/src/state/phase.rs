//! Session lifecycle state machine.
//!
//! Transitions are validated and return `Result` instead of panicking,
//! so the supervisor can never skip a step silently.

use std::time::{Duration, Instant};

use crate::error::UplinkError;

// ── SessionPhase ─────────────────────────────────────────────────

/// The current phase of the uplink session.
///
/// ```text
///  Disconnected ──► Connecting ──► Authenticating ──► Streaming ──► Restarting
///       ▲               │                 │               │              │
///       └───────────────┴─────────────────┴───────────────┘              │
///       ▲                                                                │
///       └────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// No connection. Initial state and the target of every failure.
    #[default]
    Disconnected,

    /// Transport handshake in progress.
    Connecting,

    /// Auth message sent; waiting for the first server reply.
    Authenticating,

    /// Frames and control messages are flowing.
    Streaming {
        /// When the session entered the `Streaming` state.
        since: Instant,
    },

    /// A capture failure is tearing the pipeline down.
    Restarting,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl SessionPhase {
    /// Stable name of the phase, used in events and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Authenticating => "Authenticating",
            Self::Streaming { .. } => "Streaming",
            Self::Restarting => "Restarting",
        }
    }

    /// Returns `true` while frames are flowing.
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming { .. })
    }

    /// Returns `true` when no connection exists.
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// How long the session has been streaming.
    ///
    /// Returns `None` for any other phase.
    pub fn streaming_duration(&self) -> Option<Duration> {
        match self {
            Self::Streaming { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Connecting`.
    ///
    /// Valid from: `Disconnected`.
    pub fn begin_connect(&mut self) -> Result<(), UplinkError> {
        match self {
            Self::Disconnected => {
                *self = Self::Connecting;
                Ok(())
            }
            _ => Err(UplinkError::Protocol(
                "cannot connect: not in Disconnected state",
            )),
        }
    }

    /// Transition to `Authenticating` once the transport is up.
    ///
    /// Valid from: `Connecting`.
    pub fn begin_auth(&mut self) -> Result<(), UplinkError> {
        match self {
            Self::Connecting => {
                *self = Self::Authenticating;
                Ok(())
            }
            _ => Err(UplinkError::Protocol(
                "cannot authenticate: not in Connecting state",
            )),
        }
    }

    /// Transition to `Streaming` after the server's first reply.
    ///
    /// Valid from: `Authenticating`.
    pub fn complete_auth(&mut self) -> Result<(), UplinkError> {
        match self {
            Self::Authenticating => {
                *self = Self::Streaming {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(UplinkError::Protocol(
                "cannot stream: not in Authenticating state",
            )),
        }
    }

    /// Transition to `Disconnected` after a failure or a dropped link.
    ///
    /// Valid from: `Connecting`, `Authenticating`, `Streaming`.
    pub fn disconnect(&mut self) -> Result<(), UplinkError> {
        match self {
            Self::Connecting | Self::Authenticating | Self::Streaming { .. } => {
                *self = Self::Disconnected;
                Ok(())
            }
            _ => Err(UplinkError::Protocol(
                "cannot disconnect: no connection in progress",
            )),
        }
    }

    /// Transition to `Restarting` on a capture failure.
    ///
    /// Valid from: `Streaming`.
    pub fn begin_restart(&mut self) -> Result<(), UplinkError> {
        match self {
            Self::Streaming { .. } => {
                *self = Self::Restarting;
                Ok(())
            }
            _ => Err(UplinkError::Protocol(
                "cannot restart: not in Streaming state",
            )),
        }
    }

    /// Transition back to `Disconnected` once the pipeline is rebuilt.
    ///
    /// Valid from: `Restarting`.
    pub fn finish_restart(&mut self) -> Result<(), UplinkError> {
        match self {
            Self::Restarting => {
                *self = Self::Disconnected;
                Ok(())
            }
            _ => Err(UplinkError::Protocol(
                "cannot finish restart: not in Restarting state",
            )),
        }
    }

    /// Force-reset to `Disconnected` regardless of current state.
    pub fn force_disconnect(&mut self) {
        *self = Self::Disconnected;
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_lifecycle() {
        let mut phase = SessionPhase::Disconnected;

        phase.begin_connect().unwrap();
        assert_eq!(phase, SessionPhase::Connecting);

        phase.begin_auth().unwrap();
        assert_eq!(phase, SessionPhase::Authenticating);

        phase.complete_auth().unwrap();
        assert!(phase.is_streaming());
        assert!(phase.streaming_duration().is_some());

        phase.disconnect().unwrap();
        assert!(phase.is_disconnected());
    }

    #[test]
    fn restart_path() {
        let mut phase = SessionPhase::Disconnected;
        phase.begin_connect().unwrap();
        phase.begin_auth().unwrap();
        phase.complete_auth().unwrap();

        phase.begin_restart().unwrap();
        assert_eq!(phase, SessionPhase::Restarting);

        phase.finish_restart().unwrap();
        assert!(phase.is_disconnected());
    }

    #[test]
    fn connect_failure_returns_to_disconnected() {
        let mut phase = SessionPhase::Connecting;
        phase.disconnect().unwrap();
        assert!(phase.is_disconnected());

        let mut phase = SessionPhase::Authenticating;
        phase.disconnect().unwrap();
        assert!(phase.is_disconnected());
    }

    #[test]
    fn invalid_transitions() {
        let mut phase = SessionPhase::Disconnected;
        assert!(phase.begin_auth().is_err());
        assert!(phase.complete_auth().is_err());
        assert!(phase.disconnect().is_err());
        assert!(phase.begin_restart().is_err());

        let mut phase = SessionPhase::Connecting;
        assert!(phase.begin_connect().is_err());
        assert!(phase.begin_restart().is_err());

        let mut phase = SessionPhase::Restarting;
        assert!(phase.begin_connect().is_err());
        assert!(phase.disconnect().is_err());
    }

    #[test]
    fn force_disconnect_from_any_state() {
        let mut phase = SessionPhase::Streaming {
            since: Instant::now(),
        };
        phase.force_disconnect();
        assert!(phase.is_disconnected());
    }

    #[test]
    fn display_format() {
        assert_eq!(SessionPhase::Disconnected.to_string(), "Disconnected");
        assert_eq!(SessionPhase::Connecting.to_string(), "Connecting");
        assert_eq!(SessionPhase::Authenticating.to_string(), "Authenticating");
        assert_eq!(
            SessionPhase::Streaming {
                since: Instant::now()
            }
            .to_string(),
            "Streaming"
        );
        assert_eq!(SessionPhase::Restarting.to_string(), "Restarting");
    }
}
