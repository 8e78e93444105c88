//! Error taxonomy for the uplink client.
//!
//! All fallible operations return `Result<T, UplinkError>`. The session
//! supervisor never inspects error text: every variant maps to a
//! [`Recovery`] decision through [`UplinkError::recovery`].

use thiserror::Error;

// ── Recovery ─────────────────────────────────────────────────────

/// What the supervisor does after a session terminates with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Recovery {
    /// Close the transport, wait out the backoff delay, connect again.
    /// The capture device is kept.
    Reconnect,
    /// Tear down the capture pipeline and rebuild everything from
    /// scratch, without waiting.
    Restart,
}

impl std::fmt::Display for Recovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reconnect => write!(f, "reconnect"),
            Self::Restart => write!(f, "restart"),
        }
    }
}

// ── UplinkError ──────────────────────────────────────────────────

/// The canonical error type for the uplink client.
#[derive(Debug, Error)]
pub enum UplinkError {
    // ── Transport Errors ─────────────────────────────────────────
    /// Opening the connection to the signaling endpoint failed.
    #[error("connect to {endpoint} failed: {reason}")]
    TransportConnect { endpoint: String, reason: String },

    /// The connection dropped, or a read/write on it failed.
    #[error("transport closed: {0}")]
    TransportClosed(String),

    /// The server answered the auth message with an explicit refusal.
    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    // ── Pipeline Errors ──────────────────────────────────────────
    /// The frame source is exhausted or the device failed.
    #[error("capture failure: {0}")]
    CaptureFailure(String),

    /// A single frame could not be compressed.
    #[error("encode error: {0}")]
    Encode(String),

    /// An inbound message was not parseable or lacked required fields.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    // ── Local Errors ─────────────────────────────────────────────
    /// A session phase transition was requested from the wrong phase.
    #[error("protocol violation: {0}")]
    Protocol(&'static str),

    /// Configuration is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// The OS reported an I/O error outside of the transport.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl UplinkError {
    /// How the supervisor recovers from this error.
    ///
    /// Only a capture failure warrants a full restart; a broken capture
    /// device cannot be fixed by reconnecting the network.
    pub fn recovery(&self) -> Recovery {
        match self {
            Self::CaptureFailure(_) => Recovery::Restart,
            _ => Recovery::Reconnect,
        }
    }

    /// Whether this error originated from the frame source.
    pub fn is_capture_failure(&self) -> bool {
        matches!(self, Self::CaptureFailure(_))
    }

    /// Re-classify any error raised while acquiring a frame as a
    /// capture failure.
    pub fn into_capture_failure(self) -> Self {
        match self {
            Self::CaptureFailure(_) => self,
            other => Self::CaptureFailure(other.to_string()),
        }
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<serde_json::Error> for UplinkError {
    fn from(e: serde_json::Error) -> Self {
        UplinkError::MalformedMessage(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for UplinkError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        UplinkError::TransportClosed(e.to_string())
    }
}
