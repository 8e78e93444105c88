//! Wire messages exchanged with the signaling server.
//!
//! Every message is a JSON object tagged by a `type` field. Outbound
//! messages are serialised with serde's internally tagged enums; inbound
//! messages go through a private wire enum so that anything unexpected
//! collapses into [`InboundMessage::Unrecognized`] instead of an error.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::UplinkError;

/// Longest slice of an unrecognized payload kept for diagnostics.
const UNRECOGNIZED_PREVIEW: usize = 256;

// ── Role ─────────────────────────────────────────────────────────

/// Role announced in the auth message.
///
/// This client only ever uploads, so `source` is the one role it speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The single process that uploads video.
    Source,
}

// ── OutboundMessage ──────────────────────────────────────────────

/// Messages sent from this client to the server.
#[derive(Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutboundMessage {
    /// First message on every connection.
    Auth { role: Role, password: String },
    /// One compressed video frame, base64 encoded.
    Frame { frame: String },
    /// Round-trip probe; the server echoes `timestamp` back in a pong.
    Ping { timestamp: f64 },
    /// Most recent round-trip time in milliseconds.
    LatencyReport { latency: f64 },
}

impl OutboundMessage {
    /// Auth message for the source role.
    pub fn auth(password: impl Into<String>) -> Self {
        Self::Auth {
            role: Role::Source,
            password: password.into(),
        }
    }

    /// Frame message carrying `payload` as standard base64.
    pub fn frame(payload: &[u8]) -> Self {
        Self::Frame {
            frame: STANDARD.encode(payload),
        }
    }

    /// Ping stamped with `timestamp` seconds on the sender clock.
    pub fn ping(timestamp: f64) -> Self {
        Self::Ping { timestamp }
    }

    /// Latency report in milliseconds.
    pub fn latency_report(latency_ms: f64) -> Self {
        Self::LatencyReport {
            latency: latency_ms,
        }
    }

    /// The `type` tag this message serialises with.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth",
            Self::Frame { .. } => "frame",
            Self::Ping { .. } => "ping",
            Self::LatencyReport { .. } => "latencyReport",
        }
    }

    /// Serialise to the JSON text sent over the transport.
    pub fn to_json(&self) -> Result<String, UplinkError> {
        serde_json::to_string(self).map_err(|e| UplinkError::Encode(e.to_string()))
    }

    /// Decode the payload of a frame message. `None` for other kinds or
    /// invalid base64.
    pub fn frame_bytes(&self) -> Option<Vec<u8>> {
        match self {
            Self::Frame { frame } => STANDARD.decode(frame).ok(),
            _ => None,
        }
    }
}

// Keeps passwords and multi-kilobyte frame payloads out of logs.
impl fmt::Debug for OutboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auth { role, .. } => f
                .debug_struct("Auth")
                .field("role", role)
                .field("password", &"<redacted>")
                .finish(),
            Self::Frame { frame } => f
                .debug_struct("Frame")
                .field("base64_len", &frame.len())
                .finish(),
            Self::Ping { timestamp } => {
                f.debug_struct("Ping").field("timestamp", timestamp).finish()
            }
            Self::LatencyReport { latency } => f
                .debug_struct("LatencyReport")
                .field("latency", latency)
                .finish(),
        }
    }
}

// ── InboundMessage ───────────────────────────────────────────────

/// Messages received from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// The server's verdict on the auth message (`info` or `error`).
    AuthResult {
        accepted: bool,
        message: Option<String>,
    },
    /// Echo of a ping, carrying the original send timestamp.
    Pong { timestamp: f64 },
    /// Anything else: unknown type, missing fields, non-JSON.
    Unrecognized(String),
}

/// Shapes the server actually sends.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum WireInbound {
    Pong {
        timestamp: f64,
    },
    Info {
        #[serde(default)]
        message: Option<String>,
    },
    Error {
        #[serde(default)]
        message: Option<String>,
    },
}

impl InboundMessage {
    /// Strictly parse a JSON text message.
    pub fn parse(text: &str) -> Result<Self, UplinkError> {
        let wire: WireInbound = serde_json::from_str(text)?;
        Ok(match wire {
            WireInbound::Pong { timestamp } => Self::Pong { timestamp },
            WireInbound::Info { message } => Self::AuthResult {
                accepted: true,
                message,
            },
            WireInbound::Error { message } => Self::AuthResult {
                accepted: false,
                message,
            },
        })
    }

    /// Parse leniently: malformed input becomes [`Self::Unrecognized`].
    pub fn from_text(text: &str) -> Self {
        match Self::parse(text) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!("discarding inbound message: {e}");
                Self::unrecognized(text)
            }
        }
    }

    /// Wrap raw text as unrecognized, truncated for diagnostics.
    pub fn unrecognized(text: &str) -> Self {
        let mut end = text.len().min(UNRECOGNIZED_PREVIEW);
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        Self::Unrecognized(text[..end].to_string())
    }

    /// Short description used when logging the handshake reply.
    pub fn describe(&self) -> String {
        match self {
            Self::AuthResult {
                accepted,
                message: Some(m),
            } => format!("{} ({m})", if *accepted { "info" } else { "error" }),
            Self::AuthResult { accepted, .. } => {
                let kind = if *accepted { "info" } else { "error" };
                kind.to_string()
            }
            Self::Pong { timestamp } => format!("pong {timestamp}"),
            Self::Unrecognized(raw) => raw.clone(),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
