//! Observability sink for the session supervisor.
//!
//! Policy code emits [`SessionEvent`]s; reporting is up to the injected
//! [`EventSink`]. [`TracingSink`] writes them to the log, [`ChannelSink`]
//! forwards them to whoever wants to watch (UI, tests).

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::Recovery;

// ── SessionEvent ─────────────────────────────────────────────────

/// Something noteworthy happened in the uplink.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The session state machine moved between phases.
    PhaseChanged {
        from: &'static str,
        to: &'static str,
    },
    /// A frame source was opened (on start-up or after a restart).
    SourceOpened { generation: u64 },
    /// Opening the frame source failed; retrying after `retry_in`.
    SourceUnavailable { reason: String, retry_in: Duration },
    /// Starting a connection attempt.
    Connecting { endpoint: String, attempt: u32 },
    /// First server message after auth.
    ServerResponse { response: String },
    /// Handshake complete; frames are flowing.
    Streaming,
    /// A pong produced a round-trip sample.
    LatencyMeasured { rtt_ms: f64 },
    /// The latency controller changed the quality level.
    QualityChanged { from: u8, to: u8, rtt_ms: f64 },
    /// A frame was skipped because it could not be encoded.
    FrameDropped { reason: String },
    /// A connection cycle ended, and how the supervisor will recover.
    SessionEnded { cause: String, recovery: Recovery },
    /// Waiting `delay` before the next connection attempt.
    Reconnecting { delay: Duration },
    /// Tearing down the capture pipeline for a full restart.
    Restarting { cause: String },
    /// The supervisor observed the stop signal and exited.
    Stopped,
}

// ── EventSink ────────────────────────────────────────────────────

/// Receiver of [`SessionEvent`]s. Must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: SessionEvent);
}

/// Writes events as `tracing` log lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: SessionEvent) {
        match event {
            SessionEvent::PhaseChanged { from, to } => debug!(from, to, "session phase"),
            SessionEvent::SourceOpened { generation } => {
                info!(generation, "video source opened")
            }
            SessionEvent::SourceUnavailable { reason, retry_in } => warn!(
                "could not open video source: {reason}; retrying in {}s",
                retry_in.as_secs_f32()
            ),
            SessionEvent::Connecting { endpoint, attempt } => {
                info!(attempt, "connecting to {endpoint}")
            }
            SessionEvent::ServerResponse { response } => info!("server response: {response}"),
            SessionEvent::Streaming => info!("starting video streaming"),
            SessionEvent::LatencyMeasured { rtt_ms } => debug!("round trip {rtt_ms:.1} ms"),
            SessionEvent::QualityChanged { from, to, rtt_ms } if to < from => warn!(
                "high latency ({rtt_ms:.1} ms), lowering quality {from} -> {to}"
            ),
            SessionEvent::QualityChanged { from, to, rtt_ms } => info!(
                "low latency ({rtt_ms:.1} ms), raising quality {from} -> {to}"
            ),
            SessionEvent::FrameDropped { reason } => debug!("frame dropped: {reason}"),
            SessionEvent::SessionEnded { cause, recovery } => {
                warn!(%recovery, "session ended: {cause}")
            }
            SessionEvent::Reconnecting { delay } => {
                info!("reconnecting in {}s", delay.as_secs_f32())
            }
            SessionEvent::Restarting { cause } => {
                warn!("capture failure ({cause}), restarting the capture pipeline")
            }
            SessionEvent::Stopped => info!("uplink stopped"),
        }
    }
}

/// Forwards events into an unbounded channel.
///
/// Events are dropped silently once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiver that observes it.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }
}
