//! # uplink-core
//!
//! Session manager for a video source that streams frames to a
//! WebSocket signaling server.
//!
//! This crate contains:
//! - **Messages**: `OutboundMessage` / `InboundMessage` JSON wire model
//! - **Network**: `Transport` and `Connector` traits, WebSocket adapters
//! - **Stream**: frame sources, JPEG encoder, latency-driven quality
//!   control, and the two per-session loops
//! - **State**: the `SessionPhase` state machine and reconnect `Backoff`
//! - **Supervisor**: the top-level reconnect / restart loop
//! - **Events**: `SessionEvent` observability sink
//! - **Error**: `UplinkError`, typed, `thiserror`-based, with a
//!   `Recovery` decision per variant

pub mod clock;
pub mod error;
pub mod events;
pub mod message;
pub mod network;
pub mod state;
pub mod stream;
pub mod supervisor;

#[cfg(test)]
mod testing;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use clock::{Clock, SystemClock};
pub use error::{Recovery, UplinkError};
pub use events::{ChannelSink, EventSink, SessionEvent, TracingSink};
pub use message::{InboundMessage, OutboundMessage, Role};
pub use network::{Connector, Transport, WsConnector, WsTransport};
pub use state::{Backoff, MAX_BACKOFF, MIN_BACKOFF, SessionPhase};
pub use stream::{
    CaptureConfig, ControlChannelHandler, EncoderHandle, FrameEncoder, FrameSource, FrameUplink,
    JpegEncoder, LatencyController, QualityLevel, SourceFactory, UplinkSettings,
};
pub use supervisor::{Session, SessionConfig, Supervisor};
