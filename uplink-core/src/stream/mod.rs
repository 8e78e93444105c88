//! # Streaming pipeline
//!
//! Everything that runs while a session is in the `Streaming` phase.
//!
//! ## Architecture
//!
//! ```text
//! SOURCE PROCESS                                   SIGNALING SERVER
//! ┌──────────────────────────────┐                ┌─────────────────┐
//! │ FrameSource::next_frame      │                │                 │
//! │   ↓                          │                │                 │
//! │ FrameEncoder::encode(q)      │   frame/ping   │                 │
//! │   ↓                          │ ────────────►  │  relay to peers │
//! │ FrameUplink ─► Transport     │                │                 │
//! │                              │   pong         │                 │
//! │ ControlChannelHandler ◄──────│ ◄────────────  │  echo timestamp │
//! │   ↓ rtt                      │                │                 │
//! │ LatencyController ─► q       │  latencyReport │                 │
//! │                      ────────│ ────────────►  │                 │
//! └──────────────────────────────┘                └─────────────────┘
//! ```
//!
//! ## Sub-modules
//!
//! | Module     | Purpose                                              |
//! |------------|------------------------------------------------------|
//! | `types`    | Raw frame and pixel types                            |
//! | `capture`  | `FrameSource` trait, ffmpeg and test-pattern sources |
//! | `encoder`  | `FrameEncoder` trait and the JPEG encoder            |
//! | `latency`  | Quality level and its latency-driven controller      |
//! | `control`  | Inbound message handling (pong → quality)            |
//! | `uplink`   | Outbound frame loop with periodic pings              |

pub mod capture;
pub mod control;
pub mod encoder;
pub mod latency;
pub mod types;
pub mod uplink;

// ── Re-exports ───────────────────────────────────────────────────

pub use capture::{
    CaptureConfig, FfmpegSource, FrameSource, PATTERN_SCHEME, PatternSource, SourceFactory,
    open_source,
};
pub use control::ControlChannelHandler;
pub use encoder::{EncoderHandle, FrameEncoder, JpegEncoder};
pub use latency::{
    DEFAULT_QUALITY, HARD_MAX_QUALITY, LatencyController, LatencyGauge, MIN_QUALITY, QualityLevel,
    QualityReader, SOFT_MAX_QUALITY,
};
pub use types::{PixelFormat, RawFrame, frame_len};
pub use uplink::{DEFAULT_PING_INTERVAL, DEFAULT_TARGET_FPS, FrameUplink, UplinkSettings};
