//! Outbound half of a streaming session.
//!
//! [`FrameUplink`] pulls frames from the [`FrameSource`], encodes them at
//! the quality currently published by the latency controller and sends
//! them as `frame` messages at a fixed cadence. Every
//! `ping_interval`th successfully sent frame is followed by a `ping`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

use crate::clock::Clock;
use crate::error::UplinkError;
use crate::events::{EventSink, SessionEvent};
use crate::message::OutboundMessage;
use crate::network::Transport;
use crate::stream::capture::FrameSource;
use crate::stream::encoder::EncoderHandle;
use crate::stream::latency::QualityReader;

/// Default frame cadence.
pub const DEFAULT_TARGET_FPS: u32 = 30;

/// Default number of sent frames between round-trip probes.
pub const DEFAULT_PING_INTERVAL: u64 = 30;

/// How often the throughput summary is logged.
const STATS_INTERVAL: Duration = Duration::from_secs(5);

// ── UplinkSettings ───────────────────────────────────────────────

/// Cadence parameters for [`FrameUplink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UplinkSettings {
    /// Target time per loop iteration.
    pub frame_interval: Duration,
    /// Send a ping after every this many sent frames.
    pub ping_interval: u64,
}

impl UplinkSettings {
    /// Settings for `target_fps` frames per second (at least 1).
    pub fn new(target_fps: u32, ping_interval: u64) -> Self {
        Self {
            frame_interval: Duration::from_secs_f64(1.0 / target_fps.max(1) as f64),
            ping_interval: ping_interval.max(1),
        }
    }
}

impl Default for UplinkSettings {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_FPS, DEFAULT_PING_INTERVAL)
    }
}

// ── FrameUplink ──────────────────────────────────────────────────

pub struct FrameUplink {
    transport: Arc<dyn Transport>,
    quality: QualityReader,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
    settings: UplinkSettings,
    frames_sent: Arc<AtomicU64>,
    frames_dropped: AtomicU64,
}

impl FrameUplink {
    pub fn new(
        transport: Arc<dyn Transport>,
        quality: QualityReader,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
        settings: UplinkSettings,
    ) -> Self {
        Self {
            transport,
            quality,
            clock,
            events,
            settings,
            frames_sent: Arc::new(AtomicU64::new(0)),
            frames_dropped: AtomicU64::new(0),
        }
    }

    /// Count sent frames into `counter` instead of a private one.
    pub fn with_frame_counter(mut self, counter: Arc<AtomicU64>) -> Self {
        self.frames_sent = counter;
        self
    }

    /// Shared counter of frames sent in this session.
    pub fn frames_sent(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.frames_sent)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }

    /// Run the capture → encode → send loop.
    ///
    /// Only returns with the error that ended it: a
    /// [`CaptureFailure`](UplinkError::CaptureFailure) when the source
    /// gives out, otherwise the transport error.
    pub async fn run(
        &self,
        source: &mut dyn FrameSource,
        encoder: &EncoderHandle,
    ) -> Result<(), UplinkError> {
        let mut last_stats = Instant::now();

        loop {
            let loop_start = Instant::now();

            // 1. Capture.
            let frame = source
                .next_frame()
                .await
                .map_err(UplinkError::into_capture_failure)?;

            // 2. Encode; a bad frame is skipped, not fatal.
            let quality = self.quality.current();
            let payload = match encoder.encode(frame, quality).await {
                Ok(payload) => payload,
                Err(e) => {
                    self.frames_dropped.fetch_add(1, Ordering::Relaxed);
                    self.events.emit(SessionEvent::FrameDropped {
                        reason: e.to_string(),
                    });
                    Self::pace(loop_start, self.settings.frame_interval).await;
                    continue;
                }
            };

            // 3. Send.
            self.transport
                .send(&OutboundMessage::frame(&payload))
                .await?;
            let sent = self.frames_sent.fetch_add(1, Ordering::Relaxed) + 1;

            // 4. Probe round trip.
            if sent % self.settings.ping_interval == 0 {
                self.transport
                    .send(&OutboundMessage::ping(self.clock.now_secs()))
                    .await?;
            }

            if last_stats.elapsed() >= STATS_INTERVAL {
                tracing::debug!(
                    frames_sent = sent,
                    frames_dropped = self.frames_dropped(),
                    quality = quality.get(),
                    bytes = payload.len(),
                    "uplink stats"
                );
                last_stats = Instant::now();
            }

            // 5. Frame pacing.
            Self::pace(loop_start, self.settings.frame_interval).await;
        }
    }

    /// Sleep for the remainder of the frame interval.
    async fn pace(loop_start: Instant, interval: Duration) {
        let elapsed = loop_start.elapsed();
        if elapsed < interval {
            tokio::time::sleep(interval - elapsed).await;
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
