//! Session supervisor.
//!
//! Owns the long-lived pieces (frame source, encoder, connector) and
//! drives the [`SessionPhase`] state machine forever:
//!
//! ```text
//! open source ─► Connecting ─► Authenticating ─► Streaming
//!     ▲              │               │               │
//!     │              └── backoff ◄───┴──── other ────┤
//!     │                     │                        │
//!     │                     └──► Connecting          │ capture failure
//!     └────────────────────── Restarting ◄───────────┘
//! ```
//!
//! A transport failure keeps the source and the quality level and
//! reconnects after an exponential backoff. A capture failure rebuilds
//! the whole pipeline: fresh source, fresh quality level, fresh backoff
//! and, as always, a fresh transport. The rebuild is immediate unless the
//! failed source never delivered a frame, in which case it waits the
//! minimum backoff first.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::clock::{Clock, SystemClock};
use crate::error::{Recovery, UplinkError};
use crate::events::{EventSink, SessionEvent, TracingSink};
use crate::message::{InboundMessage, OutboundMessage};
use crate::network::{Connector, Transport};
use crate::state::{Backoff, MAX_BACKOFF, MIN_BACKOFF, SessionPhase};
use crate::stream::{
    ControlChannelHandler, DEFAULT_PING_INTERVAL, DEFAULT_QUALITY, DEFAULT_TARGET_FPS,
    EncoderHandle, FrameEncoder, FrameSource, FrameUplink, LatencyController, LatencyGauge, QualityLevel,
    QualityReader, SourceFactory, UplinkSettings,
};

// ── SessionConfig ────────────────────────────────────────────────

/// Immutable inputs for the supervisor.
#[derive(Clone, PartialEq)]
pub struct SessionConfig {
    /// `ws://host:port/path` of the signaling server.
    pub endpoint: String,
    /// Shared secret sent in the auth message.
    pub password: String,
    /// Require an explicit `info` reply to auth.
    pub strict_auth: bool,
    pub target_fps: u32,
    pub ping_interval_frames: u64,
    /// Quality level after start-up and after every restart.
    pub initial_quality: u8,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            password: String::new(),
            strict_auth: false,
            target_fps: DEFAULT_TARGET_FPS,
            ping_interval_frames: DEFAULT_PING_INTERVAL,
            initial_quality: DEFAULT_QUALITY,
            min_backoff: MIN_BACKOFF,
            max_backoff: MAX_BACKOFF,
        }
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("endpoint", &self.endpoint)
            .field("password", &"<redacted>")
            .field("strict_auth", &self.strict_auth)
            .field("target_fps", &self.target_fps)
            .field("ping_interval_frames", &self.ping_interval_frames)
            .field("initial_quality", &self.initial_quality)
            .field("min_backoff", &self.min_backoff)
            .field("max_backoff", &self.max_backoff)
            .finish()
    }
}

impl SessionConfig {
    pub fn uplink_settings(&self) -> UplinkSettings {
        UplinkSettings::new(self.target_fps, self.ping_interval_frames)
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::with_bounds(self.min_backoff, self.max_backoff)
    }
}

// ── Session ──────────────────────────────────────────────────────

/// One authenticated connection.
///
/// Lives from the end of the handshake until the transport is closed.
/// The two streaming loops only see the shared cells, never the
/// session itself.
pub struct Session {
    transport: Arc<dyn Transport>,
    quality: QualityReader,
    frames_sent: Arc<AtomicU64>,
    latency: LatencyGauge,
}

impl Session {
    pub fn quality(&self) -> QualityLevel {
        self.quality.current()
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    /// Last round trip in milliseconds.
    pub fn latency_ms(&self) -> Option<f64> {
        self.latency.last()
    }
}

/// How one connect → stream cycle ended.
enum CycleEnd {
    Stopped,
    Failed(UplinkError),
}

// ── Supervisor ───────────────────────────────────────────────────

pub struct Supervisor {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    sources: Arc<dyn SourceFactory>,
    encoder: EncoderHandle,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
    phase: SessionPhase,
    generation: u64,
    /// Frames sent since the current source was opened.
    generation_frames: u64,
}

impl Supervisor {
    pub fn new(
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        sources: Arc<dyn SourceFactory>,
        encoder: Box<dyn FrameEncoder>,
    ) -> Self {
        Self {
            config,
            connector,
            sources,
            encoder: EncoderHandle::from_box(encoder),
            clock: Arc::new(SystemClock),
            events: Arc::new(TracingSink),
            phase: SessionPhase::default(),
            generation: 0,
            generation_frames: 0,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Run until `shutdown` is cancelled.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        'pipeline: while !shutdown.is_cancelled() {
            let Some(mut source) = self.open_source(&shutdown).await else {
                break;
            };
            let mut controller =
                LatencyController::new(QualityLevel::new(self.config.initial_quality));
            let mut backoff = self.config.backoff();
            let mut attempt = 0u32;

            loop {
                attempt += 1;
                let end = self
                    .cycle(source.as_mut(), &mut controller, &mut backoff, attempt, &shutdown)
                    .await;
                let err = match end {
                    CycleEnd::Stopped => break 'pipeline,
                    CycleEnd::Failed(err) => err,
                };

                if self.phase.is_streaming() {
                    attempt = 0;
                }
                let recovery = err.recovery();
                self.events.emit(SessionEvent::SessionEnded {
                    cause: err.to_string(),
                    recovery,
                });

                match recovery {
                    Recovery::Restart => {
                        self.transition(SessionPhase::begin_restart);
                        self.events.emit(SessionEvent::Restarting {
                            cause: err.to_string(),
                        });
                        drop(source);
                        self.transition(SessionPhase::finish_restart);
                        if self.generation_frames == 0 {
                            let retry_in = self.config.min_backoff;
                            self.events.emit(SessionEvent::SourceUnavailable {
                                reason: format!("failed before its first frame: {err}"),
                                retry_in,
                            });
                            if !sleep_or_stop(retry_in, &shutdown).await {
                                break 'pipeline;
                            }
                        }
                        continue 'pipeline;
                    }
                    Recovery::Reconnect => {
                        self.transition(SessionPhase::disconnect);
                        let delay = backoff.next_delay();
                        self.events.emit(SessionEvent::Reconnecting { delay });
                        if !sleep_or_stop(delay, &shutdown).await {
                            break 'pipeline;
                        }
                    }
                }
            }
        }

        self.phase.force_disconnect();
        self.events.emit(SessionEvent::Stopped);
    }

    /// Open a fresh frame source, retrying after the minimum backoff.
    async fn open_source(&mut self, shutdown: &CancellationToken) -> Option<Box<dyn FrameSource>> {
        loop {
            if shutdown.is_cancelled() {
                return None;
            }
            match self.sources.open() {
                Ok(source) => {
                    self.generation += 1;
                    self.generation_frames = 0;
                    self.events.emit(SessionEvent::SourceOpened {
                        generation: self.generation,
                    });
                    return Some(source);
                }
                Err(e) => {
                    let retry_in = self.config.min_backoff;
                    self.events.emit(SessionEvent::SourceUnavailable {
                        reason: e.to_string(),
                        retry_in,
                    });
                    if !sleep_or_stop(retry_in, shutdown).await {
                        return None;
                    }
                }
            }
        }
    }

    /// Connect, authenticate and stream until something breaks.
    ///
    /// The transport is always closed before this returns.
    async fn cycle(
        &mut self,
        source: &mut dyn FrameSource,
        controller: &mut LatencyController,
        backoff: &mut Backoff,
        attempt: u32,
        shutdown: &CancellationToken,
    ) -> CycleEnd {
        self.transition(SessionPhase::begin_connect);
        self.events.emit(SessionEvent::Connecting {
            endpoint: self.config.endpoint.clone(),
            attempt,
        });

        let connected = tokio::select! {
            _ = shutdown.cancelled() => return CycleEnd::Stopped,
            r = self.connector.connect(&self.config.endpoint) => r,
        };
        let transport = match connected {
            Ok(t) => t,
            Err(e) => return CycleEnd::Failed(e),
        };

        self.transition(SessionPhase::begin_auth);
        let auth = tokio::select! {
            _ = shutdown.cancelled() => None,
            r = Self::authenticate(&self.config, self.events.as_ref(), transport.as_ref()) => Some(r),
        };
        match auth {
            None => {
                transport.close().await;
                return CycleEnd::Stopped;
            }
            Some(Err(e)) => {
                transport.close().await;
                return CycleEnd::Failed(e);
            }
            Some(Ok(())) => {}
        }

        self.transition(SessionPhase::complete_auth);
        backoff.reset();
        self.events.emit(SessionEvent::Streaming);

        let session = Session {
            transport: Arc::clone(&transport),
            quality: controller.reader(),
            frames_sent: Arc::new(AtomicU64::new(0)),
            latency: LatencyGauge::new(),
        };
        let end = self.stream(&session, source, controller, shutdown).await;
        self.generation_frames += session.frames_sent();
        tracing::debug!(
            frames_sent = session.frames_sent(),
            quality = session.quality().get(),
            latency_ms = ?session.latency_ms(),
            "session over"
        );
        transport.close().await;
        end
    }

    /// Send auth and wait for the first reply.
    async fn authenticate(
        config: &SessionConfig,
        events: &dyn EventSink,
        transport: &dyn Transport,
    ) -> Result<(), UplinkError> {
        transport
            .send(&OutboundMessage::auth(&config.password))
            .await?;
        let reply = transport.recv().await?;
        let response = reply.describe();
        events.emit(SessionEvent::ServerResponse {
            response: response.clone(),
        });

        match reply {
            InboundMessage::AuthResult {
                accepted: false,
                message,
            } => Err(UplinkError::AuthRejected(
                message.unwrap_or_else(|| "no reason given".into()),
            )),
            InboundMessage::AuthResult { accepted: true, .. } => Ok(()),
            _ if config.strict_auth => Err(UplinkError::AuthRejected(format!(
                "expected an info reply, got {response}"
            ))),
            _ => Ok(()),
        }
    }

    /// Run both streaming loops; the first to finish cancels the other.
    async fn stream(
        &mut self,
        session: &Session,
        source: &mut dyn FrameSource,
        controller: &mut LatencyController,
        shutdown: &CancellationToken,
    ) -> CycleEnd {
        let control = ControlChannelHandler::new(
            Arc::clone(&session.transport),
            Arc::clone(&self.clock),
            Arc::clone(&self.events),
            session.latency.clone(),
        );
        let uplink = FrameUplink::new(
            Arc::clone(&session.transport),
            session.quality.clone(),
            Arc::clone(&self.clock),
            Arc::clone(&self.events),
            self.config.uplink_settings(),
        )
        .with_frame_counter(Arc::clone(&session.frames_sent));

        let result = tokio::select! {
            _ = shutdown.cancelled() => return CycleEnd::Stopped,
            r = control.run(controller) => r,
            r = uplink.run(source, &self.encoder) => r,
        };
        match result {
            Err(e) => CycleEnd::Failed(e),
            Ok(()) => CycleEnd::Failed(UplinkError::TransportClosed("stream ended".into())),
        }
    }

    /// Apply a phase transition and report it; an invalid transition is
    /// logged and the phase forced back to `Disconnected`.
    fn transition(&mut self, apply: fn(&mut SessionPhase) -> Result<(), UplinkError>) {
        let from = self.phase.name();
        if let Err(e) = apply(&mut self.phase) {
            tracing::error!(from, "{e}");
            self.phase.force_disconnect();
        }
        self.events.emit(SessionEvent::PhaseChanged {
            from,
            to: self.phase.name(),
        });
    }
}

/// Sleep for `delay`; `false` if `shutdown` fired first.
async fn sleep_or_stop(delay: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

// ── Tests ────────────────────────────────────────────────────────
