//! Uplink source service core logic.
//!
//! Wires the concrete adapters (WebSocket connector, ffmpeg or pattern
//! frame source, JPEG encoder, tracing event sink) into a
//! [`Supervisor`] and runs it until stopped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;
use tracing::info;

use uplink_core::error::UplinkError;
use uplink_core::events::TracingSink;
use uplink_core::network::WsConnector;
use uplink_core::stream::JpegEncoder;
use uplink_core::supervisor::Supervisor;

use crate::config::SourceConfig;

// ── UplinkService ────────────────────────────────────────────────

/// The top-level source service.
///
/// Owns the validated configuration and the stop signal shared with
/// the Ctrl-C handler.
pub struct UplinkService {
    config: SourceConfig,
    shutdown: CancellationToken,
    running: AtomicBool,
}

impl UplinkService {
    /// Create a service; fails if the configuration is incomplete.
    pub fn new(config: SourceConfig) -> Result<Self, UplinkError> {
        config.validate()?;
        Ok(Self {
            config,
            shutdown: CancellationToken::new(),
            running: AtomicBool::new(false),
        })
    }

    /// A cloneable handle that stops the service from another task.
    pub fn stop_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until stopped. Connection and capture failures are
    /// recovered internally and never end this call.
    pub async fn run(&self) {
        self.running.store(true, Ordering::SeqCst);

        let capture = self.config.to_capture_config();
        info!(
            route = %capture.route,
            size = %format!("{}x{}", capture.width, capture.height),
            "video source configured"
        );

        let mut supervisor = Supervisor::new(
            self.config.to_session_config(),
            Arc::new(WsConnector::new()),
            Arc::new(capture),
            Box::new(JpegEncoder::new()),
        )
        .with_events(Arc::new(TracingSink));

        supervisor.run(self.shutdown.clone()).await;

        self.running.store(false, Ordering::SeqCst);
        info!("uplink source stopped");
    }

    /// Signal the service to stop.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Whether [`run`](Self::run) is in progress.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

// ── Tests ────────────────────────────────────────────────────────
