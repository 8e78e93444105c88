//! In-memory collaborators for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::error::UplinkError;
use crate::message::{InboundMessage, OutboundMessage};
use crate::network::{Connector, Transport};
use crate::stream::{FrameEncoder, FrameSource, PixelFormat, QualityLevel, RawFrame, SourceFactory};

// ── MockTransport ────────────────────────────────────────────────

/// Transport fed from a channel that records everything sent on it.
pub(crate) struct MockTransport {
    inbound: AsyncMutex<mpsc::UnboundedReceiver<InboundMessage>>,
    sent: Mutex<Vec<OutboundMessage>>,
    frames_attempted: AtomicUsize,
    /// 1-based index of the frame send that breaks the connection.
    fail_on_frame: Option<usize>,
    closed: CancellationToken,
    broken: AtomicBool,
}

impl MockTransport {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedSender<InboundMessage>) {
        Self::build(None)
    }

    /// Transport whose `n`th frame send fails, as does everything after.
    pub(crate) fn failing_on_frame(
        n: usize,
    ) -> (Arc<Self>, mpsc::UnboundedSender<InboundMessage>) {
        Self::build(Some(n))
    }

    fn build(fail_on_frame: Option<usize>) -> (Arc<Self>, mpsc::UnboundedSender<InboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            inbound: AsyncMutex::new(rx),
            sent: Mutex::new(Vec::new()),
            frames_attempted: AtomicUsize::new(0),
            fail_on_frame,
            closed: CancellationToken::new(),
            broken: AtomicBool::new(false),
        });
        (transport, tx)
    }

    pub(crate) fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn sent_kinds(&self) -> Vec<&'static str> {
        self.sent().iter().map(OutboundMessage::kind).collect()
    }

    pub(crate) fn count(&self, kind: &str) -> usize {
        self.sent().iter().filter(|m| m.kind() == kind).count()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<(), UplinkError> {
        if self.is_closed() || self.broken.load(Ordering::SeqCst) {
            return Err(UplinkError::TransportClosed("mock closed".into()));
        }
        if matches!(message, OutboundMessage::Frame { .. }) {
            let n = self.frames_attempted.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on_frame == Some(n) {
                self.broken.store(true, Ordering::SeqCst);
                return Err(UplinkError::TransportClosed(format!("send failed on frame {n}")));
            }
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn recv(&self) -> Result<InboundMessage, UplinkError> {
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            _ = self.closed.cancelled() => Err(UplinkError::TransportClosed("mock closed".into())),
            msg = inbound.recv() => msg.ok_or_else(|| UplinkError::TransportClosed("peer hung up".into())),
        }
    }

    async fn close(&self) {
        self.closed.cancel();
    }
}

// ── MockConnector ────────────────────────────────────────────────

/// Hands out scripted transports in order; refuses once they run out.
#[derive(Default)]
pub(crate) struct MockConnector {
    script: Mutex<VecDeque<Option<Arc<MockTransport>>>>,
    attempts: AtomicUsize,
}

impl MockConnector {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn push(&self, transport: Arc<MockTransport>) {
        self.script.lock().unwrap().push_back(Some(transport));
    }

    pub(crate) fn push_refusal(&self) {
        self.script.lock().unwrap().push_back(None);
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn Transport>, UplinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front().flatten();
        match next {
            Some(transport) => Ok(transport),
            None => Err(UplinkError::TransportConnect {
                endpoint: endpoint.to_string(),
                reason: "connection refused".into(),
            }),
        }
    }
}

// ── ScriptedSource ───────────────────────────────────────────────

/// 2x2 RGB frames; the `fail_at`th call (1-based) is a capture failure.
pub(crate) struct ScriptedSource {
    calls: usize,
    fail_at: Option<usize>,
}

impl ScriptedSource {
    pub(crate) fn new(fail_at: Option<usize>) -> Self {
        Self { calls: 0, fail_at }
    }
}

#[async_trait]
impl FrameSource for ScriptedSource {
    async fn next_frame(&mut self) -> Result<RawFrame, UplinkError> {
        self.calls += 1;
        if self.fail_at.is_some_and(|n| self.calls >= n) {
            return Err(UplinkError::CaptureFailure(format!(
                "video capture read failed on call {}",
                self.calls
            )));
        }
        Ok(RawFrame {
            width: 2,
            height: 2,
            format: PixelFormat::Rgb8,
            data: Bytes::from(vec![0u8; 12]),
            sequence: self.calls as u64 - 1,
            captured_at: Instant::now(),
        })
    }
}

/// Factory counting how many sources it opened.
pub(crate) struct ScriptedSources {
    pub(crate) opened: Arc<AtomicUsize>,
    fail_at: Option<usize>,
}

impl ScriptedSources {
    pub(crate) fn new(fail_at: Option<usize>) -> Self {
        Self {
            opened: Arc::new(AtomicUsize::new(0)),
            fail_at,
        }
    }
}

impl SourceFactory for ScriptedSources {
    fn open(&self) -> Result<Box<dyn FrameSource>, UplinkError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSource::new(self.fail_at)))
    }
}

// ── StubEncoder ──────────────────────────────────────────────────

/// Emits the quality level as a one-byte payload; fails on chosen
/// frame sequence numbers.
#[derive(Default)]
pub(crate) struct StubEncoder {
    pub(crate) fail_sequences: Vec<u64>,
}

impl FrameEncoder for StubEncoder {
    fn encode(&mut self, frame: &RawFrame, quality: QualityLevel) -> Result<Vec<u8>, UplinkError> {
        if self.fail_sequences.contains(&frame.sequence) {
            return Err(UplinkError::Encode(format!("frame {} rejected", frame.sequence)));
        }
        Ok(vec![quality.get()])
    }
}

// ── ManualClock ──────────────────────────────────────────────────

/// Clock that only moves when told to.
#[derive(Debug)]
pub(crate) struct ManualClock {
    bits: AtomicU64,
}

impl ManualClock {
    pub(crate) fn at(secs: f64) -> Arc<Self> {
        Arc::new(Self {
            bits: AtomicU64::new(secs.to_bits()),
        })
    }

    pub(crate) fn set(&self, secs: f64) {
        self.bits.store(secs.to_bits(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}
