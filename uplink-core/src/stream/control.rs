//! Inbound half of a streaming session.
//!
//! [`ControlChannelHandler`] reads server messages until the transport
//! fails. Pongs are turned into round-trip samples that drive the
//! [`LatencyController`] and are reported back with a `latencyReport`;
//! everything else is ignored.

use std::sync::Arc;

use crate::clock::Clock;
use crate::error::UplinkError;
use crate::events::{EventSink, SessionEvent};
use crate::message::{InboundMessage, OutboundMessage};
use crate::network::Transport;
use crate::stream::latency::{LatencyController, LatencyGauge};

pub struct ControlChannelHandler {
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
    latency: LatencyGauge,
}

impl ControlChannelHandler {
    pub fn new(
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
        latency: LatencyGauge,
    ) -> Self {
        Self {
            transport,
            clock,
            events,
            latency,
        }
    }

    /// Process inbound messages until the transport closes.
    ///
    /// Only returns with the error that ended the session.
    pub async fn run(&self, controller: &mut LatencyController) -> Result<(), UplinkError> {
        loop {
            let message = self.transport.recv().await?;
            self.handle(message, controller).await?;
        }
    }

    /// React to one inbound message.
    pub async fn handle(
        &self,
        message: InboundMessage,
        controller: &mut LatencyController,
    ) -> Result<(), UplinkError> {
        let timestamp = match message {
            InboundMessage::Pong { timestamp } => timestamp,
            other => {
                tracing::trace!("ignoring {}", other.describe());
                return Ok(());
            }
        };

        let rtt_ms = (self.clock.now_secs() - timestamp) * 1000.0;
        if rtt_ms.is_finite() && rtt_ms >= 0.0 {
            self.apply_sample(rtt_ms, controller);
        } else {
            tracing::debug!(timestamp, "pong with implausible round trip {rtt_ms}; quality unchanged");
        }

        // Every pong is answered, plausible or not.
        self.transport
            .send(&OutboundMessage::latency_report(Self::reportable(rtt_ms)))
            .await
    }

    fn apply_sample(&self, rtt_ms: f64, controller: &mut LatencyController) {
        self.latency.record(rtt_ms);
        self.events.emit(SessionEvent::LatencyMeasured { rtt_ms });

        let before = controller.current();
        let after = controller.observe(rtt_ms);
        if after != before {
            self.events.emit(SessionEvent::QualityChanged {
                from: before.get(),
                to: after.get(),
                rtt_ms,
            });
        }
    }

    /// JSON has no NaN or infinity; those are reported as zero.
    fn reportable(rtt_ms: f64) -> f64 {
        if rtt_ms.is_finite() { rtt_ms } else { 0.0 }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChannelSink;
    use crate::stream::latency::QualityLevel;
    use crate::testing::{ManualClock, MockTransport};

    fn handler(
        transport: Arc<MockTransport>,
        clock: Arc<ManualClock>,
    ) -> (ControlChannelHandler, tokio::sync::mpsc::UnboundedReceiver<SessionEvent>) {
        let (sink, rx) = ChannelSink::new();
        let handler =
            ControlChannelHandler::new(transport, clock, Arc::new(sink), LatencyGauge::new());
        (handler, rx)
    }

    fn reports(transport: &MockTransport) -> Vec<f64> {
        transport
            .sent()
            .into_iter()
            .filter_map(|m| match m {
                OutboundMessage::LatencyReport { latency } => Some(latency),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn pongs_adjust_quality_and_report() {
        let (transport, _tx) = MockTransport::new();
        let clock = ManualClock::at(1000.0);
        let (handler, mut events) = handler(transport.clone(), clock.clone());
        let mut controller = LatencyController::new(QualityLevel::new(70));

        clock.set(1000.25);
        handler
            .handle(InboundMessage::Pong { timestamp: 1000.0 }, &mut controller)
            .await
            .unwrap();
        assert_eq!(controller.current().get(), 60);

        clock.set(1000.05);
        handler
            .handle(InboundMessage::Pong { timestamp: 1000.0 }, &mut controller)
            .await
            .unwrap();
        assert_eq!(controller.current().get(), 70);

        clock.set(1000.15);
        handler
            .handle(InboundMessage::Pong { timestamp: 1000.0 }, &mut controller)
            .await
            .unwrap();
        assert_eq!(controller.current().get(), 70);

        let sent = reports(&transport);
        assert_eq!(sent.len(), 3);
        assert!((sent[0] - 250.0).abs() < 1e-6);
        assert!((sent[1] - 50.0).abs() < 1e-6);
        assert!((sent[2] - 150.0).abs() < 1e-6);

        let mut changes = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let SessionEvent::QualityChanged { from, to, .. } = event {
                changes.push((from, to));
            }
        }
        assert_eq!(changes, vec![(70, 60), (60, 70)]);
    }

    #[tokio::test]
    async fn non_pong_messages_are_ignored() {
        let (transport, _tx) = MockTransport::new();
        let (handler, _events) = handler(transport.clone(), ManualClock::at(5.0));
        let mut controller = LatencyController::default();

        for message in [
            InboundMessage::AuthResult {
                accepted: true,
                message: Some("hello".into()),
            },
            InboundMessage::unrecognized("{\"type\":\"frame\"}"),
        ] {
            handler.handle(message, &mut controller).await.unwrap();
        }
        assert!(transport.sent().is_empty());
        assert_eq!(controller.current(), QualityLevel::default());
    }

    #[tokio::test]
    async fn implausible_pongs_are_reported_without_quality_change() {
        let (transport, _tx) = MockTransport::new();
        let (handler, mut events) = handler(transport.clone(), ManualClock::at(10.0));
        let mut controller = LatencyController::new(QualityLevel::new(70));

        handler
            .handle(InboundMessage::Pong { timestamp: 11.0 }, &mut controller)
            .await
            .unwrap();
        handler
            .handle(InboundMessage::Pong { timestamp: f64::NAN }, &mut controller)
            .await
            .unwrap();

        let sent = reports(&transport);
        assert_eq!(sent.len(), 2);
        assert!((sent[0] + 1000.0).abs() < 1e-6);
        assert_eq!(sent[1], 0.0);
        assert_eq!(controller.current().get(), 70);
        assert!(handler.latency.last().is_none());
        while let Ok(event) = events.try_recv() {
            assert!(!matches!(event, SessionEvent::QualityChanged { .. }));
        }
    }

    #[tokio::test]
    async fn every_pong_gets_exactly_one_report() {
        let (transport, _tx) = MockTransport::new();
        let clock = ManualClock::at(50.0);
        let (handler, _events) = handler(transport.clone(), clock.clone());
        let mut controller = LatencyController::default();

        for (now, stamp) in [(50.1, 50.0), (50.0, 50.5), (50.3, 50.0), (50.0, f64::INFINITY)] {
            clock.set(now);
            handler
                .handle(InboundMessage::Pong { timestamp: stamp }, &mut controller)
                .await
                .unwrap();
        }
        assert_eq!(transport.count("latencyReport"), 4);
        assert_eq!(transport.sent().len(), 4);
    }

    #[tokio::test]
    async fn run_ends_with_transport_closed() {
        let (transport, tx) = MockTransport::new();
        let clock = ManualClock::at(2.0);
        let (handler, _events) = handler(transport.clone(), clock);
        let mut controller = LatencyController::default();

        tx.send(InboundMessage::Pong { timestamp: 1.999 }).unwrap();
        drop(tx);

        let err = handler.run(&mut controller).await.unwrap_err();
        assert!(matches!(err, UplinkError::TransportClosed(_)));
        assert_eq!(transport.count("latencyReport"), 1);
        let rtt = handler.latency.last().unwrap();
        assert!((rtt - 1.0).abs() < 1e-3);
    }
}
