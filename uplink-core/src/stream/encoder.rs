//! JPEG frame encoder.
//!
//! The relay and its viewers expect each `frame` message to carry a
//! base64-encoded JPEG, so the encoder's only knob is the quality level
//! chosen by the [`LatencyController`](crate::stream::LatencyController).

use std::sync::Arc;

use image::ExtendedColorType;
use image::codecs::jpeg::JpegEncoder as ImageJpegEncoder;

use crate::error::UplinkError;
use crate::stream::latency::QualityLevel;
use crate::stream::types::{PixelFormat, RawFrame};

/// Turns a raw frame into compressed bytes at a given quality.
pub trait FrameEncoder: Send {
    fn encode(&mut self, frame: &RawFrame, quality: QualityLevel) -> Result<Vec<u8>, UplinkError>;
}

// ── EncoderHandle ────────────────────────────────────────────────

/// Shared, cloneable access to one [`FrameEncoder`].
///
/// Encoding is CPU-bound, so [`encode`](Self::encode) runs it on the
/// blocking pool and the caller's task keeps servicing its other
/// branches meanwhile.
#[derive(Clone)]
pub struct EncoderHandle {
    inner: Arc<tokio::sync::Mutex<Box<dyn FrameEncoder>>>,
}

impl EncoderHandle {
    pub fn new(encoder: impl FrameEncoder + 'static) -> Self {
        Self::from_box(Box::new(encoder))
    }

    pub fn from_box(encoder: Box<dyn FrameEncoder>) -> Self {
        Self {
            inner: Arc::new(tokio::sync::Mutex::new(encoder)),
        }
    }

    /// Encode `frame` off the async runtime.
    pub async fn encode(&self, frame: RawFrame, quality: QualityLevel) -> Result<Vec<u8>, UplinkError> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.blocking_lock().encode(&frame, quality))
            .await
            .map_err(|e| UplinkError::Encode(format!("encoder task: {e}")))?
    }
}

// ── JpegEncoder ──────────────────────────────────────────────────

/// Baseline JPEG encoder backed by the `image` crate.
///
/// Stateless apart from a reusable output buffer capacity hint, so one
/// instance can live across reconnects and source restarts.
#[derive(Debug, Default)]
pub struct JpegEncoder {
    /// Size of the last encoded frame, used to pre-size the next buffer.
    last_len: usize,
    frames_encoded: u64,
}

impl JpegEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total frames encoded so far.
    pub fn frames_encoded(&self) -> u64 {
        self.frames_encoded
    }
}

impl FrameEncoder for JpegEncoder {
    fn encode(&mut self, frame: &RawFrame, quality: QualityLevel) -> Result<Vec<u8>, UplinkError> {
        if !frame.is_well_formed() {
            return Err(UplinkError::Encode(format!(
                "frame {} is {} bytes, expected {} for {}x{}",
                frame.sequence,
                frame.data.len(),
                frame.expected_len(),
                frame.width,
                frame.height
            )));
        }

        let color = match frame.format {
            PixelFormat::Rgb8 => ExtendedColorType::Rgb8,
            PixelFormat::Luma8 => ExtendedColorType::L8,
        };

        let mut out = Vec::with_capacity(self.last_len + self.last_len / 4);
        ImageJpegEncoder::new_with_quality(&mut out, quality.get())
            .encode(&frame.data, frame.width, frame.height, color)
            .map_err(|e| UplinkError::Encode(format!("jpeg: {e}")))?;

        self.last_len = out.len();
        self.frames_encoded += 1;
        Ok(out)
    }
}

// ── Tests ────────────────────────────────────────────────────────
