//! Frame sources.
//!
//! A [`FrameSource`] hands out raw frames on demand; any error it returns
//! is a capture failure. Two adapters exist:
//!
//! - [`FfmpegSource`] decodes a device, file or stream URL through an
//!   `ffmpeg` child process emitting packed RGB24 on stdout.
//! - [`PatternSource`] synthesises a moving test pattern
//!   (`pattern://WIDTHxHEIGHT`), for running without hardware.
//!
//! The supervisor owns one source across ordinary reconnects and asks
//! its [`SourceFactory`] for a fresh one after a capture failure.

use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};

use crate::error::UplinkError;
use crate::stream::types::{PixelFormat, RawFrame, frame_len};

/// Route prefix selecting [`PatternSource`].
pub const PATTERN_SCHEME: &str = "pattern://";

// ── Traits ───────────────────────────────────────────────────────

/// Produces raw frames until the underlying device gives out.
#[async_trait]
pub trait FrameSource: Send {
    /// Acquire the next frame.
    ///
    /// Must be cancel-safe: dropping the future part-way leaves the
    /// source able to deliver the following frame intact.
    async fn next_frame(&mut self) -> Result<RawFrame, UplinkError>;
}

/// Builds a fresh [`FrameSource`] on start-up and after every restart.
pub trait SourceFactory: Send + Sync {
    fn open(&self) -> Result<Box<dyn FrameSource>, UplinkError>;
}

impl<F> SourceFactory for F
where
    F: Fn() -> Result<Box<dyn FrameSource>, UplinkError> + Send + Sync,
{
    fn open(&self) -> Result<Box<dyn FrameSource>, UplinkError> {
        self()
    }
}

// ── CaptureConfig ────────────────────────────────────────────────

/// Where frames come from and at what size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Device path, file, stream URL, or `pattern://WxH`.
    pub route: String,
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Force an ffmpeg demuxer (`-f`). `/dev/video*` defaults to `v4l2`.
    pub input_format: Option<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            route: "/dev/video0".into(),
            width: 640,
            height: 480,
            input_format: None,
        }
    }
}

impl SourceFactory for CaptureConfig {
    fn open(&self) -> Result<Box<dyn FrameSource>, UplinkError> {
        open_source(self)
    }
}

/// Pick and open the adapter for `config.route`.
pub fn open_source(config: &CaptureConfig) -> Result<Box<dyn FrameSource>, UplinkError> {
    if let Some(dims) = config.route.strip_prefix(PATTERN_SCHEME) {
        let (width, height) = parse_dimensions(dims)
            .ok_or_else(|| UplinkError::Config(format!("invalid pattern route: {}", config.route)))?;
        return Ok(Box::new(PatternSource::new(width, height)));
    }
    Ok(Box::new(FfmpegSource::open(config)?))
}

/// Parse `"640x480"`; an empty string means 320x240.
fn parse_dimensions(dims: &str) -> Option<(u32, u32)> {
    if dims.is_empty() {
        return Some((320, 240));
    }
    let (w, h) = dims.split_once('x')?;
    let w: u32 = w.trim().parse().ok()?;
    let h: u32 = h.trim().parse().ok()?;
    (w > 0 && h > 0).then_some((w, h))
}

// ── FfmpegSource ─────────────────────────────────────────────────

/// Frames decoded by an `ffmpeg` child process.
///
/// ffmpeg scales to the configured size and writes packed RGB24 to a
/// pipe; this side slices the byte stream into frames. The child is
/// killed when the source is dropped.
pub struct FfmpegSource {
    child: Child,
    stdout: ChildStdout,
    width: u32,
    height: u32,
    /// Partially read frame; survives cancellation of `next_frame`.
    buf: Vec<u8>,
    filled: usize,
    sequence: u64,
}

impl FfmpegSource {
    /// Spawn ffmpeg for `config.route`.
    pub fn open(config: &CaptureConfig) -> Result<Self, UplinkError> {
        if config.width == 0 || config.height == 0 {
            return Err(UplinkError::Config(format!(
                "invalid capture size {}x{}",
                config.width, config.height
            )));
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-hide_banner", "-nostdin", "-loglevel", "error"]);
        if let Some(format) = input_format(config) {
            cmd.args(["-f", format]);
        }
        cmd.arg("-i")
            .arg(&config.route)
            .args(["-an", "-vf"])
            .arg(format!("scale={}:{}", config.width, config.height))
            .args(["-pix_fmt", "rgb24", "-f", "rawvideo", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            UplinkError::CaptureFailure(format!("spawn ffmpeg for {}: {e}", config.route))
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| UplinkError::CaptureFailure("ffmpeg stdout not captured".into()))?;

        tracing::debug!(route = %config.route, pid = ?child.id(), "ffmpeg capture started");

        Ok(Self {
            child,
            stdout,
            width: config.width,
            height: config.height,
            buf: vec![0u8; frame_len(config.width, config.height, PixelFormat::Rgb8)],
            filled: 0,
            sequence: 0,
        })
    }

    /// OS process id of the ffmpeg child, while it runs.
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }
}

/// Explicit format, or `v4l2` for video4linux device nodes.
fn input_format(config: &CaptureConfig) -> Option<&str> {
    match config.input_format.as_deref() {
        Some(f) if !f.is_empty() => Some(f),
        _ if config.route.starts_with("/dev/video") => Some("v4l2"),
        _ => None,
    }
}

#[async_trait]
impl FrameSource for FfmpegSource {
    async fn next_frame(&mut self) -> Result<RawFrame, UplinkError> {
        // `read` is cancel-safe; progress lives in `self.filled`.
        while self.filled < self.buf.len() {
            let n = self
                .stdout
                .read(&mut self.buf[self.filled..])
                .await
                .map_err(|e| UplinkError::CaptureFailure(format!("read from ffmpeg: {e}")))?;
            if n == 0 {
                return Err(UplinkError::CaptureFailure(
                    "no frame received: end of stream".into(),
                ));
            }
            self.filled += n;
        }
        self.filled = 0;

        let frame = RawFrame {
            width: self.width,
            height: self.height,
            format: PixelFormat::Rgb8,
            data: Bytes::copy_from_slice(&self.buf),
            sequence: self.sequence,
            captured_at: Instant::now(),
        };
        self.sequence += 1;
        Ok(frame)
    }
}

// ── PatternSource ────────────────────────────────────────────────

/// Synthetic diagonal colour bars that scroll one pixel per frame.
pub struct PatternSource {
    width: u32,
    height: u32,
    sequence: u64,
}

impl PatternSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            sequence: 0,
        }
    }

    fn render(&self) -> Vec<u8> {
        let shift = self.sequence as usize;
        let mut data = Vec::with_capacity(frame_len(self.width, self.height, PixelFormat::Rgb8));
        for y in 0..self.height as usize {
            for x in 0..self.width as usize {
                let t = (x + y + shift) as u8;
                data.extend_from_slice(&[t, t.wrapping_mul(2), 255 - t]);
            }
        }
        data
    }
}

#[async_trait]
impl FrameSource for PatternSource {
    async fn next_frame(&mut self) -> Result<RawFrame, UplinkError> {
        let frame = RawFrame {
            width: self.width,
            height: self.height,
            format: PixelFormat::Rgb8,
            data: Bytes::from(self.render()),
            sequence: self.sequence,
            captured_at: Instant::now(),
        };
        self.sequence += 1;
        Ok(frame)
    }
}

// ── Tests ────────────────────────────────────────────────────────
