//! Configuration for the uplink source process.
//!
//! The first three settings form the bundle every deployment needs
//! (`source.local_route`, `server.ws_endpoint`, `server.password`). When
//! any of them is empty the operator is prompted on stdin and the
//! completed file is saved, so later runs start unattended.

use std::io::{self, BufRead, Write};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use uplink_core::error::UplinkError;
use uplink_core::stream::{
    CaptureConfig, DEFAULT_PING_INTERVAL, DEFAULT_QUALITY, DEFAULT_TARGET_FPS, HARD_MAX_QUALITY,
    MIN_QUALITY,
};
use uplink_core::supervisor::SessionConfig;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Video input.
    pub source: CaptureSection,
    /// Signaling server.
    pub server: ServerSection,
    /// Frame cadence and quality.
    pub stream: StreamSection,
    /// Reconnect delays.
    pub backoff: BackoffSection,
    /// Logging settings.
    pub logging: LoggingSection,
}

/// Video input settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSection {
    /// Device path, file, stream URL, or `pattern://WxH`.
    pub local_route: String,
    /// Frame width sent to the server.
    pub width: u32,
    /// Frame height sent to the server.
    pub height: u32,
    /// Force an ffmpeg input format (e.g. "v4l2", "avfoundation").
    pub input_format: String,
}

/// Signaling server settings.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// `ws://host:port/path`.
    pub ws_endpoint: String,
    /// Shared secret for the `source` role.
    pub password: String,
    /// Refuse to stream unless the server explicitly accepts the auth.
    pub strict_auth: bool,
}

/// Frame cadence and quality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSection {
    /// Target frames per second.
    pub target_fps: u32,
    /// Sent frames between round-trip probes.
    pub ping_interval_frames: u64,
    /// JPEG quality at start-up, 10..=95.
    pub initial_quality: u8,
}

/// Reconnect delay bounds, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffSection {
    pub min_delay_secs: u64,
    pub max_delay_secs: u64,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for CaptureSection {
    fn default() -> Self {
        Self {
            local_route: String::new(),
            width: 640,
            height: 480,
            input_format: String::new(),
        }
    }
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            ws_endpoint: String::new(),
            password: String::new(),
            strict_auth: false,
        }
    }
}

impl std::fmt::Debug for ServerSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSection")
            .field("ws_endpoint", &self.ws_endpoint)
            .field("password", &"<redacted>")
            .field("strict_auth", &self.strict_auth)
            .finish()
    }
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            target_fps: DEFAULT_TARGET_FPS,
            ping_interval_frames: DEFAULT_PING_INTERVAL,
            initial_quality: DEFAULT_QUALITY,
        }
    }
}

impl Default for BackoffSection {
    fn default() -> Self {
        Self {
            min_delay_secs: 3,
            max_delay_secs: 60,
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading / saving ─────────────────────────────────────────────

impl SourceConfig {
    /// Load configuration from a TOML file.
    ///
    /// A missing file yields the defaults. A file that exists but does not
    /// parse is an error, so it is never silently replaced on save.
    pub fn load(path: &Path) -> Result<Self, UplinkError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        toml::from_str(&contents)
            .map_err(|e| UplinkError::Config(format!("invalid config {}: {e}", path.display())))
    }

    /// Write this configuration to `path` as TOML.
    pub fn save(&self, path: &Path) -> Result<(), UplinkError> {
        let text = toml::to_string_pretty(self)
            .map_err(|e| UplinkError::Config(format!("serialize config: {e}")))?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Names of required settings that are still empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.source.local_route.trim().is_empty() {
            missing.push("local_route");
        }
        if self.server.ws_endpoint.trim().is_empty() {
            missing.push("ws_endpoint");
        }
        if self.server.password.is_empty() {
            missing.push("password");
        }
        missing
    }

    /// Ask for every missing required setting on `input`.
    ///
    /// Returns `true` if anything was filled in.
    pub fn prompt_missing<R: BufRead, W: Write>(
        &mut self,
        input: &mut R,
        output: &mut W,
    ) -> Result<bool, UplinkError> {
        let missing = self.missing_fields();
        for field in &missing {
            let (label, slot) = match *field {
                "local_route" => (
                    "Video source (device, file or URL)",
                    &mut self.source.local_route,
                ),
                "ws_endpoint" => ("WebSocket endpoint (ws://...)", &mut self.server.ws_endpoint),
                _ => ("Stream password", &mut self.server.password),
            };
            write!(output, "{label}: ")?;
            output.flush()?;

            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                return Err(UplinkError::Config(format!(
                    "{field} is required but stdin is closed"
                )));
            }
            *slot = line.trim().to_string();
        }
        Ok(!missing.is_empty())
    }

    /// Check values that would only fail later, deep inside the session.
    pub fn validate(&self) -> Result<(), UplinkError> {
        if let Some(field) = self.missing_fields().first() {
            return Err(UplinkError::Config(format!("{field} is not set")));
        }
        let endpoint = self.server.ws_endpoint.trim();
        if endpoint.starts_with("wss://") {
            return Err(UplinkError::Config(
                "wss:// endpoints are not supported; use ws:// behind a TLS terminator".into(),
            ));
        }
        if !endpoint.starts_with("ws://") {
            return Err(UplinkError::Config(format!(
                "ws_endpoint must start with ws://, got {endpoint}"
            )));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(UplinkError::Config("capture size must be non-zero".into()));
        }
        if !(MIN_QUALITY..=HARD_MAX_QUALITY).contains(&self.stream.initial_quality) {
            return Err(UplinkError::Config(format!(
                "initial_quality must be within {MIN_QUALITY}..={HARD_MAX_QUALITY}"
            )));
        }
        Ok(())
    }

    /// Settings handed to the supervisor.
    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            endpoint: self.server.ws_endpoint.trim().to_string(),
            password: self.server.password.clone(),
            strict_auth: self.server.strict_auth,
            target_fps: self.stream.target_fps.clamp(1, 60),
            ping_interval_frames: self.stream.ping_interval_frames.max(1),
            initial_quality: self.stream.initial_quality,
            min_backoff: Duration::from_secs(self.backoff.min_delay_secs.max(1)),
            max_backoff: Duration::from_secs(self.backoff.max_delay_secs),
        }
    }

    /// Settings handed to the frame source factory.
    pub fn to_capture_config(&self) -> CaptureConfig {
        let input_format = self.source.input_format.trim();
        CaptureConfig {
            route: self.source.local_route.trim().to_string(),
            width: self.source.width,
            height: self.source.height,
            input_format: (!input_format.is_empty()).then(|| input_format.to_string()),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
