//! Frame types passed between the capture and encode stages.

use std::time::Instant;

use bytes::Bytes;

// ── PixelFormat ──────────────────────────────────────────────────

/// Pixel layout for raw captured frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 3 bytes per pixel: Red, Green, Blue.
    Rgb8,
    /// 1 byte per pixel: luminance only.
    Luma8,
}

impl PixelFormat {
    /// Bytes consumed by a single pixel in this format.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Luma8 => 1,
        }
    }
}

// ── RawFrame ─────────────────────────────────────────────────────

/// An uncompressed frame as delivered by a frame source.
///
/// Rows are tightly packed: `data` holds exactly
/// `width * height * bytes_per_pixel` bytes.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel layout.
    pub format: PixelFormat,
    /// Packed pixel data.
    pub data: Bytes,
    /// Per-source frame counter, starting at 0.
    pub sequence: u64,
    /// Monotonic capture timestamp.
    pub captured_at: Instant,
}

impl RawFrame {
    /// Byte length a frame of this geometry must have.
    pub fn expected_len(&self) -> usize {
        frame_len(self.width, self.height, self.format)
    }

    /// Whether `data` matches the declared geometry.
    pub fn is_well_formed(&self) -> bool {
        self.width > 0 && self.height > 0 && self.data.len() == self.expected_len()
    }
}

/// Byte length of a packed frame.
pub fn frame_len(width: u32, height: u32, format: PixelFormat) -> usize {
    width as usize * height as usize * format.bytes_per_pixel()
}
