//! # uplink-source: video source process
//!
//! Reads a local camera, file or stream, compresses each frame to JPEG
//! and pushes it to a WebSocket signaling server that relays it to
//! viewers. Round-trip probes drive the JPEG quality; dropped
//! connections are retried with exponential backoff and a failed video
//! device triggers a full pipeline restart.
//!
//! The library half holds the TOML configuration and the service
//! wiring so both can be tested without the binary.

pub mod config;
pub mod service;
