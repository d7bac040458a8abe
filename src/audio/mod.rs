//! # Audio Processing Module
//!
//! Real-time audio path of the radio: capture, encoding, decoding, gapless
//! playback scheduling, and procedural cues.
//!
//! ## Key Components:
//! - **Codec**: float samples ⇄ base64-framed 16-bit little-endian PCM
//! - **Capture Pipeline**: fixed-size frames, gated by push-to-talk
//! - **Playback Scheduler**: single output timeline, exactly-once idle signal
//! - **Effects**: static bursts and chirps played outside the timeline
//!
//! ## Audio Format Requirements:
//! - **Capture**: 16kHz mono, 4096-sample frames
//! - **Playback**: 24kHz, mono today (decoder handles interleaved multi-channel)
//! - **Encoding**: Little-endian signed 16-bit integers, base64 framed

pub mod capture;    // Frame re-blocking and gated forwarding
pub mod codec;      // PCM encode/decode
pub mod effects;    // Squelch and chirp synthesis
pub mod scheduler;  // Gapless playback timeline
