//! Push-to-talk radio client for a live speech model.
//!
//! Captures microphone audio, streams it while the talk control is held, and
//! plays the model's spoken replies back gaplessly with radio-style cues.

pub mod audio;
pub mod config;
pub mod device;
pub mod error;
pub mod radio;
pub mod transport;

#[cfg(test)]
mod testing;
