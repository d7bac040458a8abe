//! # Audio Device Abstraction
//!
//! The controller creates and destroys audio contexts through these traits,
//! so the radio logic never touches a sound API directly.
//!
//! ## Contracts:
//! - **Capture**: `open_input` either yields a stream or fails with
//!   `MicrophoneAccess`. Once started, the stream pushes fixed-size
//!   `CaptureFrame` events into the controller queue.
//! - **Output**: exposes a monotonic clock in seconds, schedules buffers at
//!   absolute clock times, and pushes `SegmentEnded` when a scheduled buffer
//!   finishes. Segments cut with `stop` never report completion.
//!
//! ## Backends:
//! - **headless**: always built; silent capture and a wall-clock output
//! - **cpal**: real hardware (feature `backend-cpal`), mixed by `mixer` and
//!   converted to and from device rates by `resample`

use crate::audio::codec::AudioBuffer;
use crate::audio::scheduler::SegmentId;
use crate::error::RadioResult;
use crate::radio::events::EventSender;

pub mod headless;
pub mod mixer;
pub mod resample;

#[cfg(feature = "backend-cpal")]
pub mod cpal_backend;

/// Live microphone stream.
pub trait CaptureStream {
    /// Begin delivering frames.
    fn start(&mut self) -> RadioResult<()>;

    /// Stop all tracks and detach the frame callback. Idempotent.
    fn stop(&mut self);
}

/// Output context with a scheduling clock.
pub trait OutputDevice {
    /// Current output clock in seconds.
    fn current_time(&self) -> f64;

    /// Begin playing `buffer` at clock time `start_time`.
    fn schedule(&mut self, id: SegmentId, buffer: &AudioBuffer, start_time: f64) -> RadioResult<()>;

    /// Cut a scheduled segment immediately. Unknown ids are ignored.
    fn stop(&mut self, id: SegmentId);

    /// Fire-and-forget playback of a cue, bypassing the timeline.
    fn play_now(&mut self, samples: Vec<f32>);

    /// Master gain in 0.0..=1.0.
    fn set_gain(&mut self, gain: f32);

    /// Rate cues should be synthesized at.
    fn sample_rate(&self) -> u32;
}

/// Factory for input/output contexts.
pub trait AudioHost {
    fn open_input(
        &self,
        sample_rate: u32,
        frame_size: usize,
        events: EventSender,
    ) -> RadioResult<Box<dyn CaptureStream>>;

    fn open_output(
        &self,
        sample_rate: u32,
        channels: u16,
        events: EventSender,
    ) -> RadioResult<Box<dyn OutputDevice>>;
}

/// Host selected by the enabled features.
pub fn default_host() -> Box<dyn AudioHost> {
    #[cfg(feature = "backend-cpal")]
    {
        Box::new(cpal_backend::CpalHost::new())
    }

    #[cfg(not(feature = "backend-cpal"))]
    {
        Box::new(headless::HeadlessHost::new())
    }
}
