//! Headless audio host.
//!
//! Runs the whole radio without sound hardware: capture produces silent frames
//! paced in real time, and output keeps a wall clock and reports segment
//! completions from tokio timers. Useful on servers, in CI, and for checking a
//! link end to end.

use std::collections::HashMap;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use super::{AudioHost, CaptureStream, OutputDevice};
use crate::audio::capture::AudioFrame;
use crate::audio::codec::AudioBuffer;
use crate::audio::scheduler::SegmentId;
use crate::error::{RadioError, RadioResult};
use crate::radio::events::{ControllerEvent, EventSender};

#[derive(Debug, Default)]
pub struct HeadlessHost;

impl HeadlessHost {
    pub fn new() -> Self {
        Self
    }
}

impl AudioHost for HeadlessHost {
    fn open_input(
        &self,
        sample_rate: u32,
        frame_size: usize,
        events: EventSender,
    ) -> RadioResult<Box<dyn CaptureStream>> {
        if sample_rate == 0 || frame_size == 0 {
            return Err(RadioError::MicrophoneAccess(
                "invalid capture format".to_string(),
            ));
        }
        info!(sample_rate, frame_size, "Opened headless capture (silence)");
        Ok(Box::new(SilentCapture {
            sample_rate,
            frame_size,
            events,
            task: None,
        }))
    }

    fn open_output(
        &self,
        sample_rate: u32,
        _channels: u16,
        events: EventSender,
    ) -> RadioResult<Box<dyn OutputDevice>> {
        info!(sample_rate, "Opened headless output (wall clock)");
        Ok(Box::new(ClockOutput {
            epoch: Instant::now(),
            sample_rate,
            gain: 1.0,
            events,
            timers: HashMap::new(),
        }))
    }
}

/// Emits zero-valued frames at the capture rate.
pub struct SilentCapture {
    sample_rate: u32,
    frame_size: usize,
    events: EventSender,
    task: Option<JoinHandle<()>>,
}

impl CaptureStream for SilentCapture {
    fn start(&mut self) -> RadioResult<()> {
        if self.task.is_some() {
            return Ok(());
        }
        let handle = Handle::try_current()
            .map_err(|e| RadioError::MicrophoneAccess(format!("no async runtime: {}", e)))?;

        let period = Duration::from_secs_f64(self.frame_size as f64 / self.sample_rate as f64);
        let frame_size = self.frame_size;
        let events = self.events.clone();

        self.task = Some(handle.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // First tick completes immediately; skip it so frames arrive after a full period
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let frame = AudioFrame::new(vec![0.0; frame_size]);
                if events.send(ControllerEvent::CaptureFrame(frame)).is_err() {
                    break;
                }
            }
        }));
        debug!("Headless capture started");
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Headless capture stopped");
        }
    }
}

impl Drop for SilentCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Output whose clock is the time since it was opened.
pub struct ClockOutput {
    epoch: Instant,
    sample_rate: u32,
    gain: f32,
    events: EventSender,
    timers: HashMap<SegmentId, JoinHandle<()>>,
}

impl OutputDevice for ClockOutput {
    fn current_time(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    fn schedule(&mut self, id: SegmentId, buffer: &AudioBuffer, start_time: f64) -> RadioResult<()> {
        let handle = Handle::try_current()
            .map_err(|e| RadioError::Device(format!("no async runtime: {}", e)))?;

        self.timers.retain(|_, timer| !timer.is_finished());

        let end_time = start_time + buffer.duration();
        let delay = (end_time - self.current_time()).max(0.0);
        let events = self.events.clone();

        let timer = handle.spawn(async move {
            tokio::time::sleep(Duration::from_secs_f64(delay)).await;
            let _ = events.send(ControllerEvent::SegmentEnded(id));
        });
        self.timers.insert(id, timer);
        Ok(())
    }

    fn stop(&mut self, id: SegmentId) {
        if let Some(timer) = self.timers.remove(&id) {
            timer.abort();
        }
    }

    fn play_now(&mut self, samples: Vec<f32>) {
        debug!(
            samples = samples.len(),
            gain = self.gain,
            "Headless cue (not audible)"
        );
    }

    fn set_gain(&mut self, gain: f32) {
        self.gain = gain.clamp(0.0, 1.0);
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for ClockOutput {
    fn drop(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::events;

    #[tokio::test(start_paused = true)]
    async fn test_clock_output_reports_completion() {
        let (tx, mut rx) = events::channel();
        let mut output = HeadlessHost::new().open_output(24000, 1, tx).unwrap();

        let buffer = AudioBuffer::mono(24000, vec![0.0; 12000]).unwrap();
        output.schedule(SegmentId(3), &buffer, 0.0).unwrap();

        match rx.recv().await {
            Some(ControllerEvent::SegmentEnded(id)) => assert_eq!(id, SegmentId(3)),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_segment_never_completes() {
        let (tx, mut rx) = events::channel();
        let mut output = HeadlessHost::new().open_output(24000, 1, tx).unwrap();

        let buffer = AudioBuffer::mono(24000, vec![0.0; 2400]).unwrap();
        output.schedule(SegmentId(1), &buffer, 0.0).unwrap();
        output.stop(SegmentId(1));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_capture_paces_frames() {
        let (tx, mut rx) = events::channel();
        let mut capture = HeadlessHost::new().open_input(16000, 4096, tx).unwrap();
        capture.start().unwrap();

        match rx.recv().await {
            Some(ControllerEvent::CaptureFrame(frame)) => assert_eq!(frame.len(), 4096),
            other => panic!("unexpected event: {:?}", other),
        }

        capture.stop();
        capture.stop();
    }
}
