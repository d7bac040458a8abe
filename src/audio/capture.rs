//! # Capture Pipeline
//!
//! Turns microphone audio into wire chunks, but only while the gate is open.
//!
//! ## Key Components:
//! - **FrameAccumulator**: re-blocks whatever sizes the device callback hands
//!   us into fixed frames (4096 samples by default)
//! - **CapturePipeline**: per frame, checks the gate, encodes, and forwards to
//!   the transport session; closed-gate frames are dropped, never buffered

use std::collections::VecDeque;
use tracing::trace;

use crate::audio::codec::{encode_frame, EncodedChunk};
use crate::error::RadioResult;
use crate::radio::gate::TransmissionGate;
use crate::transport::SessionHandle;

/// One fixed-size batch of captured samples in [-1, 1].
///
/// Produced once per capture callback and consumed immediately.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>) -> Self {
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Collects device samples and hands out fixed-size frames.
///
/// ## Memory Management:
/// Only samples that do not yet fill a frame stay queued, so the backlog is
/// always shorter than one frame.
#[derive(Debug)]
pub struct FrameAccumulator {
    pending: VecDeque<f32>,
    frame_size: usize,
}

impl FrameAccumulator {
    pub fn new(frame_size: usize) -> Self {
        Self {
            pending: VecDeque::with_capacity(frame_size * 2),
            frame_size: frame_size.max(1),
        }
    }

    /// Add samples; returns every frame completed by them, oldest first.
    pub fn push(&mut self, samples: &[f32]) -> Vec<AudioFrame> {
        self.pending.extend(samples.iter().copied());

        let mut frames = Vec::new();
        while self.pending.len() >= self.frame_size {
            let frame: Vec<f32> = self.pending.drain(..self.frame_size).collect();
            frames.push(AudioFrame::new(frame));
        }
        frames
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// What happened to a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Forwarded,
    /// Gate closed or no live session
    Dropped,
}

/// Per-frame encode-and-gate step.
#[derive(Debug, Clone)]
pub struct CapturePipeline {
    sample_rate: u32,
    forwarded: u64,
    dropped: u64,
}

impl CapturePipeline {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            forwarded: 0,
            dropped: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Encode and send `frame` iff the gate is Transmitting and a session is live.
    pub fn process(
        &mut self,
        gate: &TransmissionGate,
        session: Option<&mut (dyn SessionHandle + 'static)>,
        frame: &AudioFrame,
    ) -> RadioResult<FrameOutcome> {
        let session = match session {
            Some(session) if gate.should_forward() => session,
            _ => {
                self.dropped += 1;
                return Ok(FrameOutcome::Dropped);
            }
        };

        let chunk: EncodedChunk = encode_frame(&frame.samples, self.sample_rate);
        session.send_realtime_input(&chunk)?;
        self.forwarded += 1;

        trace!(samples = frame.len(), bytes = chunk.data.len(), "Frame forwarded");
        Ok(FrameOutcome::Forwarded)
    }

    pub fn forwarded(&self) -> u64 {
        self.forwarded
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSession;

    #[test]
    fn test_accumulator_emits_fixed_frames() {
        let mut acc = FrameAccumulator::new(4);
        assert!(acc.push(&[0.1, 0.2, 0.3]).is_empty());

        let frames = acc.push(&[0.4, 0.5, 0.6, 0.7, 0.8, 0.9]);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].samples, vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(frames[1].samples, vec![0.5, 0.6, 0.7, 0.8]);
        assert_eq!(acc.pending(), 1);
    }

    #[test]
    fn test_frames_forwarded_only_while_transmitting() {
        let mut pipeline = CapturePipeline::new(16000);
        let mut gate = TransmissionGate::new();
        let mut session = RecordingSession::default();
        let frame = AudioFrame::new(vec![0.0; 4096]);

        // Idle
        let outcome = pipeline.process(&gate, Some(&mut session), &frame).unwrap();
        assert_eq!(outcome, FrameOutcome::Dropped);

        // Connected
        gate.link_established();
        let outcome = pipeline.process(&gate, Some(&mut session), &frame).unwrap();
        assert_eq!(outcome, FrameOutcome::Dropped);

        // Transmitting
        gate.press_talk();
        let outcome = pipeline.process(&gate, Some(&mut session), &frame).unwrap();
        assert_eq!(outcome, FrameOutcome::Forwarded);

        assert_eq!(session.sent.lock().unwrap().len(), 1);
        assert_eq!(session.sent.lock().unwrap()[0].mime_type, "audio/pcm;rate=16000");
        assert_eq!(pipeline.forwarded(), 1);
        assert_eq!(pipeline.dropped(), 2);
    }

    #[test]
    fn test_transmitting_without_session_drops() {
        let mut pipeline = CapturePipeline::new(16000);
        let mut gate = TransmissionGate::new();
        gate.link_established();
        gate.press_talk();

        let outcome = pipeline
            .process(&gate, None, &AudioFrame::new(vec![0.0; 16]))
            .unwrap();
        assert_eq!(outcome, FrameOutcome::Dropped);
    }
}
